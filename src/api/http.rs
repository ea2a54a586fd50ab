//! Purpose: Provide the ureq-backed HTTP adapter behind the `Transport` seam.
//! Exports: `HttpTransport`.
//! Role: Sole component that speaks HTTP; everything above it sees commands
//! and parsed responses.
//! Invariants: One `execute` call performs exactly one POST.
//! Invariants: The agent and token are shared read-only across dispatches.
#![allow(clippy::result_large_err)]

use std::error::Error as StdError;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::from_str;
use tracing::debug;
use url::Url;

use crate::core::command::Command;
use crate::core::error::{Error, ErrorKind};
use crate::core::response::ApiResponse;
use crate::core::transport::Transport;

type ApiResult<T> = Result<T, Error>;

#[derive(Clone)]
pub struct HttpTransport {
    inner: Arc<HttpTransportInner>,
}

struct HttpTransportInner {
    base_url: Url,
    token: Option<String>,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let agent = ureq::AgentBuilder::new().build();
        Ok(Self {
            inner: Arc::new(HttpTransportInner {
                base_url,
                token: None,
                agent,
            }),
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = Some(token.into());
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.token = token;
        } else {
            self.inner = Arc::new(HttpTransportInner {
                base_url: self.inner.base_url.clone(),
                token,
                agent: self.inner.agent.clone(),
            });
        }
        self
    }

    /// Trust a custom CA bundle, for self-hosted endpoints with private PKI.
    pub fn with_tls_ca_file(mut self, path: impl AsRef<Path>) -> ApiResult<Self> {
        let path = path.as_ref();
        let cert_bytes = std::fs::read(path).map_err(|err| {
            Error::new(ErrorKind::Validation)
                .with_message(format!(
                    "failed to read TLS CA file {}",
                    path.display()
                ))
                .with_source(err)
        })?;
        let mut cert_reader = Cursor::new(cert_bytes);
        let certs = rustls_pemfile::certs(&mut cert_reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| {
                Error::new(ErrorKind::Validation)
                    .with_message(format!(
                        "failed to parse TLS CA file {}",
                        path.display()
                    ))
                    .with_source(err)
            })?;
        if certs.is_empty() {
            return Err(Error::new(ErrorKind::Validation)
                .with_message("TLS CA file contains no certificates"));
        }

        let _ = ureq::rustls::crypto::aws_lc_rs::default_provider().install_default();
        let mut root_store = ureq::rustls::RootCertStore::empty();
        let (added, _) = root_store.add_parsable_certificates(certs);
        if added == 0 {
            return Err(Error::new(ErrorKind::Validation)
                .with_message("TLS CA file contains no parsable certificates"));
        }
        let tls_config = ureq::rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        let agent = ureq::builder().tls_config(Arc::new(tls_config)).build();

        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.agent = agent;
        } else {
            self.inner = Arc::new(HttpTransportInner {
                base_url: self.inner.base_url.clone(),
                token: self.inner.token.clone(),
                agent,
            });
        }
        Ok(self)
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }
}

impl Transport for HttpTransport {
    fn execute(&self, command: &Command, timeout: Duration) -> Result<ApiResponse, Error> {
        let url = build_url(&self.inner.base_url, &command.target().path_segments())?;
        let payload = serde_json::to_string(&command.body()).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode command json")
                .with_source(err)
        })?;

        let mut request = self
            .inner
            .agent
            .request("POST", url.as_str())
            .timeout(timeout)
            .set("Accept", "application/json")
            .set("Content-Type", "application/json");
        if let Some(token) = &self.inner.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }

        debug!(command = command.name(), url = %url, "executing command");
        match request.send_string(&payload) {
            Ok(response) => read_json_response(response),
            Err(ureq::Error::Status(status, response)) => {
                Err(parse_error_response(status, response).with_command(command.name()))
            }
            Err(ureq::Error::Transport(err)) => {
                Err(classify_transport_error(err).with_command(command.name()))
            }
        }
    }
}

fn normalize_base_url(raw: String) -> ApiResult<Url> {
    let mut url = Url::parse(&raw).map_err(|err| {
        Error::new(ErrorKind::Validation)
            .with_message("invalid base url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(
            Error::new(ErrorKind::Validation).with_message("base url must use http or https")
        );
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(Error::new(ErrorKind::Validation)
            .with_message("base url must not include a path")
            .with_hint("Commands are addressed under /v1/<keyspace>/<collection>."));
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn build_url(base_url: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| Error::new(ErrorKind::Validation).with_message("base url cannot be a base"))?;
        path.clear();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

fn read_json_response(response: ureq::Response) -> ApiResult<ApiResponse> {
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Transport)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("invalid response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    let retryable = retryable_status(status);
    if let Ok(envelope) = from_str::<ApiResponse>(&body) {
        if let Some(err) = envelope.error() {
            let transient = err.is_retryable() || retryable;
            return err.with_status(status).with_retryable(transient);
        }
    }
    Error::new(error_kind_from_status(status))
        .with_message(format!("service returned http status {status}"))
        .with_status(status)
        .with_retryable(retryable)
}

fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        408 => ErrorKind::Timeout,
        400..=599 => ErrorKind::Service,
        _ => ErrorKind::Transport,
    }
}

fn retryable_status(status: u16) -> bool {
    matches!(status, 429 | 502 | 503 | 504)
}

fn classify_transport_error(err: ureq::Transport) -> Error {
    if source_chain_is_timeout(&err) {
        Error::new(ErrorKind::Timeout)
            .with_message("request timed out")
            .with_source(err)
    } else {
        Error::new(ErrorKind::Transport)
            .with_message("request failed")
            .with_source(err)
    }
}

fn source_chain_is_timeout(err: &(dyn StdError + 'static)) -> bool {
    if err.to_string().contains("timed out") {
        return true;
    }
    let mut source = err.source();
    while let Some(current) = source {
        if let Some(io_err) = current.downcast_ref::<std::io::Error>() {
            if matches!(
                io_err.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ) {
                return true;
            }
        }
        source = current.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::{
        build_url, error_kind_from_status, normalize_base_url, parse_error_response,
        retryable_status,
    };
    use crate::core::error::ErrorKind;

    #[test]
    fn normalize_base_url_strips_query_and_fragment() {
        let url = normalize_base_url("https://db.example.com:4443".to_string()).expect("url");
        assert_eq!(url.as_str(), "https://db.example.com:4443/");
    }

    #[test]
    fn normalize_base_url_rejects_paths() {
        let err = normalize_base_url("https://db.example.com/extra".to_string()).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn normalize_base_url_rejects_other_schemes() {
        let err = normalize_base_url("ftp://db.example.com".to_string()).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn build_url_appends_target_segments() {
        let base = normalize_base_url("http://localhost:8181".to_string()).expect("url");
        let url = build_url(&base, &["v1", "app", "events"]).expect("url");
        assert_eq!(url.as_str(), "http://localhost:8181/v1/app/events");
    }

    #[test]
    fn status_mapping_flags_transients() {
        assert!(retryable_status(429));
        assert!(retryable_status(503));
        assert!(!retryable_status(404));
        assert_eq!(error_kind_from_status(408), ErrorKind::Timeout);
        assert_eq!(error_kind_from_status(404), ErrorKind::Service);
        assert_eq!(error_kind_from_status(500), ErrorKind::Service);
    }

    #[test]
    fn bare_status_error_keeps_http_context() {
        let response = ureq::Response::new(503, "Service Unavailable", "overloaded")
            .expect("response");
        let err = parse_error_response(503, response);
        assert_eq!(err.status(), Some(503));
        assert!(err.is_retryable());
    }

    #[test]
    fn enveloped_status_error_uses_service_descriptor() {
        let response = ureq::Response::new(
            422,
            "Unprocessable Entity",
            r#"{"errors": [{"message": "bad filter", "errorCode": "INVALID_FILTER"}]}"#,
        )
        .expect("response");
        let err = parse_error_response(422, response);
        assert_eq!(err.kind(), ErrorKind::Service);
        assert_eq!(err.code(), Some("INVALID_FILTER"));
        assert!(!err.is_retryable());
    }
}
