//! Purpose: Model the Quiver Data API response envelope.
//! Exports: `ApiResponse`, `ResponseData`, `ErrorDescriptor`.
//! Role: Typed view over the status/data/errors triple every command returns.
//! Invariants: A response may carry partial `status` alongside `errors`.
//! Invariants: Document order within `data.documents` is the service's order.
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub status: Option<Map<String, Value>>,
    #[serde(default)]
    pub data: Option<ResponseData>,
    #[serde(default)]
    pub errors: Vec<ErrorDescriptor>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ResponseData {
    #[serde(default)]
    pub document: Option<Value>,
    #[serde(default)]
    pub documents: Vec<Value>,
    #[serde(default, rename = "nextPageState")]
    pub next_page_state: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ErrorDescriptor {
    pub message: String,
    #[serde(default, rename = "errorCode")]
    pub error_code: Option<String>,
    #[serde(default)]
    pub retryable: bool,
}

impl ErrorDescriptor {
    pub fn to_error(&self) -> Error {
        let mut err = Error::new(ErrorKind::Service)
            .with_message(self.message.clone())
            .with_retryable(self.retryable);
        if let Some(code) = &self.error_code {
            err = err.with_code(code.clone());
        }
        err
    }
}

impl ApiResponse {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// The first error descriptor as a typed error, if any.
    pub fn error(&self) -> Option<Error> {
        self.errors.first().map(ErrorDescriptor::to_error)
    }

    pub fn status_value(&self, key: &str) -> Option<&Value> {
        self.status.as_ref().and_then(|status| status.get(key))
    }

    pub fn status_u64(&self, key: &str) -> Option<u64> {
        self.status_value(key).and_then(Value::as_u64)
    }

    pub fn status_bool(&self, key: &str) -> bool {
        self.status_value(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// `status.insertedIds`, empty when absent.
    pub fn inserted_ids(&self) -> Vec<Value> {
        match self.status_value("insertedIds") {
            Some(Value::Array(ids)) => ids.clone(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ApiResponse;
    use crate::core::error::ErrorKind;
    use serde_json::{from_value, json};

    #[test]
    fn parses_status_response() {
        let response: ApiResponse = from_value(json!({
            "status": {"insertedIds": ["a", "b"], "moreData": true}
        }))
        .expect("parse");
        assert_eq!(response.inserted_ids(), vec![json!("a"), json!("b")]);
        assert!(response.status_bool("moreData"));
        assert!(!response.has_errors());
    }

    #[test]
    fn parses_data_page() {
        let response: ApiResponse = from_value(json!({
            "data": {
                "documents": [{"_id": 1, "$similarity": 0.9}],
                "nextPageState": "tok"
            }
        }))
        .expect("parse");
        let data = response.data.expect("data");
        assert_eq!(data.documents.len(), 1);
        assert_eq!(data.next_page_state.as_deref(), Some("tok"));
    }

    #[test]
    fn parses_partial_status_with_errors() {
        let response: ApiResponse = from_value(json!({
            "status": {"insertedIds": ["a"]},
            "errors": [
                {"message": "duplicate id", "errorCode": "DOCUMENT_ALREADY_EXISTS"},
                {"message": "server busy", "retryable": true}
            ]
        }))
        .expect("parse");
        assert_eq!(response.inserted_ids().len(), 1);
        assert_eq!(response.errors.len(), 2);
        let err = response.error().expect("error");
        assert_eq!(err.kind(), ErrorKind::Service);
        assert_eq!(err.code(), Some("DOCUMENT_ALREADY_EXISTS"));
        assert!(!err.is_retryable());
        assert!(response.errors[1].to_error().is_retryable());
    }
}
