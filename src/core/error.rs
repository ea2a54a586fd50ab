use std::error::Error as StdError;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Validation,
    Transport,
    Timeout,
    Service,
    State,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    collection: Option<String>,
    command: Option<String>,
    code: Option<String>,
    status: Option<u16>,
    retryable: bool,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            collection: None,
            command: None,
            code: None,
            status: None,
            retryable: false,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable || self.kind == ErrorKind::Transport
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(command) = &self.command {
            write!(f, " (command: {command})")?;
        }
        if let Some(collection) = &self.collection {
            write!(f, " (collection: {collection})")?;
        }
        if let Some(code) = &self.code {
            write!(f, " (code: {code})")?;
        }
        if let Some(status) = self.status {
            write!(f, " (http status: {status})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Validation => 2,
        ErrorKind::Transport => 3,
        ErrorKind::Timeout => 4,
        ErrorKind::Service => 5,
        ErrorKind::State => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::{to_exit_code, Error, ErrorKind};

    #[test]
    fn exit_code_mapping_is_stable() {
        let cases = [
            (ErrorKind::Internal, 1),
            (ErrorKind::Validation, 2),
            (ErrorKind::Transport, 3),
            (ErrorKind::Timeout, 4),
            (ErrorKind::Service, 5),
            (ErrorKind::State, 6),
        ];

        for (kind, code) in cases {
            assert_eq!(to_exit_code(kind), code);
        }
    }

    #[test]
    fn transport_errors_are_retryable_by_default() {
        assert!(Error::new(ErrorKind::Transport).is_retryable());
        assert!(!Error::new(ErrorKind::Service).is_retryable());
        assert!(
            Error::new(ErrorKind::Service)
                .with_retryable(true)
                .is_retryable()
        );
    }

    #[test]
    fn display_includes_context() {
        let err = Error::new(ErrorKind::Service)
            .with_message("command failed")
            .with_command("insertMany")
            .with_collection("events")
            .with_code("DOCUMENT_ALREADY_EXISTS");
        let text = err.to_string();
        assert!(text.contains("Service: command failed"));
        assert!(text.contains("command: insertMany"));
        assert!(text.contains("collection: events"));
        assert!(text.contains("DOCUMENT_ALREADY_EXISTS"));
    }
}
