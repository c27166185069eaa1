use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

/// Stable classification of every failure the engine can produce.
///
/// The kind is what callers branch on; the boxed source is for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    AlreadyExists,
    Unauthorised,
    Forbidden,
    RequestTimeout,
    Dependency,
    Database,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::Unauthorised => "unauthorised",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::RequestTimeout => "request_timeout",
            ErrorKind::Dependency => "dependency_failure",
            ErrorKind::Database => "database_error",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct ErrorInner {
    pub kind: ErrorKind,
    pub op: Option<&'static str>,
    pub source: Option<BoxError>,
    pub message: Option<String>,
}

pub struct Error {
    inner: Box<ErrorInner>,
}

impl Error {
    pub fn new<E>(kind: ErrorKind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(ErrorInner {
                kind,
                op: None,
                source: source.map(Into::into),
                message: None,
            }),
        }
    }

    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Error {
        Error {
            inner: Box::new(ErrorInner {
                kind,
                op: None,
                source: None,
                message: Some(message.into()),
            }),
        }
    }

    /// Tags the error with the `<layer>.<domain>.<action>` that produced it.
    pub fn with_op(mut self, op: &'static str) -> Error {
        self.inner.op = Some(op);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.inner.kind
    }

    pub fn op(&self) -> Option<&'static str> {
        self.inner.op
    }

    pub fn message(&self) -> Option<&str> {
        self.inner.message.as_deref()
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::InvalidInput)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::NotFound)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Conflict)
    }

    pub fn is_unauthorised(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Unauthorised)
    }

    pub fn is_dependency(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Dependency)
    }

    pub fn is_database(&self) -> bool {
        matches!(self.inner.kind, ErrorKind::Database)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("pulsemon::Error");
        f.field("kind", &self.inner.kind);
        if let Some(op) = self.inner.op {
            f.field("op", &op);
        }
        if let Some(ref message) = self.inner.message {
            f.field("message", message);
        }
        if let Some(ref source) = self.inner.source {
            f.field("source", source);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.op {
            Some(op) => write!(f, "{}: {}", op, self.inner.kind)?,
            None => write!(f, "{}", self.inner.kind)?,
        }
        if let Some(ref message) = self.inner.message {
            write!(f, ": {message}")?;
        }
        if let Some(ref source) = self.inner.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .source
            .as_ref()
            .map(|e| &**e as &(dyn StdError + 'static))
    }
}

/// Failures from the Redis state layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection failed")]
    ConnectionFailed,
    #[error("pool error: {0}")]
    Pool(String),
    #[error("command failed: {0}")]
    Command(#[source] BoxError),
    #[error("script failed: {0}")]
    Script(#[source] BoxError),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::new(ErrorKind::Dependency, Some(err))
    }
}

/// Failures from the SQL repositories.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("query failed: {0}")]
    Query(#[source] BoxError),
    #[error("row not found")]
    NotFound,
    #[error("duplicate row")]
    Duplicate,
}

impl From<RepoError> for Error {
    fn from(err: RepoError) -> Self {
        let kind = match err {
            RepoError::NotFound => ErrorKind::NotFound,
            RepoError::Duplicate => ErrorKind::AlreadyExists,
            RepoError::Query(_) => ErrorKind::Database,
        };
        Error::new(kind, Some(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_survives_wrapping() {
        let err: Error = RepoError::NotFound.into();
        assert!(err.is_not_found());

        let err: Error = StoreError::ConnectionFailed.into();
        assert!(err.is_dependency());
    }

    #[test]
    fn display_includes_op_and_source() {
        let err = Error::new(ErrorKind::Database, Some(RepoError::NotFound))
            .with_op("repo.monitor.get");
        let rendered = err.to_string();
        assert!(rendered.contains("repo.monitor.get"));
        assert!(rendered.contains("database_error"));
        assert!(rendered.contains("row not found"));
    }
}
