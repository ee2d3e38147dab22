use crate::WireError;
use std::fmt::{self, Display, Formatter};

/// Client side error codes, numbered like the client library of the server family the
/// binding protocol comes from.
pub mod codes {
    /// The connection character set has no known encoding.
    pub const UNKNOWN_CHARSET: u32 = 2019;
    /// The server went away before the request could be sent.
    pub const SERVER_GONE: u32 = 2006;
    /// The connection was lost while a request was in flight.
    pub const SERVER_LOST: u32 = 2013;
    /// Placeholder or column count differs from the record's field count.
    pub const COUNT_MISMATCH: u32 = 2034;
    /// A value could not be represented on the other side of the binding.
    pub const CONVERSION: u32 = 2036;
    /// A NULL column was fetched into a field that cannot hold NULL.
    pub const UNEXPECTED_NULL: u32 = 2037;
    /// The worker pool stopped accepting invocations.
    pub const POOL_CLOSED: u32 = 2048;
    /// The invocation panicked inside the worker thread.
    pub const WORKER_PANIC: u32 = 2049;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Session level failure (lost connection, authentication), fatal to the connection.
    Connection,
    /// Bad query text or field count mismatch, fatal when building the statement.
    StatementPrepare,
    /// Bind, send or fetch failure, reported per invocation.
    StatementExecute,
    /// A field could not be converted, aborts the decoding of that invocation.
    Conversion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorOrigin {
    Connection,
    Statement,
}

/// The error value delivered to callers: where it comes from, the numeric code and the
/// message captured when the failure happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbError {
    kind: ErrorKind,
    code: u32,
    message: String,
}

/// What an asynchronous invocation reports to its callback.
pub type Completion = std::result::Result<(), DbError>;

impl DbError {
    pub fn new(kind: ErrorKind, code: u32, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
        }
    }

    /// Connection level failure reported by the session.
    pub fn connection(error: WireError) -> Self {
        Self::new(ErrorKind::Connection, error.code, error.message)
    }

    /// The server refused to prepare the statement.
    pub fn prepare(error: WireError) -> Self {
        Self::classify(ErrorKind::StatementPrepare, error)
    }

    /// The statement failed while binding, executing or fetching.
    pub fn execute(error: WireError) -> Self {
        Self::classify(ErrorKind::StatementExecute, error)
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conversion, codes::CONVERSION, message)
    }

    pub fn count_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StatementPrepare, codes::COUNT_MISMATCH, message)
    }

    fn classify(kind: ErrorKind, error: WireError) -> Self {
        if error.is_connection_lost() {
            Self::connection(error)
        } else {
            Self::new(kind, error.code, error.message)
        }
    }

    /// Recover the error value from an error chain, errors that were not raised by this
    /// crate become execution errors carrying the whole chain as message.
    pub fn from_error(error: &anyhow::Error) -> Self {
        match error.downcast_ref::<DbError>() {
            Some(e) => e.clone(),
            None => Self::new(ErrorKind::StatementExecute, 0, format!("{:#}", error)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn origin(&self) -> ErrorOrigin {
        match self.kind {
            ErrorKind::Connection => ErrorOrigin::Connection,
            _ => ErrorOrigin::Statement,
        }
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Connection => "Connection error",
            ErrorKind::StatementPrepare => "Statement prepare error",
            ErrorKind::StatementExecute => "Statement execute error",
            ErrorKind::Conversion => "Conversion error",
        };
        write!(f, "{} {}: {}", kind, self.code, self.message)
    }
}

impl std::error::Error for DbError {}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn lost_connection_is_a_connection_error() {
        let error = DbError::execute(WireError::new(
            codes::SERVER_LOST,
            "Lost connection to server during query",
        ));
        assert_eq!(error.kind(), ErrorKind::Connection);
        assert_eq!(error.origin(), ErrorOrigin::Connection);
        let error = DbError::execute(WireError::new(1146, "Table 'db.t' doesn't exist"));
        assert_eq!(error.kind(), ErrorKind::StatementExecute);
        assert_eq!(error.origin(), ErrorOrigin::Statement);
        assert_eq!(error.code(), 1146);
    }

    #[test]
    fn recovered_from_chain() {
        let result: anyhow::Result<()> =
            Err(DbError::conversion("Character not representable").into());
        let error = result.context("While decoding row 3").unwrap_err();
        let value = DbError::from_error(&error);
        assert_eq!(value.kind(), ErrorKind::Conversion);
        assert_eq!(value.code(), codes::CONVERSION);
        assert_eq!(value.message(), "Character not representable");

        let error = anyhow::anyhow!("Something else").context("While running");
        let value = DbError::from_error(&error);
        assert_eq!(value.kind(), ErrorKind::StatementExecute);
        assert_eq!(value.message(), "While running: Something else");
    }

    #[test]
    fn display() {
        let error = DbError::count_mismatch("Expected 2 parameters, the query has 1");
        assert_eq!(
            error.to_string(),
            "Statement prepare error 2034: Expected 2 parameters, the query has 1"
        );
    }
}
