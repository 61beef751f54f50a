use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the statement primitives and the runners built on them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to open database at {path}: {message}")]
    Connection { path: String, message: String },

    #[error("database handle is closed")]
    HandleClosed,

    #[error(transparent)]
    Statement(#[from] StatementError),

    #[error("failed to close database: {message}")]
    Close { message: String },
}

impl Error {
    /// True for failures of the handle itself rather than of one statement.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection { .. } | Error::HandleClosed)
    }

    pub fn as_statement_error(&self) -> Option<&StatementError> {
        match self {
            Error::Statement(err) => Some(err),
            _ => None,
        }
    }
}

/// A single statement failed. The handle it ran on is still usable.
///
/// `message` is the store's own text, untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{message}")]
pub struct StatementError {
    pub message: String,
    pub sql: String,
    /// Extended SQLite result code, when the failure came from the engine.
    pub code: Option<i32>,
}

impl StatementError {
    pub(crate) fn from_sqlite(err: rusqlite::Error, sql: &str) -> Self {
        let (message, code) = match err {
            rusqlite::Error::SqliteFailure(failure, Some(message)) => (message, Some(failure.extended_code)),
            rusqlite::Error::SqliteFailure(failure, None) => (failure.to_string(), Some(failure.extended_code)),
            // Display would append the SQL and offset to the engine's text
            rusqlite::Error::SqlInputError { error, msg, .. } => (msg, Some(error.extended_code)),
            other => (other.to_string(), None),
        };
        Self {
            message,
            sql: sql.to_string(),
            code,
        }
    }

    pub(crate) fn new(message: impl Into<String>, sql: &str) -> Self {
        Self {
            message: message.into(),
            sql: sql.to_string(),
            code: None,
        }
    }

    pub fn is_constraint_violation(&self) -> bool {
        self.code
            .map(|code| code & 0xff == rusqlite::ffi::SQLITE_CONSTRAINT)
            .unwrap_or(false)
    }
}
