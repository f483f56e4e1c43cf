//! Database error types.

use derive_more::{Display, Error};

/// How a database failure should be interpreted by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// A unique constraint rejected the write. The idempotency claim
    /// treats this as "another caller already owns the key".
    Conflict,
    /// Any other failure.
    Other,
}

/// Database error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Database error: {} at {}:{}", message, file, line)]
pub struct DbError {
    /// Error message.
    pub message: String,
    /// Failure classification.
    pub kind: DbErrorKind,
    /// Line number where the error occurred.
    pub line: u32,
    /// Source file where the error occurred.
    pub file: &'static str,
}

impl DbError {
    /// Creates a new database error with caller location tracking.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(message, DbErrorKind::Other)
    }

    /// Creates a new database error with an explicit kind.
    #[track_caller]
    pub fn with_kind(message: impl Into<String>, kind: DbErrorKind) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            kind,
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// True when the error came from a unique-constraint violation.
    pub fn is_conflict(&self) -> bool {
        self.kind == DbErrorKind::Conflict
    }
}

impl From<diesel::result::Error> for DbError {
    #[track_caller]
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        let kind = match &err {
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => DbErrorKind::Conflict,
            _ => DbErrorKind::Other,
        };
        Self::with_kind(format!("Diesel error: {}", err), kind)
    }
}

impl From<diesel::ConnectionError> for DbError {
    #[track_caller]
    fn from(err: diesel::ConnectionError) -> Self {
        Self::new(format!("Connection error: {}", err))
    }
}
