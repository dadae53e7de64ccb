use sea_orm::{DbErr, SqlErr};
use serde::{Deserialize, Serialize};

/// Coarse classification shared by every service error.
///
/// Outer layers (RPC, HTTP) only need this to decide how to report a failure;
/// the concrete service error carries the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    NotAuthorized,
    Conflict,
    Internal,
}

impl ErrorKind {
    /// HTTP status an adapter should answer with.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::InvalidArgument => 400,
            ErrorKind::NotAuthorized => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        }
    }

    /// Whether the caller may simply retry. Conflicts need a re-fetch first.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::Conflict)
    }
}

/// True when the store rejected a write because of a unique index.
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
