//! SQLite storage bootstrap for the local record backend.
//!
//! # Responsibility
//! - Open and configure SQLite connections.
//! - Apply schema migrations in deterministic order.
//! - Provide `LocalRecordBackend`, a `RecordBackend` used for local
//!   development and tests in place of the hosted database.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - No record is read or written before migrations succeed.

use crate::backend::BackendError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;
mod records;

pub use open::{open_db, open_db_in_memory};
pub use records::LocalRecordBackend;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// Stored row body is not a JSON object.
    CorruptRow { table: String, id: String },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::CorruptRow { table, id } => {
                write!(f, "stored row `{table}/{id}` is not a JSON object")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } | Self::CorruptRow { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<DbError> for BackendError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(err, message))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Rejected {
                    status: 409,
                    message: message.unwrap_or_else(|| err.to_string()),
                }
            }
            other => Self::Status {
                status: 500,
                message: other.to_string(),
            },
        }
    }
}
