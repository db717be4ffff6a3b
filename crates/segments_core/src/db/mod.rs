//! SQLite storage bootstrap for the segment service.
//!
//! # Responsibility
//! - Open and configure SQLite connections shared by catalog and membership
//!   repositories.
//! - Create the `segments` and `users` tables before any request runs.
//!
//! # Invariants
//! - Schema version is tracked via `PRAGMA user_version`.
//! - Repositories never touch a connection that was not returned by
//!   [`open_db`] or [`open_db_in_memory`].

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Failure while opening or bootstrapping the segment store.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The directory that should hold the store file does not exist.
    /// SQLite would only report "unable to open database file".
    StoreDirectoryMissing(PathBuf),
    /// The file was written by a newer build; serving it could corrupt
    /// user lists.
    SchemaTooNew { found: u32, supported: u32 },
}

impl DbError {
    /// Stable token used as `error_code` in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "db_sqlite",
            Self::StoreDirectoryMissing(_) => "db_dir_missing",
            Self::SchemaTooNew { .. } => "db_schema_too_new",
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "segment store: {err}"),
            Self::StoreDirectoryMissing(dir) => write!(
                f,
                "segment store directory `{}` does not exist",
                dir.display()
            ),
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "segment store schema version {found} is newer than supported {supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::StoreDirectoryMissing(_) | Self::SchemaTooNew { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
