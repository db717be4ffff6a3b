//! Segment catalog repository and shared repository error type.
//!
//! # Responsibility
//! - Insert, delete and list slugs in the `segments` table.
//!
//! # Invariants
//! - Inserting an existing slug is a `Conflict`, never a silent overwrite.
//! - Deleting a missing slug succeeds and touches nothing.
//! - The catalog never reaches into `users`; deleting a slug leaves every
//!   stored membership list as it was.

use crate::db::DbError;
use crate::model::segment::Segment;
use rusqlite::{Connection, ErrorCode};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by catalog and membership storage.
#[derive(Debug)]
pub enum RepoError {
    /// Store failure (connectivity, lock timeout, constraint other than the
    /// catalog key).
    Db(DbError),
    /// Slug already present in the catalog.
    Conflict(String),
    /// Persisted state could not be decoded.
    InvalidData(String),
    /// Segment list could not be encoded for storage.
    Encode(serde_json::Error),
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Conflict(slug) => write!(f, "segment already exists: {slug}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Encode(err) => write!(f, "failed to encode segment list: {err}"),
            Self::MissingRequiredTable(table) => write!(f, "required table missing: {table}"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "required column missing: {table}.{column}")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Encode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for the segment catalog.
pub trait SegmentRepository {
    /// Inserts one slug; fails with `Conflict` when it already exists.
    fn create_segment(&self, slug: &str) -> RepoResult<()>;
    /// Deletes one slug; returns whether a row was removed.
    fn delete_segment(&self, slug: &str) -> RepoResult<bool>;
    /// Returns every catalog slug sorted ascending.
    fn list_segments(&self) -> RepoResult<Vec<Segment>>;
}

/// SQLite-backed segment catalog.
pub struct SqliteSegmentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSegmentRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        super::ensure_table_ready(conn, "segments", &["slug"])?;
        Ok(Self { conn })
    }
}

impl SegmentRepository for SqliteSegmentRepository<'_> {
    fn create_segment(&self, slug: &str) -> RepoResult<()> {
        match self
            .conn
            .execute("INSERT INTO segments (slug) VALUES (?1);", [slug])
        {
            Ok(_) => Ok(()),
            Err(err) if err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => {
                Err(RepoError::Conflict(slug.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn delete_segment(&self, slug: &str) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM segments WHERE slug = ?1;", [slug])?;
        Ok(changed > 0)
    }

    fn list_segments(&self) -> RepoResult<Vec<Segment>> {
        let mut stmt = self
            .conn
            .prepare("SELECT slug FROM segments ORDER BY slug ASC;")?;
        let mut rows = stmt.query([])?;
        let mut segments = Vec::new();
        while let Some(row) = rows.next()? {
            segments.push(Segment::new(row.get::<_, String>("slug")?));
        }
        Ok(segments)
    }
}
