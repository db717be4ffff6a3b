//! Per-user segment list repository.
//!
//! # Responsibility
//! - Read and upsert the JSON-encoded segment list stored in `users.segments`.
//! - Run the load, apply, write sequence of a membership delta as one
//!   transaction.
//!
//! # Invariants
//! - A user without a row reads as an empty list.
//! - A stored JSON `null` or SQL `NULL` list reads as an empty list.
//! - Writes replace the whole list; an emptied list is stored as `[]` and the
//!   row is kept.
//! - `apply_delta` holds the SQLite write lock from its read to its commit, so
//!   concurrent deltas for one user are serialized instead of overwriting
//!   each other.

use crate::model::segment::{apply_segment_delta, Segment, SegmentDelta};
use crate::repo::segment_repo::{RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

/// Repository interface for per-user segment lists.
pub trait MembershipRepository {
    /// Returns the stored list, or `None` when the user has no row.
    fn load_segments(&self, user_id: &str) -> RepoResult<Option<Vec<Segment>>>;
    /// Inserts or fully replaces the stored list for `user_id`.
    fn store_segments(&self, user_id: &str, segments: &[Segment]) -> RepoResult<()>;
    /// Applies `delta` to the stored list atomically and returns the result.
    fn apply_delta(&mut self, user_id: &str, delta: &SegmentDelta) -> RepoResult<Vec<Segment>>;
}

/// SQLite-backed membership repository.
pub struct SqliteMembershipRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteMembershipRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        super::ensure_table_ready(conn, "users", &["id", "segments"])?;
        Ok(Self { conn })
    }
}

impl MembershipRepository for SqliteMembershipRepository<'_> {
    fn load_segments(&self, user_id: &str) -> RepoResult<Option<Vec<Segment>>> {
        load_segments_in(self.conn, user_id)
    }

    fn store_segments(&self, user_id: &str, segments: &[Segment]) -> RepoResult<()> {
        upsert_segments_in(self.conn, user_id, segments)
    }

    fn apply_delta(&mut self, user_id: &str, delta: &SegmentDelta) -> RepoResult<Vec<Segment>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = load_segments_in(&tx, user_id)?.unwrap_or_default();
        let next = apply_segment_delta(current, delta);
        upsert_segments_in(&tx, user_id, &next)?;
        tx.commit()?;
        Ok(next)
    }
}

fn load_segments_in(conn: &Connection, user_id: &str) -> RepoResult<Option<Vec<Segment>>> {
    let stored: Option<Option<String>> = conn
        .query_row(
            "SELECT segments FROM users WHERE id = ?1;",
            [user_id],
            |row| row.get(0),
        )
        .optional()?;

    match stored {
        None => Ok(None),
        Some(blob) => decode_segment_list(user_id, blob.as_deref()).map(Some),
    }
}

fn upsert_segments_in(conn: &Connection, user_id: &str, segments: &[Segment]) -> RepoResult<()> {
    let blob = encode_segment_list(segments)?;
    conn.execute(
        "INSERT INTO users (id, segments) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET segments = excluded.segments;",
        params![user_id, blob],
    )?;
    Ok(())
}

/// Decodes one stored `users.segments` value.
pub fn decode_segment_list(user_id: &str, blob: Option<&str>) -> RepoResult<Vec<Segment>> {
    let Some(text) = blob else {
        return Ok(Vec::new());
    };
    serde_json::from_str::<Option<Vec<Segment>>>(text)
        .map(Option::unwrap_or_default)
        .map_err(|err| {
            RepoError::InvalidData(format!(
                "malformed segment list for user `{user_id}` in users.segments: {err}"
            ))
        })
}

/// Encodes a segment list into its stored form.
pub fn encode_segment_list(segments: &[Segment]) -> RepoResult<String> {
    serde_json::to_string(segments).map_err(RepoError::Encode)
}
