//! Connection bootstrap utilities.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure pragmas needed by concurrent request workers.
//! - Apply schema migrations before handing out a connection.
//!
//! # Invariants
//! - Returned connections have a busy timeout, so a writer waiting on another
//!   worker's transaction blocks instead of failing immediately.
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens (or creates) a SQLite database file and applies pending migrations.
///
/// Every worker thread opens its own connection to the same file.
///
/// # Errors
/// - [`DbError::StoreDirectoryMissing`] when the parent directory of `path`
///   does not exist; the file itself is created on demand.
///
/// # Side effects
/// - Switches the database to WAL journaling so readers do not block the
///   single writer.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        if !dir.is_dir() {
            let err = DbError::StoreDirectoryMissing(dir.to_path_buf());
            error!(
                "event=db_open module=db status=error mode=file error_code={} error={}",
                err.code(),
                err
            );
            return Err(err);
        }
    }
    open_with("file", || Connection::open(path), true)
}

/// Opens an in-memory SQLite database and applies pending migrations.
///
/// The database lives as long as the returned connection; used by tests.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with("memory", Connection::open_in_memory, false)
}

fn open_with<F>(mode: &'static str, open: F, wal: bool) -> DbResult<Connection>
where
    F: FnOnce() -> rusqlite::Result<Connection>,
{
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let mut conn = match open() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, wal) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code={} error={}",
                started_at.elapsed().as_millis(),
                err.code(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection, wal: bool) -> DbResult<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    if wal {
        // journal_mode returns the resulting mode as a row.
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    }
    apply_migrations(conn)?;
    Ok(())
}
