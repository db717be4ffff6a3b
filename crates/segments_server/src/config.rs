//! Command line and environment configuration.
//!
//! # Responsibility
//! - Parse server options from flags or `SEGMENTS_*` environment variables.
//! - Start process logging from the parsed options.
//!
//! # Invariants
//! - The log directory handed to core logging is always absolute.

use clap::Parser;
use segments_core::{default_log_level, init_logging};
use std::path::PathBuf;

/// Runtime options for the segment HTTP service.
#[derive(Debug, Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Socket address the HTTP listener binds to.
    #[arg(long, env = "SEGMENTS_BIND", default_value = "0.0.0.0:8000")]
    pub bind: String,

    /// SQLite database file; created on first start.
    #[arg(long, env = "SEGMENTS_DB_PATH", default_value = "segments.sqlite3")]
    pub db_path: PathBuf,

    /// Number of request worker threads, each with its own connection.
    #[arg(
        long,
        env = "SEGMENTS_WORKERS",
        default_value_t = 4,
        value_parser = clap::value_parser!(u16).range(1..=64)
    )]
    pub workers: u16,

    /// One of trace|debug|info|warn|error. Defaults by build mode.
    #[arg(long, env = "SEGMENTS_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Directory for rotating log files; relative paths resolve against the
    /// working directory.
    #[arg(long, env = "SEGMENTS_LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,
}

/// Settings consumed by [`crate::server::SegmentServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: String,
    pub db_path: PathBuf,
    pub workers: usize,
}

impl Cli {
    pub fn init_log(&self) -> Result<(), String> {
        let level = self
            .log_level
            .as_deref()
            .unwrap_or_else(|| default_log_level());
        let dir = self.absolute_log_dir()?;
        let dir = dir
            .to_str()
            .ok_or_else(|| format!("log_dir is not valid UTF-8: `{}`", dir.display()))?;
        init_logging(level, dir)
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind: self.bind.clone(),
            db_path: self.db_path.clone(),
            workers: usize::from(self.workers),
        }
    }

    fn absolute_log_dir(&self) -> Result<PathBuf, String> {
        if self.log_dir.is_absolute() {
            return Ok(self.log_dir.clone());
        }
        let cwd = std::env::current_dir()
            .map_err(|err| format!("failed to resolve working directory: {err}"))?;
        Ok(cwd.join(&self.log_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::{CommandFactory, Parser};
    use std::ffi::OsStr;

    // Reads declared defaults instead of parsing, so `SEGMENTS_*` variables
    // set in the test environment cannot leak in.
    #[test]
    fn defaults_match_listener_and_store_conventions() {
        let command = Cli::command();
        let declared = |id: &str| {
            let arg = command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .unwrap();
            (
                arg.get_env().and_then(OsStr::to_str).map(str::to_owned),
                arg.get_default_values()
                    .iter()
                    .map(|value| value.to_str().unwrap().to_owned())
                    .collect::<Vec<_>>(),
            )
        };

        assert_eq!(
            declared("bind"),
            (Some("SEGMENTS_BIND".into()), vec!["0.0.0.0:8000".to_owned()])
        );
        assert_eq!(
            declared("db_path"),
            (Some("SEGMENTS_DB_PATH".into()), vec!["segments.sqlite3".to_owned()])
        );
        assert_eq!(
            declared("workers"),
            (Some("SEGMENTS_WORKERS".into()), vec!["4".to_owned()])
        );
        assert_eq!(
            declared("log_dir"),
            (Some("SEGMENTS_LOG_DIR".into()), vec!["logs".to_owned()])
        );
        assert_eq!(
            declared("log_level"),
            (Some("SEGMENTS_LOG_LEVEL".into()), Vec::<String>::new())
        );
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "segments_server",
            "--bind",
            "127.0.0.1:9000",
            "--db-path",
            "/tmp/x.sqlite3",
            "--workers",
            "2",
            "--log-level",
            "warn",
        ])
        .unwrap();
        assert_eq!(cli.server_config().workers, 2);
        assert_eq!(cli.log_level.as_deref(), Some("warn"));
        assert_eq!(cli.server_config().bind, "127.0.0.1:9000");
    }

    #[test]
    fn worker_count_is_bounded() {
        assert!(Cli::try_parse_from(["segments_server", "--workers", "0"]).is_err());
        assert!(Cli::try_parse_from(["segments_server", "--workers", "65"]).is_err());
    }

    #[test]
    fn relative_log_dir_resolves_to_absolute() {
        let cli = Cli::try_parse_from(["segments_server", "--log-dir", "var/log"]).unwrap();
        let resolved = cli.absolute_log_dir().unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("var/log"));
    }
}
