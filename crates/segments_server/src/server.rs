//! Listener and worker pool.
//!
//! # Responsibility
//! - Bind the HTTP listener and bootstrap the database before serving.
//! - Run a fixed pool of worker threads that pull requests from the shared
//!   listener.
//! - Stop every worker when shutdown is requested.
//!
//! # Invariants
//! - Each worker owns exactly one SQLite connection for its whole life.
//! - A request is answered by the worker that received it; no request state
//!   crosses threads.

use crate::config::ServerConfig;
use crate::http::{self, MAX_BODY_BYTES};
use log::{error, info, warn};
use rusqlite::Connection;
use segments_core::db::{open_db, DbError};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Read;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tiny_http::{Header, Request, Response, Server};

/// Failure while starting or running the server.
#[derive(Debug)]
pub enum ServerError {
    Db(DbError),
    Bind { addr: String, message: String },
    Worker(String),
}

impl Display for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Bind { addr, message } => write!(f, "failed to bind `{addr}`: {message}"),
            Self::Worker(message) => write!(f, "worker failed: {message}"),
        }
    }
}

impl Error for ServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for ServerError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

/// Bound but not yet serving HTTP server.
pub struct SegmentServer {
    listener: Arc<Server>,
    db_path: PathBuf,
    workers: usize,
    stopping: Arc<AtomicBool>,
}

/// Cloneable trigger that stops a running [`SegmentServer`].
#[derive(Clone)]
pub struct ShutdownHandle {
    listener: Arc<Server>,
    workers: usize,
    stopping: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Wakes every worker blocked on the listener; each exits after its
    /// in-flight request.
    pub fn shutdown(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("event=server_shutdown module=server status=start");
        for _ in 0..self.workers {
            self.listener.unblock();
        }
    }
}

impl SegmentServer {
    /// Applies migrations to `config.db_path` and binds `config.bind`.
    pub fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        drop(open_db(&config.db_path)?);

        let listener = Server::http(config.bind.as_str()).map_err(|err| ServerError::Bind {
            addr: config.bind.clone(),
            message: err.to_string(),
        })?;

        let server = Self {
            listener: Arc::new(listener),
            db_path: config.db_path,
            workers: config.workers.max(1),
            stopping: Arc::new(AtomicBool::new(false)),
        };
        info!(
            "event=server_bind module=server status=ok addr={} workers={}",
            server
                .local_addr()
                .map_or_else(|| config.bind.clone(), |addr| addr.to_string()),
            server.workers
        );
        Ok(server)
    }

    /// Actual listening address; useful when binding port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.server_addr().to_ip()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            listener: Arc::clone(&self.listener),
            workers: self.workers,
            stopping: Arc::clone(&self.stopping),
        }
    }

    /// Serves requests until [`ShutdownHandle::shutdown`] is called.
    ///
    /// Returns the first worker failure, after every worker has stopped.
    pub fn run(self) -> Result<(), ServerError> {
        let mut handles: Vec<JoinHandle<Result<(), ServerError>>> =
            Vec::with_capacity(self.workers);
        for index in 0..self.workers {
            let listener = Arc::clone(&self.listener);
            let db_path = self.db_path.clone();
            let stopping = Arc::clone(&self.stopping);
            let spawned = std::thread::Builder::new()
                .name(format!("segments-worker-{index}"))
                .spawn(move || run_worker(index, &listener, &db_path, &stopping));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    self.shutdown_handle().shutdown();
                    join_workers(handles)?;
                    return Err(ServerError::Worker(format!(
                        "failed to spawn worker {index}: {err}"
                    )));
                }
            }
        }

        let result = join_workers(handles);
        info!("event=server_shutdown module=server status=ok");
        result
    }
}

fn join_workers(handles: Vec<JoinHandle<Result<(), ServerError>>>) -> Result<(), ServerError> {
    let mut first_error = None;
    for handle in handles {
        let outcome = match handle.join() {
            Ok(outcome) => outcome,
            Err(_) => Err(ServerError::Worker("worker thread panicked".to_string())),
        };
        if let Err(err) = outcome {
            first_error.get_or_insert(err);
        }
    }
    first_error.map_or(Ok(()), Err)
}

fn run_worker(
    index: usize,
    listener: &Server,
    db_path: &Path,
    stopping: &AtomicBool,
) -> Result<(), ServerError> {
    let mut conn = match open_db(db_path) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=worker_start module=server status=error worker={index} error_code={} error={err}",
                err.code()
            );
            return Err(err.into());
        }
    };
    info!("event=worker_start module=server status=ok worker={index}");

    for request in listener.incoming_requests() {
        serve_one(&mut conn, request);
        if stopping.load(Ordering::SeqCst) {
            break;
        }
    }

    info!("event=worker_stop module=server status=ok worker={index}");
    Ok(())
}

fn serve_one(conn: &mut Connection, mut request: Request) {
    let started_at = Instant::now();
    let method = request.method().clone();

    let (route, response) = match read_body(&mut request) {
        Ok(body) => http::respond(conn, &method, request.url(), &body),
        Err(err) => ("unread", err.into()),
    };

    info!(
        "event=http_request module=http method={} route={} code={} duration_ms={}",
        method,
        route,
        response.status,
        started_at.elapsed().as_millis()
    );

    if let Err(err) = request.respond(into_tiny_response(response)) {
        warn!("event=http_respond module=http status=error route={route} error={err}");
    }
}

fn read_body(request: &mut Request) -> Result<Vec<u8>, http::ApiError> {
    let mut body = Vec::new();
    request
        .as_reader()
        .take(MAX_BODY_BYTES as u64 + 1)
        .read_to_end(&mut body)
        .map_err(|err| http::ApiError::BadRequest(format!("failed to read body: {err}")))?;
    if body.len() > MAX_BODY_BYTES {
        return Err(http::ApiError::BadRequest(format!(
            "request body exceeds {MAX_BODY_BYTES} bytes"
        )));
    }
    Ok(body)
}

fn into_tiny_response(response: http::ApiResponse) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut tiny =
        Response::from_data(response.body.into_bytes()).with_status_code(response.status);
    let headers = [
        (&b"Content-Type"[..], response.content_type),
        (&b"Allow"[..], response.allow),
    ];
    for (name, value) in headers {
        if let Some(value) = value {
            if let Ok(header) = Header::from_bytes(name, value.as_bytes()) {
                tiny = tiny.with_header(header);
            }
        }
    }
    tiny
}
