//! HTTP surface for the segment membership service.
//!
//! # Responsibility
//! - Parse runtime configuration.
//! - Route HTTP requests onto `segments_core` services.
//! - Own the listener and worker pool lifecycle.

pub mod config;
pub mod http;
pub mod server;

pub use config::{Cli, ServerConfig};
pub use server::{SegmentServer, ServerError, ShutdownHandle};
