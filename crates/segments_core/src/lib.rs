//! Core domain logic for the segment membership service.
//! Storage, membership rules and logging live here; the HTTP surface lives
//! in `segments_server`.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::segment::{apply_segment_delta, Segment, SegmentDelta, SegmentSlug};
pub use repo::membership_repo::{MembershipRepository, SqliteMembershipRepository};
pub use repo::segment_repo::{RepoError, RepoResult, SegmentRepository, SqliteSegmentRepository};
pub use service::catalog_service::CatalogService;
pub use service::membership_service::MembershipService;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
