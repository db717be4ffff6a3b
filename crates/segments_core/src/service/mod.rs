//! Core use-case services.
//!
//! # Responsibility
//! - Expose catalog and membership use-cases to the HTTP layer.
//! - Emit one metadata-only log event per use-case call.
//!
//! # Invariants
//! - Services never issue SQL themselves; all storage goes through
//!   repository traits, so tests can substitute in-memory doubles.

pub mod catalog_service;
pub mod membership_service;
