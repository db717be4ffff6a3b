//! Domain model for segments and per-user membership.
//!
//! # Responsibility
//! - Define the records exchanged between HTTP, services and storage.
//! - Own the pure membership delta computation.
//!
//! # Invariants
//! - A segment is identified by its `slug` alone.
//! - Membership lists keep insertion order and may contain repeated slugs.

pub mod segment;
