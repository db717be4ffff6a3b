//! Membership use-case service.
//!
//! # Responsibility
//! - Read a user's active segments.
//! - Apply add/remove deltas to a user's segment list.
//!
//! # Invariants
//! - An unknown user has no segments; reading never creates a row.
//! - A failed delta leaves the stored list untouched.

use crate::model::segment::{Segment, SegmentDelta};
use crate::repo::membership_repo::MembershipRepository;
use crate::repo::segment_repo::RepoResult;
use log::{error, info};
use std::time::Instant;

/// Use-case service for per-user segment membership.
pub struct MembershipService<R: MembershipRepository> {
    repo: R,
}

impl<R: MembershipRepository> MembershipService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Returns the user's segments in stored order.
    pub fn get_active_segments(&self, user_id: &str) -> RepoResult<Vec<Segment>> {
        Ok(self.repo.load_segments(user_id)?.unwrap_or_default())
    }

    /// Appends `delta.to_add`, then drops every entry named in
    /// `delta.to_remove`, and stores the result.
    ///
    /// The first delta for a user creates its row, even when the result is
    /// empty.
    pub fn apply_delta(&mut self, user_id: &str, delta: &SegmentDelta) -> RepoResult<()> {
        let started_at = Instant::now();
        match self.repo.apply_delta(user_id, delta) {
            Ok(next) => {
                info!(
                    "event=membership_apply module=membership status=ok added={} removed={} size={} duration_ms={}",
                    delta.to_add.len(),
                    delta.to_remove.len(),
                    next.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=membership_apply module=membership status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }
}
