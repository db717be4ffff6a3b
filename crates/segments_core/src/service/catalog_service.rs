//! Segment catalog use-case service.

use crate::model::segment::Segment;
use crate::repo::segment_repo::{RepoError, RepoResult, SegmentRepository};
use log::{info, warn};

/// Use-case service for creating, deleting and listing segments.
pub struct CatalogService<R: SegmentRepository> {
    repo: R,
}

impl<R: SegmentRepository> CatalogService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Declares a new segment.
    ///
    /// Returns `RepoError::Conflict` when the slug already exists.
    pub fn create_segment(&self, slug: &str) -> RepoResult<()> {
        match self.repo.create_segment(slug) {
            Ok(()) => {
                info!("event=segment_create module=catalog status=ok");
                Ok(())
            }
            Err(err) => {
                let code = match &err {
                    RepoError::Conflict(_) => "segment_exists",
                    _ => "store_failed",
                };
                warn!("event=segment_create module=catalog status=error error_code={code} error={err}");
                Err(err)
            }
        }
    }

    /// Removes a segment from the catalog.
    ///
    /// Deleting an unknown slug is a successful no-op. Users that list the
    /// slug keep it.
    pub fn delete_segment(&self, slug: &str) -> RepoResult<()> {
        let removed = self.repo.delete_segment(slug)?;
        info!("event=segment_delete module=catalog status=ok removed={removed}");
        Ok(())
    }

    /// Lists every declared segment sorted by slug.
    pub fn list_segments(&self) -> RepoResult<Vec<Segment>> {
        self.repo.list_segments()
    }
}
