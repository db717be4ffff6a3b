//! Segment and membership delta model.
//!
//! # Responsibility
//! - Define the `{slug}` record used by the catalog and by user lists.
//! - Compute a user's next segment list from a requested delta.
//!
//! # Invariants
//! - Additions are appended in request order without deduplication.
//! - Removals run after additions and drop every matching entry, so a slug
//!   that is both added and removed ends up absent.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

/// Natural key of a segment.
pub type SegmentSlug = String;

/// Named tag that can be assigned to users.
///
/// Serialized as `{"slug": "..."}` both on the wire and inside the stored
/// per-user list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    pub slug: SegmentSlug,
}

impl Segment {
    pub fn new(slug: impl Into<SegmentSlug>) -> Self {
        Self { slug: slug.into() }
    }
}

/// Requested change to one user's segment list.
///
/// Both fields default to empty when missing from the request body or sent
/// as `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SegmentDelta {
    #[serde(rename = "add", default, deserialize_with = "null_as_empty")]
    pub to_add: Vec<SegmentSlug>,
    #[serde(rename = "remove", default, deserialize_with = "null_as_empty")]
    pub to_remove: Vec<SegmentSlug>,
}

impl SegmentDelta {
    pub fn new(to_add: Vec<SegmentSlug>, to_remove: Vec<SegmentSlug>) -> Self {
        Self { to_add, to_remove }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<SegmentSlug>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<SegmentSlug>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Applies `delta` to `current` and returns the resulting list.
///
/// Rules:
/// - every slug of `to_add` is appended, in order, even if already present;
/// - the whole post-append list is then filtered against `to_remove`.
pub fn apply_segment_delta(mut current: Vec<Segment>, delta: &SegmentDelta) -> Vec<Segment> {
    current.extend(delta.to_add.iter().cloned().map(Segment::new));

    if delta.to_remove.is_empty() {
        return current;
    }
    let removed: HashSet<&str> = delta.to_remove.iter().map(String::as_str).collect();
    current.retain(|segment| !removed.contains(segment.slug.as_str()));
    current
}
