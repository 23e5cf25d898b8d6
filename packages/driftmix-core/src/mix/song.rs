//! Song and candidate models.

use serde::{Deserialize, Serialize};

/// A queued, playable song. Immutable once collected.
///
/// `source_id` is the opaque catalog identifier handed to the resolver when
/// the song reaches the front of the queue; nothing is resolved ahead of
/// time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub title: String,
    /// Known duration; collection filtering rejects candidates without one.
    pub duration_seconds: u64,
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_avatar_url: Option<String>,
}

/// Total classification of a discovery result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateKind {
    /// Live broadcast, no bounded duration.
    Live,
    /// Multi-item container, not itself playable.
    Playlist,
    /// Ordinary video. Duration is `None` when the catalog omits it.
    Video { duration_seconds: Option<u64> },
}

/// A discovery result that has not yet passed collection filters.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub source_id: String,
    pub title: String,
    pub kind: CandidateKind,
    pub thumbnail_url: Option<String>,
    pub channel_name: Option<String>,
    pub channel_url: Option<String>,
    pub channel_avatar_url: Option<String>,
}

/// A starting video plus its immediately-attached related candidates, as
/// produced by the catalog for a "start mix" request.
#[derive(Debug, Clone)]
pub struct SeedVideo {
    pub video: Candidate,
    pub related: Vec<Candidate>,
}
