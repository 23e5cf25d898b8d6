//! Collaborator seams.
//!
//! The core never talks to the chat platform or the candidate catalog
//! directly; hosts inject these at bootstrap, tests inject recording doubles.

use async_trait::async_trait;
use thiserror::Error;

use crate::mix::song::Candidate;
use crate::types::{ChannelId, GuildId};

pub use crate::node::http::{ResolveError, ResolveResult};

/// Resolves an opaque song `source_id` into a node-playable track reference.
///
/// `Ok(None)` means the catalog has nothing playable for this id; errors mean
/// the lookup itself failed. Both are recovered by skipping the song.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, source_id: &str) -> ResolveResult<Option<String>>;
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Candidate source failure: {0}")]
    Fetch(String),
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Pages through candidates related to a seed video.
///
/// Pages are indexed from zero and follow the seed's own attached related
/// ring. A page may be fetched more than once (retries); an empty page ends
/// the traversal.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn related_page(
        &self,
        seed_source_id: &str,
        page_index: u32,
    ) -> SourceResult<Vec<Candidate>>;
}

/// A source with no related candidates. For hosts that only rehydrate and
/// control existing queues.
pub struct EmptyCandidateSource;

#[async_trait]
impl CandidateSource for EmptyCandidateSource {
    async fn related_page(&self, _seed: &str, _page_index: u32) -> SourceResult<Vec<Candidate>> {
        Ok(Vec::new())
    }
}

/// Outbound voice-state intent to the chat gateway. Fire-and-forget: the
/// session and server facts produced by the join arrive back later through
/// the registry dispatch methods, filtered by the caller to this bot user.
pub trait VoiceGateway: Send + Sync {
    fn request_join(&self, guild_id: GuildId, channel_id: ChannelId);
}

/// Gateway stand-in that drops join intents.
pub struct NoopVoiceGateway;

impl VoiceGateway for NoopVoiceGateway {
    fn request_join(&self, _guild_id: GuildId, _channel_id: ChannelId) {}
}

/// Commands the audio node accepts for one guild's player.
///
/// Implemented by the live [`crate::node::client::NodeClient`]; players hold
/// this seam so tests can record command traffic instead of opening sockets.
/// All methods are fire-and-forget.
pub trait NodeControl: Send + Sync {
    fn play(&self, guild_id: GuildId, track: &str, start_time_ms: u64, paused: bool);
    fn stop(&self, guild_id: GuildId);
    fn set_pause(&self, guild_id: GuildId, paused: bool);
    fn seek(&self, guild_id: GuildId, position_ms: u64);
    fn voice_update(&self, guild_id: GuildId, session_id: &str, token: &str, endpoint: &str);
}
