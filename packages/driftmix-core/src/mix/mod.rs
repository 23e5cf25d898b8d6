//! Per-guild mix playback.
//!
//! Everything that makes one guild's mix tick: the queue, the voice
//! handshake, candidate collection and the player that drives the node.
//!
//! # Module Structure
//!
//! - `song` - Domain types for songs, candidates and mix seeds
//! - `queue` - Pointer-based queue that keeps played history
//! - `voice` - Voice handshake fact accumulation
//! - `collector` - Candidate screening and related-page traversal
//! - `player` - Per-guild playback state machine

pub mod collector;
pub mod player;
pub mod queue;
pub mod song;
pub mod voice;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export domain types
pub use song::{Candidate, CandidateKind, SeedVideo, Song};

// Re-export the player surface
pub use collector::{CollectionCounters, CounterSnapshot, SongCollector};
pub use player::{GuildPlayer, PlayerContext};
pub use queue::SongQueue;
pub use voice::{VoiceHandshake, VoiceLink};
