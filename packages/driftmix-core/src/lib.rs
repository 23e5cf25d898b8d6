//! Driftmix Core - per-guild mix playback over an external audio node.
//!
//! This crate provides the playback engine for Driftmix: endless
//! related-song mixes, one independent player per guild, driving a remote
//! audio-rendering node over a persistent WebSocket control plane. It is
//! designed to be embedded by a gateway host that supplies the
//! chat-facing pieces.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`types`]: Guild and channel identifiers
//! - [`state`]: Core configuration
//! - [`node`]: Audio node client (socket control plane, HTTP resolution)
//! - [`mix`]: Per-guild player, queue, collector and voice handshake
//! - [`services`]: Player registry, event routing and session persistence
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! The crate defines several traits to decouple the playback core from
//! the hosting gateway:
//!
//! - [`TrackResolver`](traits::TrackResolver): Source reference to playable track
//! - [`CandidateSource`](traits::CandidateSource): Related-song pages for collection
//! - [`VoiceGateway`](traits::VoiceGateway): Voice channel join requests
//! - [`Notifier`](notify::Notifier): User-facing failure notices
//!
//! Each trait has a no-op or node-backed default suitable for the
//! standalone server. A chat-platform host provides its own
//! implementations.

#![warn(clippy::all)]

pub mod bootstrap;
pub mod error;
pub mod mix;
pub mod node;
pub mod notify;
pub mod protocol_constants;
pub mod services;
pub mod state;
pub mod traits;
pub mod types;

// Re-export commonly used types at the crate root
pub use error::{DriftmixError, DriftmixResult};
pub use state::{CoreConfig, NodeConfig};
pub use types::{ChannelId, GuildId};

// Re-export trait abstractions
pub use notify::{LoggingNotifier, NoopNotifier, Notifier};
pub use traits::{
    CandidateSource, EmptyCandidateSource, NodeControl, NoopVoiceGateway, SourceError,
    SourceResult, TrackResolver, VoiceGateway,
};

// Re-export mix types
pub use mix::{Candidate, CandidateKind, GuildPlayer, SeedVideo, Song};

// Re-export node types
pub use node::{NodeClient, NodeEvent, ResolveError, ResolveResult, ServerStats};

// Re-export service types
pub use services::{PlayerRegistry, PlayerSnapshot, SnapshotStore};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, BootstrappedServices};
