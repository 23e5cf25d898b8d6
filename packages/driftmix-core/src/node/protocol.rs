//! Wire model for the node control plane.
//!
//! One JSON object per text frame, discriminated by `op`. Incoming `event`
//! frames carry a second discriminator in `type`. Guild ids travel as
//! decimal strings in both directions.

use serde::{Deserialize, Serialize};

use crate::types::GuildId;

// ─────────────────────────────────────────────────────────────────────────────
// Outgoing commands
// ─────────────────────────────────────────────────────────────────────────────

/// Commands submitted to the node. All fire-and-forget; success is inferred
/// from subsequent `playerUpdate`/`event` traffic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum OutgoingMessage {
    #[serde(rename_all = "camelCase")]
    Play {
        guild_id: GuildId,
        track: String,
        /// Milliseconds into the track to start from.
        start_time: u64,
        pause: bool,
    },
    #[serde(rename_all = "camelCase")]
    Stop { guild_id: GuildId },
    #[serde(rename_all = "camelCase")]
    Pause { guild_id: GuildId, pause: bool },
    #[serde(rename_all = "camelCase")]
    Seek { guild_id: GuildId, position: u64 },
    #[serde(rename_all = "camelCase")]
    VoiceUpdate {
        guild_id: GuildId,
        session_id: String,
        event: VoiceServerEvent,
    },
}

/// Voice server assignment relayed inside `voiceUpdate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceServerEvent {
    pub token: String,
    pub endpoint: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Incoming messages
// ─────────────────────────────────────────────────────────────────────────────

/// Messages pushed by the node.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum IncomingMessage {
    Stats(ServerStats),
    #[serde(rename_all = "camelCase")]
    PlayerUpdate {
        guild_id: GuildId,
        state: PlayerUpdateState,
    },
    Event(PlayerEvent),
}

/// Periodic position report for one guild's player.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerUpdateState {
    /// Node wall-clock, unix milliseconds.
    pub time: u64,
    /// Milliseconds into the current track; absent right after a stop.
    pub position: Option<u64>,
    /// Whether the node's voice connection for this guild is up.
    pub connected: bool,
}

/// Player lifecycle events, discriminated by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    #[serde(rename = "TrackEndEvent", rename_all = "camelCase")]
    TrackEnd {
        guild_id: GuildId,
        track: String,
        reason: TrackEndReason,
    },
    #[serde(rename = "TrackExceptionEvent", rename_all = "camelCase")]
    TrackException {
        guild_id: GuildId,
        track: String,
        error: String,
    },
    #[serde(rename = "TrackStuckEvent", rename_all = "camelCase")]
    TrackStuck {
        guild_id: GuildId,
        track: String,
        threshold_ms: u64,
    },
    #[serde(rename = "WebSocketClosedEvent", rename_all = "camelCase")]
    WebSocketClosed {
        guild_id: GuildId,
        code: u16,
        reason: String,
        by_remote: bool,
    },
}

impl PlayerEvent {
    /// The guild this event belongs to, used for routing.
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::TrackEnd { guild_id, .. }
            | Self::TrackException { guild_id, .. }
            | Self::TrackStuck { guild_id, .. }
            | Self::WebSocketClosed { guild_id, .. } => *guild_id,
        }
    }
}

/// Why a track stopped. Only `Finished` advances the queue; the others are
/// consequences of commands this client itself issued, or are paired with a
/// stuck/exception event that drives the reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

/// Node-wide load report, replaced wholesale on every `stats` frame.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerStats {
    pub players: u32,
    pub playing_players: u32,
    /// Node uptime in milliseconds.
    pub uptime: u64,
    pub memory: MemoryStats,
    pub cpu: CpuStats,
    /// Absent unless the node is actively sending audio frames.
    pub frame_stats: Option<FrameStats>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemoryStats {
    pub free: u64,
    pub used: u64,
    pub allocated: u64,
    pub reservable: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CpuStats {
    pub cores: u32,
    pub system_load: f64,
    /// Load attributable to the audio node process itself.
    pub lavalink_load: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FrameStats {
    pub sent: u64,
    pub nulled: u64,
    pub deficit: i64,
}
