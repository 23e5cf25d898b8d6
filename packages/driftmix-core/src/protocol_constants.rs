//! Protocol and application constants.
//!
//! Values the node control plane or the playback engine rely on. Changing
//! these changes observable behavior, so they live in one place.

// ─────────────────────────────────────────────────────────────────────────────
// Node handshake
// ─────────────────────────────────────────────────────────────────────────────

/// Client identifier sent in the `Client-Name` handshake header.
pub const CLIENT_NAME: &str = "driftmix";

/// Handshake header carrying the bot user id the node plays on behalf of.
pub const HEADER_USER_ID: &str = "User-Id";

/// Handshake header carrying [`CLIENT_NAME`].
pub const HEADER_CLIENT_NAME: &str = "Client-Name";

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed delay between reconnect attempts to the node socket.
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;

/// Songs longer than this are excluded from collection (15 minutes).
pub const DEFAULT_MAX_SONG_DURATION_SECS: u64 = 900;

/// Quiet period after a state change before a snapshot is written.
pub const DEFAULT_PERSIST_DEBOUNCE_MS: u64 = 500;

/// Whole-request timeout for node HTTP calls (resolution must not stall the
/// playback cascade indefinitely).
pub const HTTP_TIMEOUT_SECS: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Channel capacities
// ─────────────────────────────────────────────────────────────────────────────

/// Raw socket events fanned out to the decode pump.
pub const SOCKET_EVENT_CAPACITY: usize = 256;

/// Decoded node events fanned out to the router and observers.
pub const NODE_EVENT_CAPACITY: usize = 256;

/// Per-guild player inbox. Overflow drops the event rather than blocking the
/// router, so this only needs to absorb short bursts.
pub const PLAYER_INBOX_CAPACITY: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Persistence
// ─────────────────────────────────────────────────────────────────────────────

/// Snapshot file name inside the configured data directory.
pub const SNAPSHOT_FILE_NAME: &str = "mixes.json";
