//! Core configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    DEFAULT_MAX_SONG_DURATION_SECS, DEFAULT_PERSIST_DEBOUNCE_MS, DEFAULT_RECONNECT_DELAY_SECS,
};

/// Connection details for the audio-rendering node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeConfig {
    /// WebSocket endpoint of the node control plane.
    pub socket_url: String,
    /// HTTP endpoint used for track resolution.
    pub http_url: String,
    /// Shared secret sent as the `Authorization` header on both planes.
    pub password: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            socket_url: "ws://127.0.0.1:2333".to_string(),
            http_url: "http://127.0.0.1:2333".to_string(),
            password: "youshallnotpass".to_string(),
        }
    }
}

/// Behavior knobs for the playback core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoreConfig {
    pub node: NodeConfig,
    /// Fixed delay between node reconnect attempts, in seconds.
    pub reconnect_delay_secs: u64,
    /// Collection filter: candidates longer than this are skipped.
    pub max_song_duration_secs: u64,
    /// Quiet period after a state change before a snapshot write, in
    /// milliseconds.
    pub persist_debounce_ms: u64,
    /// Directory holding the snapshot file. `None` disables persistence.
    pub data_dir: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
            max_song_duration_secs: DEFAULT_MAX_SONG_DURATION_SECS,
            persist_debounce_ms: DEFAULT_PERSIST_DEBOUNCE_MS,
            data_dir: None,
        }
    }
}

impl CoreConfig {
    /// Validates configuration, returning an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.node.socket_url.starts_with("ws://") && !self.node.socket_url.starts_with("wss://")
        {
            return Err(format!(
                "node socket url must start with ws:// or wss://, got '{}'",
                self.node.socket_url
            ));
        }
        if !self.node.http_url.starts_with("http://")
            && !self.node.http_url.starts_with("https://")
        {
            return Err(format!(
                "node http url must start with http:// or https://, got '{}'",
                self.node.http_url
            ));
        }
        if self.node.password.is_empty() {
            return Err("node password must not be empty".to_string());
        }
        if self.reconnect_delay_secs == 0 {
            return Err("reconnect_delay_secs must be at least 1".to_string());
        }
        if self.max_song_duration_secs == 0 {
            return Err("max_song_duration_secs must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }
}
