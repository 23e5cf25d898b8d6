//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use driftmix_core::{CoreConfig, NodeConfig};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// WebSocket endpoint of the audio node's control plane.
    /// Override: `DRIFTMIX_NODE_SOCKET_URL`
    pub node_socket_url: String,

    /// HTTP endpoint of the audio node, used for track resolution.
    /// Override: `DRIFTMIX_NODE_HTTP_URL`
    pub node_http_url: String,

    /// Shared secret sent to the node on both planes.
    /// Override: `DRIFTMIX_NODE_PASSWORD`
    pub node_password: String,

    /// Bot user id the node plays on behalf of.
    /// Override: `DRIFTMIX_USER_ID`
    pub user_id: String,

    /// Fixed delay between node reconnect attempts, in seconds.
    pub reconnect_delay_secs: u64,

    /// Collection filter: candidates longer than this are skipped.
    /// Override: `DRIFTMIX_MAX_SONG_DURATION_SECS`
    pub max_song_duration_secs: u64,

    /// Quiet period after a state change before a snapshot write, in
    /// milliseconds.
    pub persist_debounce_ms: u64,

    /// Directory for persistent data (session snapshots).
    /// Override: `DRIFTMIX_DATA_DIR`
    pub data_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        // Mirror the core defaults so the two crates cannot drift apart
        let core = CoreConfig::default();
        Self {
            node_socket_url: core.node.socket_url,
            node_http_url: core.node.http_url,
            node_password: core.node.password,
            user_id: "0".to_string(),
            reconnect_delay_secs: core.reconnect_delay_secs,
            max_song_duration_secs: core.max_song_duration_secs,
            persist_debounce_ms: core.persist_debounce_ms,
            data_dir: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DRIFTMIX_NODE_HTTP_URL") {
            self.node_http_url = val;
        }

        if let Ok(val) = std::env::var("DRIFTMIX_NODE_PASSWORD") {
            self.node_password = val;
        }

        if let Ok(val) = std::env::var("DRIFTMIX_MAX_SONG_DURATION_SECS") {
            if let Ok(secs) = val.parse() {
                self.max_song_duration_secs = secs;
            }
        }

        // Note: DRIFTMIX_NODE_SOCKET_URL, DRIFTMIX_USER_ID and
        // DRIFTMIX_DATA_DIR are handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to driftmix-core's config type.
    pub fn to_core_config(&self) -> CoreConfig {
        CoreConfig {
            node: NodeConfig {
                socket_url: self.node_socket_url.clone(),
                http_url: self.node_http_url.clone(),
                password: self.node_password.clone(),
            },
            reconnect_delay_secs: self.reconnect_delay_secs,
            max_song_duration_secs: self.max_song_duration_secs,
            persist_debounce_ms: self.persist_debounce_ms,
            data_dir: self.data_dir.clone(),
        }
    }
}
