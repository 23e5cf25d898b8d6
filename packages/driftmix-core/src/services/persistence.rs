//! Snapshot document, atomic storage and the debounced persister.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::mix::song::Song;
use crate::services::registry::PlayerRegistry;
use crate::types::{ChannelId, GuildId};

/// One guild's resumable state, as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_song: Option<Song>,
    /// Upcoming songs only; the current song is stored separately.
    #[serde(default)]
    pub songs: Vec<Song>,
    #[serde(default)]
    pub progress_seconds: f64,
    /// Defaults to false so documents written before pausing was persisted
    /// still parse.
    #[serde(default)]
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_channel_id: Option<ChannelId>,
}

/// The on-disk document: one snapshot per guild, keyed by decimal guild id.
pub type SnapshotDocument = BTreeMap<GuildId, PlayerSnapshot>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Snapshot encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage
// ─────────────────────────────────────────────────────────────────────────────

/// JSON file storage for the snapshot document.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the document. A missing, unreadable or corrupt file means "no
    /// prior state", never an error.
    pub fn load_or_default(&self) -> SnapshotDocument {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return SnapshotDocument::new(),
            Err(e) => {
                log::warn!("[Persistence] Cannot read {}: {}", self.path.display(), e);
                return SnapshotDocument::new();
            }
        };
        match serde_json::from_str(&text) {
            Ok(document) => document,
            Err(e) => {
                log::warn!(
                    "[Persistence] Discarding corrupt snapshot {}: {}",
                    self.path.display(),
                    e
                );
                SnapshotDocument::new()
            }
        }
    }

    /// Writes the document atomically: temp file in the same directory,
    /// then rename over the previous snapshot.
    pub fn save(&self, document: &SnapshotDocument) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Persister & rehydration
// ─────────────────────────────────────────────────────────────────────────────

/// Waits for dirty signals from players, coalesces them over the debounce
/// window, then writes a fresh snapshot of every player.
pub fn spawn_persister(
    store: SnapshotStore,
    registry: Arc<PlayerRegistry>,
    dirty: Arc<Notify>,
    debounce: Duration,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = dirty.notified() => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(debounce) => {}
            }
            let document = registry.snapshot_all();
            if let Err(e) = store.save(&document) {
                log::error!("[Persistence] Snapshot write failed: {}", e);
            }
        }
    });
}

/// Loads the saved document and replays each guild's state into a freshly
/// created player. Runs before the registry is handed to the host.
pub async fn rehydrate(registry: &Arc<PlayerRegistry>, store: &SnapshotStore) {
    let document = store.load_or_default();
    if document.is_empty() {
        return;
    }
    let guilds = document.len();
    for (guild_id, snapshot) in document {
        let player = registry.get_or_create(guild_id);
        player.hydrate(snapshot).await;
    }
    log::info!("[Persistence] Rehydrated {} guild session(s)", guilds);
}
