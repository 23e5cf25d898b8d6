//! Guild player registry and node-event routing.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::mix::player::{GuildPlayer, PlayerContext, PlayerMessage};
use crate::node::client::NodeEvent;
use crate::services::persistence::SnapshotDocument;
use crate::types::GuildId;

/// Owns every guild's player. Created once by the composition root; lookups
/// create players lazily and entries live for the process lifetime.
pub struct PlayerRegistry {
    players: DashMap<GuildId, Arc<GuildPlayer>>,
    ctx: PlayerContext,
}

impl PlayerRegistry {
    pub fn new(ctx: PlayerContext) -> Self {
        Self {
            players: DashMap::new(),
            ctx,
        }
    }

    /// The player for a guild, created on first access. Concurrent calls for
    /// a new guild still construct exactly one player.
    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<GuildPlayer> {
        self.players
            .entry(guild_id)
            .or_insert_with(|| {
                log::info!("[Registry] Creating player for guild {}", guild_id);
                GuildPlayer::spawn(guild_id, &self.ctx)
            })
            .clone()
    }

    /// The player for a guild, if one exists. Event routing uses this so
    /// stray traffic for unknown guilds does not allocate players.
    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildPlayer>> {
        self.players.get(&guild_id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Gateway dispatch
    // ─────────────────────────────────────────────────────────────────────

    /// Records a voice session fact for a guild. The host filters
    /// voice-state updates down to this bot user before calling.
    pub fn voice_state_update(&self, guild_id: GuildId, session_id: String) {
        if let Some(player) = self.get(guild_id) {
            player.offer(PlayerMessage::VoiceSession { session_id });
        }
    }

    /// Records a voice server assignment fact for a guild.
    pub fn voice_server_update(&self, guild_id: GuildId, token: String, endpoint: Option<String>) {
        if let Some(player) = self.get(guild_id) {
            player.offer(PlayerMessage::VoiceServer { token, endpoint });
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Node event routing
    // ─────────────────────────────────────────────────────────────────────

    /// Spawns the router that fans node events out to players: `Open` goes
    /// to every player, per-guild frames only to players that already exist.
    pub fn start_router(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<NodeEvent>,
        cancel: CancellationToken,
    ) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    event = events.recv() => match event {
                        Ok(event) => registry.route(event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            log::warn!("[Registry] Router lagged, skipped {} node events", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    },
                }
            }
        });
    }

    fn route(&self, event: NodeEvent) {
        match event {
            NodeEvent::Open => {
                for entry in self.players.iter() {
                    entry.value().offer(PlayerMessage::SocketOpen);
                }
            }
            // stats stay cached on the node client; players never see them
            NodeEvent::Stats(_) => {}
            NodeEvent::PlayerUpdate { guild_id, state } => {
                if let Some(player) = self.get(guild_id) {
                    player.offer(PlayerMessage::Progress(state));
                }
            }
            NodeEvent::Player(event) => {
                if let Some(player) = self.get(event.guild_id()) {
                    player.offer(PlayerMessage::Track(event));
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Persistence support
    // ─────────────────────────────────────────────────────────────────────

    /// Resumable state of every player, keyed for the snapshot document.
    pub fn snapshot_all(&self) -> SnapshotDocument {
        self.players
            .iter()
            .map(|entry| (*entry.key(), entry.value().snapshot()))
            .collect()
    }
}
