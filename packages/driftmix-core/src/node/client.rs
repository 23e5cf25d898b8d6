//! Typed client for the node control plane.
//!
//! One client (and one socket) per process; every guild multiplexes over it,
//! distinguished by the guild id in each frame.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::node::protocol::{
    IncomingMessage, OutgoingMessage, PlayerEvent, PlayerUpdateState, ServerStats,
    VoiceServerEvent,
};
use crate::node::socket::{ReconnectingSocket, SocketEvent};
use crate::protocol_constants::{CLIENT_NAME, HEADER_CLIENT_NAME, HEADER_USER_ID, NODE_EVENT_CAPACITY};
use crate::state::NodeConfig;
use crate::traits::NodeControl;
use crate::types::GuildId;

/// Decoded node traffic, fanned out to the player router and any observers.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// Control plane (re)connected; per-guild state must be replayed.
    Open,
    /// Fresh node-wide stats (also cached on the client).
    Stats(ServerStats),
    /// Position report for one guild.
    PlayerUpdate {
        guild_id: GuildId,
        state: PlayerUpdateState,
    },
    /// Player lifecycle event for one guild.
    Player(PlayerEvent),
}

pub struct NodeClient {
    socket: ReconnectingSocket,
    config: NodeConfig,
    stats: RwLock<ServerStats>,
    events: broadcast::Sender<NodeEvent>,
}

impl NodeClient {
    pub fn new(config: NodeConfig, reconnect_delay: Duration, cancel: CancellationToken) -> Arc<Self> {
        let socket = ReconnectingSocket::new(reconnect_delay, cancel.clone());
        let (events, _) = broadcast::channel(NODE_EVENT_CAPACITY);
        let client = Arc::new(Self {
            socket,
            config,
            stats: RwLock::new(ServerStats::default()),
            events,
        });
        Arc::clone(&client).spawn_pump(cancel);
        client
    }

    fn spawn_pump(self: Arc<Self>, cancel: CancellationToken) {
        let mut socket_events = self.socket.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    event = socket_events.recv() => match event {
                        Ok(SocketEvent::Open) => {
                            let _ = self.events.send(NodeEvent::Open);
                        }
                        Ok(SocketEvent::Closed) => {
                            log::debug!("[Node] Control plane connection lost");
                        }
                        Ok(SocketEvent::Message(text)) => self.handle_text(&text),
                        Err(RecvError::Lagged(missed)) => {
                            log::warn!("[Node] Decode pump lagged, {missed} socket events dropped");
                        }
                        Err(RecvError::Closed) => return,
                    }
                }
            }
        });
    }

    /// Opens the control-plane connection, identifying as `user_id`.
    pub fn connect(&self, user_id: &str) {
        let headers = handshake_headers(&self.config, user_id);
        self.socket.connect(self.config.socket_url.clone(), headers);
    }

    fn handle_text(&self, text: &str) {
        match serde_json::from_str::<IncomingMessage>(text) {
            Ok(IncomingMessage::Stats(stats)) => {
                *self.stats.write() = stats.clone();
                let _ = self.events.send(NodeEvent::Stats(stats));
            }
            Ok(IncomingMessage::PlayerUpdate { guild_id, state }) => {
                let _ = self.events.send(NodeEvent::PlayerUpdate { guild_id, state });
            }
            Ok(IncomingMessage::Event(event)) => {
                let _ = self.events.send(NodeEvent::Player(event));
            }
            Err(e) => {
                log::warn!("[Node] Dropping undecodable frame: {e}");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    /// The last stats frame, or defaults before the first one arrives.
    pub fn stats(&self) -> ServerStats {
        self.stats.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_connected()
    }

    fn send(&self, message: &OutgoingMessage) {
        match serde_json::to_string(message) {
            Ok(json) => self.socket.send(json),
            Err(e) => log::error!("[Node] Failed to encode outgoing message: {e}"),
        }
    }
}

fn handshake_headers(config: &NodeConfig, user_id: &str) -> Vec<(String, String)> {
    vec![
        ("Authorization".to_string(), config.password.clone()),
        (HEADER_USER_ID.to_string(), user_id.to_string()),
        (HEADER_CLIENT_NAME.to_string(), CLIENT_NAME.to_string()),
    ]
}

impl NodeControl for NodeClient {
    fn play(&self, guild_id: GuildId, track: &str, start_time_ms: u64, paused: bool) {
        self.send(&OutgoingMessage::Play {
            guild_id,
            track: track.to_string(),
            start_time: start_time_ms,
            pause: paused,
        });
    }

    fn stop(&self, guild_id: GuildId) {
        self.send(&OutgoingMessage::Stop { guild_id });
    }

    fn set_pause(&self, guild_id: GuildId, paused: bool) {
        self.send(&OutgoingMessage::Pause {
            guild_id,
            pause: paused,
        });
    }

    fn seek(&self, guild_id: GuildId, position_ms: u64) {
        self.send(&OutgoingMessage::Seek {
            guild_id,
            position: position_ms,
        });
    }

    fn voice_update(&self, guild_id: GuildId, session_id: &str, token: &str, endpoint: &str) {
        self.send(&OutgoingMessage::VoiceUpdate {
            guild_id,
            session_id: session_id.to_string(),
            event: VoiceServerEvent {
                token: token.to_string(),
                endpoint: endpoint.to_string(),
            },
        });
    }
}
