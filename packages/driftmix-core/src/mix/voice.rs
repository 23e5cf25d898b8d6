//! Voice connection handshake state.

use crate::types::ChannelId;

/// The facts required before the node can join voice for a guild: the
/// channel we want, the gateway session id, and the voice server
/// token/endpoint. They arrive independently and in any order; each write
/// overwrites only the fields its event carries.
#[derive(Debug, Clone, Default)]
pub struct VoiceLink {
    channel_id: Option<ChannelId>,
    session_id: Option<String>,
    token: Option<String>,
    endpoint: Option<String>,
}

/// A complete fact set, ready to submit to the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceHandshake {
    pub channel_id: ChannelId,
    pub session_id: String,
    pub token: String,
    pub endpoint: String,
}

impl VoiceLink {
    pub fn set_channel(&mut self, channel_id: ChannelId) {
        self.channel_id = Some(channel_id);
    }

    pub fn set_session(&mut self, session_id: String) {
        self.session_id = Some(session_id);
    }

    /// Records a voice server assignment. A `None` endpoint means the server
    /// went away; the handshake stays incomplete until a new assignment
    /// arrives.
    pub fn set_server(&mut self, token: String, endpoint: Option<String>) {
        self.token = Some(token);
        self.endpoint = endpoint;
    }

    pub fn channel_id(&self) -> Option<ChannelId> {
        self.channel_id
    }

    /// The complete handshake, only once every fact is present.
    pub fn handshake(&self) -> Option<VoiceHandshake> {
        Some(VoiceHandshake {
            channel_id: self.channel_id?,
            session_id: self.session_id.clone()?,
            token: self.token.clone()?,
            endpoint: self.endpoint.clone()?,
        })
    }
}
