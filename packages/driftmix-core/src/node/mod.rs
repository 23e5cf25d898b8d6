//! Audio node client.
//!
//! The node renders audio into voice channels on our behalf; this module
//! owns both planes of its API.
//!
//! # Module Structure
//!
//! - `protocol` - Wire types for the socket and REST planes
//! - `socket` - Reconnecting WebSocket transport
//! - `client` - Decode pump, stats cache and typed command senders
//! - `http` - Track resolution over the node's REST plane

pub mod client;
pub mod http;
pub mod protocol;
pub mod socket;

pub use client::{NodeClient, NodeEvent};
pub use http::{NodeHttpClient, ResolveError, ResolveResult};
pub use protocol::{
    IncomingMessage, OutgoingMessage, PlayerEvent, PlayerUpdateState, ServerStats, TrackEndReason,
};
