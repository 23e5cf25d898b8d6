//! Outward failure reporting.

use crate::types::GuildId;

/// Receives user-visible playback notices (unplayable songs being skipped).
/// The chat front-end forwards these to the guild's text channel; the core
/// never waits on delivery.
pub trait Notifier: Send + Sync {
    fn report_failure(&self, guild_id: GuildId, message: &str);
}

/// Discards every notice.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn report_failure(&self, _guild_id: GuildId, _message: &str) {}
}

/// Logs notices instead of delivering them. Used by headless hosts.
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn report_failure(&self, guild_id: GuildId, message: &str) {
        tracing::debug!(%guild_id, message, "Playback failure notice");
    }
}
