//! Recording and scripted doubles shared by the mix tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::mix::player::PlayerContext;
use crate::mix::song::{Candidate, CandidateKind, Song};
use crate::notify::Notifier;
use crate::traits::{
    CandidateSource, NodeControl, ResolveError, ResolveResult, SourceResult, TrackResolver,
    VoiceGateway,
};
use crate::types::{ChannelId, GuildId};

// ─────────────────────────────────────────────────────────────────────────────
// Node double
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NodeCommand {
    Play {
        guild_id: GuildId,
        track: String,
        start_time_ms: u64,
        paused: bool,
    },
    Stop(GuildId),
    Pause {
        guild_id: GuildId,
        paused: bool,
    },
    Seek {
        guild_id: GuildId,
        position_ms: u64,
    },
    VoiceUpdate {
        guild_id: GuildId,
        session_id: String,
        token: String,
        endpoint: String,
    },
}

/// Records every control command in arrival order.
#[derive(Default)]
pub(crate) struct RecordingNode {
    commands: Mutex<Vec<NodeCommand>>,
}

impl RecordingNode {
    pub(crate) fn commands(&self) -> Vec<NodeCommand> {
        self.commands.lock().clone()
    }

    pub(crate) fn plays(&self) -> Vec<NodeCommand> {
        self.commands
            .lock()
            .iter()
            .filter(|c| matches!(c, NodeCommand::Play { .. }))
            .cloned()
            .collect()
    }
}

impl NodeControl for RecordingNode {
    fn play(&self, guild_id: GuildId, track: &str, start_time_ms: u64, paused: bool) {
        self.commands.lock().push(NodeCommand::Play {
            guild_id,
            track: track.to_string(),
            start_time_ms,
            paused,
        });
    }

    fn stop(&self, guild_id: GuildId) {
        self.commands.lock().push(NodeCommand::Stop(guild_id));
    }

    fn set_pause(&self, guild_id: GuildId, paused: bool) {
        self.commands
            .lock()
            .push(NodeCommand::Pause { guild_id, paused });
    }

    fn seek(&self, guild_id: GuildId, position_ms: u64) {
        self.commands
            .lock()
            .push(NodeCommand::Seek { guild_id, position_ms });
    }

    fn voice_update(&self, guild_id: GuildId, session_id: &str, token: &str, endpoint: &str) {
        self.commands.lock().push(NodeCommand::VoiceUpdate {
            guild_id,
            session_id: session_id.to_string(),
            token: token.to_string(),
            endpoint: endpoint.to_string(),
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolver doubles
// ─────────────────────────────────────────────────────────────────────────────

enum ResolveOutcome {
    Missing,
    Failure(String),
}

/// Resolves any source id to `ref:{id}` unless a per-id outcome is scripted.
#[derive(Default)]
pub(crate) struct StubResolver {
    outcomes: Mutex<HashMap<String, ResolveOutcome>>,
    calls: AtomicUsize,
}

impl StubResolver {
    pub(crate) fn with_missing(self, source_id: &str) -> Self {
        self.outcomes
            .lock()
            .insert(source_id.to_string(), ResolveOutcome::Missing);
        self
    }

    pub(crate) fn with_failure(self, source_id: &str, message: &str) -> Self {
        self.outcomes.lock().insert(
            source_id.to_string(),
            ResolveOutcome::Failure(message.to_string()),
        );
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrackResolver for StubResolver {
    async fn resolve(&self, source_id: &str) -> ResolveResult<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.outcomes.lock().get(source_id) {
            Some(ResolveOutcome::Missing) => Ok(None),
            Some(ResolveOutcome::Failure(message)) => Err(ResolveError::Load(message.clone())),
            None => Ok(Some(format!("ref:{source_id}"))),
        }
    }
}

/// Parks every resolution until the test releases it, so state can be
/// mutated while a lookup is in flight.
#[derive(Default)]
pub(crate) struct GatedResolver {
    entered: Notify,
    gate: Notify,
    calls: AtomicUsize,
}

impl GatedResolver {
    pub(crate) async fn wait_until_entered(&self) {
        self.entered.notified().await;
    }

    pub(crate) fn release(&self) {
        self.gate.notify_one();
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrackResolver for GatedResolver {
    async fn resolve(&self, source_id: &str) -> ResolveResult<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.gate.notified().await;
        Ok(Some(format!("ref:{source_id}")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway, notifier and candidate source doubles
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct RecordingGateway {
    joins: Mutex<Vec<(GuildId, ChannelId)>>,
}

impl RecordingGateway {
    pub(crate) fn joins(&self) -> Vec<(GuildId, ChannelId)> {
        self.joins.lock().clone()
    }
}

impl VoiceGateway for RecordingGateway {
    fn request_join(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.joins.lock().push((guild_id, channel_id));
    }
}

#[derive(Default)]
pub(crate) struct CountingNotifier {
    messages: Mutex<Vec<(GuildId, String)>>,
}

impl CountingNotifier {
    pub(crate) fn messages(&self) -> Vec<(GuildId, String)> {
        self.messages.lock().clone()
    }
}

impl Notifier for CountingNotifier {
    fn report_failure(&self, guild_id: GuildId, message: &str) {
        self.messages.lock().push((guild_id, message.to_string()));
    }
}

/// Plays back a scripted sequence of related pages, then empty pages.
pub(crate) struct PageSource {
    pages: Mutex<VecDeque<SourceResult<Vec<Candidate>>>>,
    calls: AtomicUsize,
}

impl PageSource {
    pub(crate) fn scripted(pages: Vec<SourceResult<Vec<Candidate>>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandidateSource for PageSource {
    async fn related_page(
        &self,
        _seed_source_id: &str,
        _page_index: u32,
    ) -> SourceResult<Vec<Candidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builders
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn video(source_id: &str, title: &str, duration_seconds: u64) -> Candidate {
    Candidate {
        source_id: source_id.to_string(),
        title: title.to_string(),
        kind: CandidateKind::Video {
            duration_seconds: Some(duration_seconds),
        },
        thumbnail_url: None,
        channel_name: None,
        channel_url: None,
        channel_avatar_url: None,
    }
}

pub(crate) fn unknown_duration(source_id: &str) -> Candidate {
    Candidate {
        kind: CandidateKind::Video {
            duration_seconds: None,
        },
        ..video(source_id, "unknown length", 0)
    }
}

pub(crate) fn live(source_id: &str) -> Candidate {
    Candidate {
        kind: CandidateKind::Live,
        ..video(source_id, "live stream", 0)
    }
}

pub(crate) fn playlist(source_id: &str) -> Candidate {
    Candidate {
        kind: CandidateKind::Playlist,
        ..video(source_id, "playlist", 0)
    }
}

pub(crate) fn song(source_id: &str, title: &str, duration_seconds: u64) -> Song {
    Song {
        title: title.to_string(),
        duration_seconds,
        source_id: source_id.to_string(),
        thumbnail_url: None,
        channel_name: None,
        channel_url: None,
        channel_avatar_url: None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Player wiring
// ─────────────────────────────────────────────────────────────────────────────

/// A full set of recording doubles plus the context that wires them into a
/// player.
pub(crate) struct TestRig {
    pub(crate) node: Arc<RecordingNode>,
    pub(crate) resolver: Arc<StubResolver>,
    pub(crate) gateway: Arc<RecordingGateway>,
    pub(crate) notifier: Arc<CountingNotifier>,
    pub(crate) dirty: Arc<Notify>,
    pub(crate) cancel: CancellationToken,
}

impl TestRig {
    pub(crate) fn new() -> Self {
        Self {
            node: Arc::new(RecordingNode::default()),
            resolver: Arc::new(StubResolver::default()),
            gateway: Arc::new(RecordingGateway::default()),
            notifier: Arc::new(CountingNotifier::default()),
            dirty: Arc::new(Notify::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn with_resolver(resolver: Arc<StubResolver>) -> Self {
        Self {
            resolver,
            ..Self::new()
        }
    }

    pub(crate) fn context(&self) -> PlayerContext {
        self.context_with(
            self.resolver.clone(),
            Arc::new(PageSource::scripted(Vec::new())),
        )
    }

    pub(crate) fn context_with(
        &self,
        resolver: Arc<dyn TrackResolver>,
        source: Arc<dyn CandidateSource>,
    ) -> PlayerContext {
        PlayerContext {
            node: self.node.clone(),
            resolver,
            source,
            gateway: self.gateway.clone(),
            notifier: self.notifier.clone(),
            dirty: self.dirty.clone(),
            cancel: self.cancel.clone(),
            max_song_duration_secs: 900,
        }
    }
}

/// Lets spawned player tasks drain their inboxes before asserting.
pub(crate) async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
