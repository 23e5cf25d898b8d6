//! Per-guild playback state machine.
//!
//! One `GuildPlayer` per guild, living for the whole process. All state sits
//! behind a sync mutex that is never held across an await; anything that
//! spans an await (track resolution, page fetches) re-checks a generation or
//! epoch counter before applying its result. Inbound events are serialized
//! through a per-guild inbox loop, so handlers never interleave their writes.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::mix::collector::{CollectionCounters, SongCollector};
use crate::mix::queue::SongQueue;
use crate::mix::song::{Candidate, SeedVideo, Song};
use crate::mix::voice::VoiceLink;
use crate::node::protocol::{PlayerEvent, PlayerUpdateState, TrackEndReason};
use crate::notify::Notifier;
use crate::protocol_constants::PLAYER_INBOX_CAPACITY;
use crate::services::persistence::PlayerSnapshot;
use crate::traits::{CandidateSource, NodeControl, TrackResolver, VoiceGateway};
use crate::types::{ChannelId, GuildId};

/// Collaborators shared by every player. The registry clones this into each
/// player it creates.
#[derive(Clone)]
pub struct PlayerContext {
    pub node: Arc<dyn NodeControl>,
    pub resolver: Arc<dyn TrackResolver>,
    pub source: Arc<dyn CandidateSource>,
    pub gateway: Arc<dyn VoiceGateway>,
    pub notifier: Arc<dyn Notifier>,
    /// Signalled after state-changing operations; the persister listens.
    pub dirty: Arc<Notify>,
    pub cancel: CancellationToken,
    pub max_song_duration_secs: u64,
}

/// Events routed into a player's inbox by the registry.
#[derive(Debug)]
pub(crate) enum PlayerMessage {
    /// The node socket (re)opened.
    SocketOpen,
    Progress(PlayerUpdateState),
    Track(PlayerEvent),
    VoiceSession {
        session_id: String,
    },
    VoiceServer {
        token: String,
        endpoint: Option<String>,
    },
}

impl PlayerMessage {
    fn label(&self) -> &'static str {
        match self {
            Self::SocketOpen => "socket-open",
            Self::Progress(_) => "progress",
            Self::Track(_) => "track-event",
            Self::VoiceSession { .. } => "voice-session",
            Self::VoiceServer { .. } => "voice-server",
        }
    }
}

struct PlayerState {
    queue: SongQueue,
    voice: VoiceLink,
    paused: bool,
    /// Last node-reported position, reset to zero on every queue movement.
    progress_seconds: f64,
    connected: bool,
    collecting: bool,
    /// Bumped whenever the queue is replaced wholesale; in-flight collection
    /// traversals abandon themselves when it no longer matches.
    queue_epoch: u64,
    /// Bumped on every queue movement; in-flight track resolutions discard
    /// their result when it no longer matches.
    generation: u64,
}

impl PlayerState {
    fn new() -> Self {
        Self {
            queue: SongQueue::new(),
            voice: VoiceLink::default(),
            paused: false,
            progress_seconds: 0.0,
            connected: false,
            collecting: false,
            queue_epoch: 0,
            generation: 0,
        }
    }

    /// Moves the queue pointer and invalidates any in-flight resolution.
    fn advance(&mut self, count: i64) {
        self.queue.advance(count);
        self.progress_seconds = 0.0;
        self.generation = self.generation.wrapping_add(1);
    }
}

/// The per-guild aggregate: queue, voice handshake facts, playback flags and
/// the collector, all driving the shared node client.
pub struct GuildPlayer {
    guild_id: GuildId,
    state: Mutex<PlayerState>,
    collector: SongCollector,
    node: Arc<dyn NodeControl>,
    resolver: Arc<dyn TrackResolver>,
    gateway: Arc<dyn VoiceGateway>,
    notifier: Arc<dyn Notifier>,
    dirty: Arc<Notify>,
    inbox: mpsc::Sender<PlayerMessage>,
}

impl GuildPlayer {
    pub(crate) fn spawn(guild_id: GuildId, ctx: &PlayerContext) -> Arc<Self> {
        let (inbox_tx, inbox_rx) = mpsc::channel(PLAYER_INBOX_CAPACITY);
        let player = Arc::new(Self {
            guild_id,
            state: Mutex::new(PlayerState::new()),
            collector: SongCollector::new(ctx.source.clone(), ctx.max_song_duration_secs),
            node: ctx.node.clone(),
            resolver: ctx.resolver.clone(),
            gateway: ctx.gateway.clone(),
            notifier: ctx.notifier.clone(),
            dirty: ctx.dirty.clone(),
            inbox: inbox_tx,
        });
        player
            .clone()
            .spawn_inbox_loop(inbox_rx, ctx.cancel.child_token());
        player
    }

    fn spawn_inbox_loop(
        self: Arc<Self>,
        mut inbox: mpsc::Receiver<PlayerMessage>,
        cancel: CancellationToken,
    ) {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    message = inbox.recv() => match message {
                        Some(message) => self.handle_message(message).await,
                        None => return,
                    },
                }
            }
        });
    }

    /// Queues an event for this player's loop. Overflow drops the message;
    /// progress reports are periodic, so the loss is benign.
    pub(crate) fn offer(&self, message: PlayerMessage) {
        if let Err(mpsc::error::TrySendError::Full(message)) = self.inbox.try_send(message) {
            log::warn!(
                "[Player {}] Inbox full, dropping {} event",
                self.guild_id,
                message.label()
            );
        }
    }

    async fn handle_message(&self, message: PlayerMessage) {
        match message {
            PlayerMessage::SocketOpen => self.handle_socket_open().await,
            PlayerMessage::Progress(update) => self.handle_progress(update),
            PlayerMessage::Track(event) => self.handle_track_event(event).await,
            PlayerMessage::VoiceSession { session_id } => {
                self.state.lock().voice.set_session(session_id);
                self.send_voice_update();
            }
            PlayerMessage::VoiceServer { token, endpoint } => {
                self.state.lock().voice.set_server(token, endpoint);
                self.send_voice_update();
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Playback operations
    // ─────────────────────────────────────────────────────────────────────

    /// Resolves the current song and starts it at the last known position.
    ///
    /// Resolution happens outside the state lock; if the queue moved in the
    /// meantime the result is discarded. An unresolvable song is reported
    /// once, skipped, and the next song gets the same treatment, so a run of
    /// dead links never stalls the queue.
    pub async fn play(&self) {
        loop {
            let (generation, song) = {
                let state = self.state.lock();
                match state.queue.current() {
                    Some(song) => (state.generation, song.clone()),
                    None => return,
                }
            };

            let resolved = self.resolver.resolve(&song.source_id).await;

            let mut state = self.state.lock();
            if state.generation != generation {
                log::debug!(
                    "[Player {}] Discarding stale resolution of {}",
                    self.guild_id,
                    song.source_id
                );
                return;
            }

            let failure = match resolved {
                Ok(Some(track)) => {
                    let start_ms = (state.progress_seconds * 1000.0).round() as u64;
                    let paused = state.paused;
                    drop(state);
                    log::info!(
                        "[Player {}] Playing '{}' from {} ms",
                        self.guild_id,
                        song.title,
                        start_ms
                    );
                    self.node.play(self.guild_id, &track, start_ms, paused);
                    return;
                }
                Ok(None) => "no playable track found".to_string(),
                Err(e) => e.to_string(),
            };

            state.advance(1);
            drop(state);
            log::warn!(
                "[Player {}] Skipping '{}': {}",
                self.guild_id,
                song.title,
                failure
            );
            self.notifier.report_failure(
                self.guild_id,
                &format!("Failed to load **{}**, skipping.", song.title),
            );
            self.dirty.notify_one();
        }
    }

    /// Starts the current song from an explicit position and pause state.
    pub async fn play_at(&self, start_seconds: f64, paused: bool) {
        {
            let mut state = self.state.lock();
            state.progress_seconds = start_seconds.max(0.0);
            state.paused = paused;
        }
        self.play().await;
    }

    /// Moves the queue pointer by `count` (negative rewinds, clamped at the
    /// start) and plays whatever is current afterwards.
    pub async fn play_next(&self, count: i64) {
        self.state.lock().advance(count);
        self.dirty.notify_one();
        self.play().await;
    }

    pub fn pause(&self) {
        self.state.lock().paused = true;
        self.node.set_pause(self.guild_id, true);
        self.dirty.notify_one();
    }

    pub fn resume(&self) {
        self.state.lock().paused = false;
        self.node.set_pause(self.guild_id, false);
        self.dirty.notify_one();
    }

    /// Range validation against the song's duration happens in the command
    /// surface before this is reached.
    pub fn seek(&self, seconds: f64) {
        let position_ms = (seconds.max(0.0) * 1000.0).round() as u64;
        self.node.seek(self.guild_id, position_ms);
    }

    /// Stops playback and drops the whole queue. In-flight resolutions and
    /// collection traversals are invalidated; the bound voice channel stays.
    pub fn clear(&self) {
        {
            let mut state = self.state.lock();
            state.queue.reset();
            state.progress_seconds = 0.0;
            state.generation = state.generation.wrapping_add(1);
            state.queue_epoch = state.queue_epoch.wrapping_add(1);
            state.collecting = false;
        }
        self.node.stop(self.guild_id);
        self.dirty.notify_one();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Voice handshake
    // ─────────────────────────────────────────────────────────────────────

    /// Binds the channel and asks the gateway to join it. Completion is only
    /// observed through the session/server facts arriving later.
    pub fn join_voice_channel(&self, channel_id: ChannelId) {
        self.state.lock().voice.set_channel(channel_id);
        self.gateway.request_join(self.guild_id, channel_id);
        self.send_voice_update();
        self.dirty.notify_one();
    }

    /// Submits the voice update once all four handshake facts are known.
    /// Called after every fact write; incomplete state is a no-op, repeated
    /// identical facts resend the same content.
    pub fn send_voice_update(&self) {
        let handshake = self.state.lock().voice.handshake();
        if let Some(h) = handshake {
            log::debug!(
                "[Player {}] Voice handshake complete, updating node",
                self.guild_id
            );
            self.node
                .voice_update(self.guild_id, &h.session_id, &h.token, &h.endpoint);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Node event reactions
    // ─────────────────────────────────────────────────────────────────────

    async fn handle_socket_open(&self) {
        let channel = self.state.lock().voice.channel_id();
        if let Some(channel_id) = channel {
            log::info!(
                "[Player {}] Node session reopened, resuming in channel {}",
                self.guild_id,
                channel_id
            );
            self.join_voice_channel(channel_id);
            self.play().await;
        }
    }

    fn handle_progress(&self, update: PlayerUpdateState) {
        {
            let mut state = self.state.lock();
            state.progress_seconds = update.position.unwrap_or(0) as f64 / 1000.0;
            state.connected = update.connected;
        }
        self.dirty.notify_one();
    }

    async fn handle_track_event(&self, event: PlayerEvent) {
        match event {
            PlayerEvent::TrackEnd { reason, .. } => match reason {
                TrackEndReason::Finished => {
                    log::debug!("[Player {}] Track finished, advancing", self.guild_id);
                    self.play_next(1).await;
                }
                other => {
                    log::debug!(
                        "[Player {}] Track ended ({:?}), no action",
                        self.guild_id,
                        other
                    );
                }
            },
            PlayerEvent::TrackException { error, .. } => {
                log::warn!(
                    "[Player {}] Track errored ({}), retrying in place",
                    self.guild_id,
                    error
                );
                self.play().await;
            }
            PlayerEvent::TrackStuck { threshold_ms, .. } => {
                log::warn!(
                    "[Player {}] Track stuck past {} ms, retrying in place",
                    self.guild_id,
                    threshold_ms
                );
                self.play().await;
            }
            PlayerEvent::WebSocketClosed {
                code, by_remote, ..
            } => {
                log::debug!(
                    "[Player {}] Voice socket closed (code {}, by remote: {})",
                    self.guild_id,
                    code,
                    by_remote
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mix collection
    // ─────────────────────────────────────────────────────────────────────

    /// Begins a new mix from a seed video: screens the seed and its attached
    /// related items, starts playback, then keeps appending related pages in
    /// the background until one comes back empty.
    ///
    /// Returns false, leaving the queue untouched, when a collection is
    /// already running for this guild.
    pub async fn start_mix(self: &Arc<Self>, seed: SeedVideo) -> bool {
        let seed_id = seed.video.source_id.clone();
        let first_ring: Vec<Candidate> =
            std::iter::once(seed.video).chain(seed.related).collect();

        let epoch = {
            let mut state = self.state.lock();
            if state.collecting {
                log::warn!(
                    "[Player {}] Already collecting a mix, ignoring seed {}",
                    self.guild_id,
                    seed_id
                );
                return false;
            }
            state.collecting = true;
            state.queue_epoch = state.queue_epoch.wrapping_add(1);
            state.queue.reset();
            state.progress_seconds = 0.0;
            state.generation = state.generation.wrapping_add(1);
            self.collector.counters().reset();
            for candidate in first_ring {
                if let Some(song) = self.collector.screen(candidate) {
                    state.queue.push(song);
                }
            }
            state.queue_epoch
        };

        log::info!("[Player {}] Mix started from seed {}", self.guild_id, seed_id);
        self.dirty.notify_one();
        self.play().await;

        let player = Arc::clone(self);
        tokio::spawn(async move { player.collect_pages(seed_id, epoch).await });
        true
    }

    async fn collect_pages(&self, seed_id: String, epoch: u64) {
        let mut page_index = 0u32;
        loop {
            let page = self.collector.fetch_page(&seed_id, page_index).await;
            if page.is_empty() {
                break;
            }
            {
                let mut state = self.state.lock();
                if state.queue_epoch != epoch {
                    log::debug!(
                        "[Player {}] Queue changed mid-collection, abandoning traversal",
                        self.guild_id
                    );
                    return;
                }
                for candidate in page {
                    if let Some(song) = self.collector.screen(candidate) {
                        state.queue.push(song);
                    }
                }
            }
            self.dirty.notify_one();
            page_index += 1;
        }

        let totals = self.collector.counters().snapshot();
        let mut state = self.state.lock();
        if state.queue_epoch == epoch {
            state.collecting = false;
            log::info!(
                "[Player {}] Mix collection finished: {} accepted, skipped {} live / {} playlists / {} overlong",
                self.guild_id,
                totals.accepted,
                totals.ignored_live,
                totals.ignored_playlists,
                totals.ignored_overlong
            );
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────

    /// Resumable state for the snapshot document.
    pub(crate) fn snapshot(&self) -> PlayerSnapshot {
        let state = self.state.lock();
        PlayerSnapshot {
            current_song: state.queue.current().cloned(),
            songs: state.queue.upcoming().to_vec(),
            progress_seconds: state.progress_seconds,
            paused: state.paused,
            voice_channel_id: state.voice.channel_id(),
        }
    }

    /// Restores a saved session into this fresh player and resumes it:
    /// songs re-queued from the top, playback restarted at the saved
    /// position, voice channel rejoined if one was bound.
    pub(crate) async fn hydrate(&self, snapshot: PlayerSnapshot) {
        {
            let mut state = self.state.lock();
            let mut songs: Vec<Song> = snapshot.current_song.into_iter().collect();
            songs.extend(snapshot.songs);
            state.queue.set_all(songs);
            state.queue.set_position(0);
            state.progress_seconds = snapshot.progress_seconds.max(0.0);
            state.paused = snapshot.paused;
            state.generation = state.generation.wrapping_add(1);
        }
        if let Some(channel_id) = snapshot.voice_channel_id {
            self.join_voice_channel(channel_id);
        }
        self.play().await;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Read surface
    // ─────────────────────────────────────────────────────────────────────

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn current_song(&self) -> Option<Song> {
        self.state.lock().queue.current().cloned()
    }

    pub fn upcoming_songs(&self) -> Vec<Song> {
        self.state.lock().queue.upcoming().to_vec()
    }

    pub fn progress_seconds(&self) -> f64 {
        self.state.lock().progress_seconds
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Whether the node reports its voice connection for this guild as up.
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn is_collecting(&self) -> bool {
        self.state.lock().collecting
    }

    pub fn voice_channel_id(&self) -> Option<ChannelId> {
        self.state.lock().voice.channel_id()
    }

    /// Live counters for the most recent collection run.
    pub fn collection_counters(&self) -> Arc<CollectionCounters> {
        self.collector.counters()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::mix::test_support::{
        live, settle, song, video, GatedResolver, NodeCommand, PageSource, StubResolver, TestRig,
    };
    use crate::traits::SourceResult;

    fn push_songs(player: &GuildPlayer, songs: &[Song]) {
        let mut state = player.state.lock();
        for s in songs {
            state.queue.push(s.clone());
        }
    }

    #[tokio::test]
    async fn play_with_an_empty_queue_is_a_no_op() {
        let rig = TestRig::new();
        let player = GuildPlayer::spawn(GuildId(1), &rig.context());

        player.play().await;

        assert!(rig.node.commands().is_empty());
        assert_eq!(rig.resolver.calls(), 0);
    }

    #[tokio::test]
    async fn play_resolves_and_starts_from_the_last_known_position() {
        let rig = TestRig::new();
        let player = GuildPlayer::spawn(GuildId(1), &rig.context());
        push_songs(&player, &[song("a", "Song A", 300)]);
        {
            let mut state = player.state.lock();
            state.progress_seconds = 42.0;
            state.paused = true;
        }

        player.play().await;

        assert_eq!(
            rig.node.commands(),
            vec![NodeCommand::Play {
                guild_id: GuildId(1),
                track: "ref:a".to_string(),
                start_time_ms: 42000,
                paused: true,
            }]
        );
    }

    #[tokio::test]
    async fn a_failed_resolution_reports_once_skips_once_and_plays_the_next_song() {
        let resolver = Arc::new(StubResolver::default().with_failure("dead", "boom"));
        let rig = TestRig::with_resolver(resolver);
        let player = GuildPlayer::spawn(GuildId(1), &rig.context());
        push_songs(
            &player,
            &[song("dead", "Dead Link", 100), song("ok", "Good Song", 100)],
        );

        player.play().await;

        let notices = rig.notifier.messages();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].1.contains("Dead Link"));
        let plays = rig.node.plays();
        assert_eq!(plays.len(), 1);
        assert!(matches!(&plays[0], NodeCommand::Play { track, .. } if track == "ref:ok"));
        assert_eq!(player.state.lock().queue.position(), 1);
    }

    #[tokio::test]
    async fn a_queue_of_dead_links_cascades_without_stalling() {
        let resolver = Arc::new(
            StubResolver::default()
                .with_missing("d1")
                .with_failure("d2", "gone")
                .with_missing("d3"),
        );
        let rig = TestRig::with_resolver(resolver);
        let player = GuildPlayer::spawn(GuildId(1), &rig.context());
        push_songs(
            &player,
            &[
                song("d1", "Dead 1", 100),
                song("d2", "Dead 2", 100),
                song("d3", "Dead 3", 100),
                song("ok", "Good Song", 100),
            ],
        );

        player.play().await;

        assert_eq!(rig.notifier.messages().len(), 3);
        let plays = rig.node.plays();
        assert_eq!(plays.len(), 1);
        assert!(matches!(&plays[0], NodeCommand::Play { track, .. } if track == "ref:ok"));
        assert_eq!(player.state.lock().queue.position(), 3);
    }

    #[tokio::test]
    async fn a_resolution_that_loses_a_race_is_discarded() {
        let rig = TestRig::new();
        let resolver = Arc::new(GatedResolver::default());
        let ctx = rig.context_with(
            resolver.clone(),
            Arc::new(PageSource::scripted(Vec::new())),
        );
        let player = GuildPlayer::spawn(GuildId(1), &ctx);
        push_songs(&player, &[song("a", "A", 100), song("b", "B", 100)]);

        let racing = player.clone();
        let in_flight = tokio::spawn(async move { racing.play().await });
        resolver.wait_until_entered().await;

        player.clear();
        resolver.release();
        in_flight.await.unwrap();

        assert!(rig.node.plays().is_empty());
        assert_eq!(rig.node.commands(), vec![NodeCommand::Stop(GuildId(1))]);
        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn play_at_overrides_position_and_pause() {
        let rig = TestRig::new();
        let player = GuildPlayer::spawn(GuildId(1), &rig.context());
        push_songs(&player, &[song("a", "A", 300)]);

        player.play_at(63.5, true).await;

        assert_eq!(
            rig.node.plays(),
            vec![NodeCommand::Play {
                guild_id: GuildId(1),
                track: "ref:a".to_string(),
                start_time_ms: 63500,
                paused: true,
            }]
        );
    }

    #[tokio::test]
    async fn play_next_moves_the_pointer_and_restarts_from_zero() {
        let rig = TestRig::new();
        let player = GuildPlayer::spawn(GuildId(1), &rig.context());
        push_songs(&player, &[song("a", "A", 100), song("b", "B", 100)]);
        player.state.lock().progress_seconds = 55.0;

        player.play_next(1).await;
        // rewinding far past the start clamps to the first song
        player.play_next(-5).await;

        assert_eq!(
            rig.node.plays(),
            vec![
                NodeCommand::Play {
                    guild_id: GuildId(1),
                    track: "ref:b".to_string(),
                    start_time_ms: 0,
                    paused: false,
                },
                NodeCommand::Play {
                    guild_id: GuildId(1),
                    track: "ref:a".to_string(),
                    start_time_ms: 0,
                    paused: false,
                },
            ]
        );
    }

    #[tokio::test]
    async fn pause_and_resume_flip_the_flag_and_forward_the_command() {
        let rig = TestRig::new();
        let player = GuildPlayer::spawn(GuildId(1), &rig.context());

        player.pause();
        assert!(player.is_paused());
        player.resume();
        assert!(!player.is_paused());

        assert_eq!(
            rig.node.commands(),
            vec![
                NodeCommand::Pause {
                    guild_id: GuildId(1),
                    paused: true,
                },
                NodeCommand::Pause {
                    guild_id: GuildId(1),
                    paused: false,
                },
            ]
        );
    }

    #[tokio::test]
    async fn seek_converts_seconds_to_milliseconds() {
        let rig = TestRig::new();
        let player = GuildPlayer::spawn(GuildId(1), &rig.context());

        player.seek(63.5);

        assert_eq!(
            rig.node.commands(),
            vec![NodeCommand::Seek {
                guild_id: GuildId(1),
                position_ms: 63500,
            }]
        );
    }

    #[tokio::test]
    async fn clear_stops_the_node_and_keeps_the_voice_channel() {
        let rig = TestRig::new();
        let player = GuildPlayer::spawn(GuildId(1), &rig.context());
        push_songs(&player, &[song("a", "A", 100), song("b", "B", 100)]);
        player.join_voice_channel(ChannelId(7));

        player.clear();

        assert_eq!(player.current_song(), None);
        assert!(player.upcoming_songs().is_empty());
        assert_eq!(player.voice_channel_id(), Some(ChannelId(7)));
        assert_eq!(rig.node.commands(), vec![NodeCommand::Stop(GuildId(1))]);
    }

    #[tokio::test]
    async fn voice_update_waits_for_all_four_handshake_facts() {
        let rig = TestRig::new();
        let player = GuildPlayer::spawn(GuildId(1), &rig.context());

        player.join_voice_channel(ChannelId(7));
        player.offer(PlayerMessage::VoiceSession {
            session_id: "sess-1".to_string(),
        });
        settle().await;
        assert!(rig
            .node
            .commands()
            .iter()
            .all(|c| !matches!(c, NodeCommand::VoiceUpdate { .. })));

        player.offer(PlayerMessage::VoiceServer {
            token: "tok".to_string(),
            endpoint: Some("voice.example:443".to_string()),
        });
        settle().await;

        let updates: Vec<NodeCommand> = rig
            .node
            .commands()
            .into_iter()
            .filter(|c| matches!(c, NodeCommand::VoiceUpdate { .. }))
            .collect();
        assert_eq!(
            updates,
            vec![NodeCommand::VoiceUpdate {
                guild_id: GuildId(1),
                session_id: "sess-1".to_string(),
                token: "tok".to_string(),
                endpoint: "voice.example:443".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn repeated_identical_facts_resend_the_same_voice_update() {
        let rig = TestRig::new();
        let player = GuildPlayer::spawn(GuildId(1), &rig.context());
        player.join_voice_channel(ChannelId(7));
        player.offer(PlayerMessage::VoiceSession {
            session_id: "sess-1".to_string(),
        });
        player.offer(PlayerMessage::VoiceServer {
            token: "tok".to_string(),
            endpoint: Some("voice.example:443".to_string()),
        });
        settle().await;

        player.offer(PlayerMessage::VoiceSession {
            session_id: "sess-1".to_string(),
        });
        settle().await;

        let updates: Vec<NodeCommand> = rig
            .node
            .commands()
            .into_iter()
            .filter(|c| matches!(c, NodeCommand::VoiceUpdate { .. }))
            .collect();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0], updates[1]);
    }

    #[tokio::test]
    async fn progress_updates_record_position_and_connectedness() {
        let rig = TestRig::new();
        let player = GuildPlayer::spawn(GuildId(1), &rig.context());

        player.offer(PlayerMessage::Progress(PlayerUpdateState {
            time: 1_700_000_000_000,
            position: Some(63500),
            connected: true,
        }));
        settle().await;
        assert_eq!(player.progress_seconds(), 63.5);
        assert!(player.is_connected());

        // right after a stop the node omits the position
        player.offer(PlayerMessage::Progress(PlayerUpdateState {
            time: 1_700_000_000_000,
            position: None,
            connected: false,
        }));
        settle().await;
        assert_eq!(player.progress_seconds(), 0.0);
        assert!(!player.is_connected());
    }

    #[tokio::test]
    async fn a_finished_track_advances_to_the_next_song() {
        let rig = TestRig::new();
        let player = GuildPlayer::spawn(GuildId(1), &rig.context());
        push_songs(&player, &[song("a", "A", 100), song("b", "B", 100)]);

        player.offer(PlayerMessage::Track(PlayerEvent::TrackEnd {
            guild_id: GuildId(1),
            track: "ref:a".to_string(),
            reason: TrackEndReason::Finished,
        }));
        settle().await;

        let plays = rig.node.plays();
        assert_eq!(plays.len(), 1);
        assert!(matches!(&plays[0], NodeCommand::Play { track, .. } if track == "ref:b"));
    }

    #[tokio::test]
    async fn stopped_and_replaced_track_ends_do_not_advance() {
        let rig = TestRig::new();
        let player = GuildPlayer::spawn(GuildId(1), &rig.context());
        push_songs(&player, &[song("a", "A", 100)]);

        for reason in [TrackEndReason::Stopped, TrackEndReason::Replaced] {
            player.offer(PlayerMessage::Track(PlayerEvent::TrackEnd {
                guild_id: GuildId(1),
                track: "ref:a".to_string(),
                reason,
            }));
        }
        settle().await;

        assert!(rig.node.commands().is_empty());
        assert_eq!(player.state.lock().queue.position(), 0);
    }

    #[tokio::test]
    async fn stuck_and_errored_tracks_retry_in_place() {
        let rig = TestRig::new();
        let player = GuildPlayer::spawn(GuildId(1), &rig.context());
        push_songs(&player, &[song("a", "A", 300)]);
        player.state.lock().progress_seconds = 42.0;

        player.offer(PlayerMessage::Track(PlayerEvent::TrackStuck {
            guild_id: GuildId(1),
            track: "ref:a".to_string(),
            threshold_ms: 10000,
        }));
        settle().await;

        player.state.lock().progress_seconds = 50.0;
        player.offer(PlayerMessage::Track(PlayerEvent::TrackException {
            guild_id: GuildId(1),
            track: "ref:a".to_string(),
            error: "decoder blew up".to_string(),
        }));
        settle().await;

        assert_eq!(
            rig.node.plays(),
            vec![
                NodeCommand::Play {
                    guild_id: GuildId(1),
                    track: "ref:a".to_string(),
                    start_time_ms: 42000,
                    paused: false,
                },
                NodeCommand::Play {
                    guild_id: GuildId(1),
                    track: "ref:a".to_string(),
                    start_time_ms: 50000,
                    paused: false,
                },
            ]
        );
        assert_eq!(player.state.lock().queue.position(), 0);
    }

    #[tokio::test]
    async fn reconnect_resumes_the_session_where_it_left_off() {
        let rig = TestRig::new();
        let player = GuildPlayer::spawn(GuildId(1), &rig.context());
        push_songs(&player, &[song("a", "A", 300)]);
        player.join_voice_channel(ChannelId(7));
        {
            let mut state = player.state.lock();
            state.progress_seconds = 42.0;
            state.paused = true;
        }

        player.offer(PlayerMessage::SocketOpen);
        settle().await;

        assert_eq!(
            rig.node.plays(),
            vec![NodeCommand::Play {
                guild_id: GuildId(1),
                track: "ref:a".to_string(),
                start_time_ms: 42000,
                paused: true,
            }]
        );
        assert_eq!(
            rig.gateway.joins(),
            vec![(GuildId(1), ChannelId(7)), (GuildId(1), ChannelId(7))]
        );

        // handshake facts re-arrive and the voice update goes out again
        player.offer(PlayerMessage::VoiceSession {
            session_id: "sess-2".to_string(),
        });
        player.offer(PlayerMessage::VoiceServer {
            token: "tok-2".to_string(),
            endpoint: Some("voice.example:443".to_string()),
        });
        settle().await;
        assert!(rig.node.commands().iter().any(
            |c| matches!(c, NodeCommand::VoiceUpdate { session_id, .. } if session_id == "sess-2")
        ));
    }

    #[tokio::test]
    async fn reconnect_without_a_bound_channel_does_nothing() {
        let rig = TestRig::new();
        let player = GuildPlayer::spawn(GuildId(1), &rig.context());
        push_songs(&player, &[song("a", "A", 300)]);

        player.offer(PlayerMessage::SocketOpen);
        settle().await;

        assert!(rig.node.commands().is_empty());
        assert!(rig.gateway.joins().is_empty());
    }

    #[tokio::test]
    async fn start_mix_screens_the_first_ring_and_plays_the_seed() {
        let rig = TestRig::new();
        let player = GuildPlayer::spawn(GuildId(1), &rig.context());

        let started = player
            .start_mix(SeedVideo {
                video: video("a", "A", 300),
                related: vec![video("b", "B", 920), video("c", "C", 200)],
            })
            .await;
        settle().await;

        assert!(started);
        assert_eq!(player.current_song().unwrap().source_id, "a");
        let upcoming: Vec<String> = player
            .upcoming_songs()
            .into_iter()
            .map(|s| s.source_id)
            .collect();
        assert_eq!(upcoming, vec!["c"]);
        let totals = player.collection_counters().snapshot();
        assert_eq!(totals.accepted, 2);
        assert_eq!(totals.ignored_overlong, 1);
        assert!(!player.is_collecting());
        assert_eq!(rig.node.plays().len(), 1);
    }

    #[tokio::test]
    async fn collection_appends_pages_until_one_comes_back_empty() {
        let rig = TestRig::new();
        let source = Arc::new(PageSource::scripted(vec![
            Ok(vec![video("d", "D", 100), live("l1")]),
            Ok(vec![video("e", "E", 100)]),
            Ok(Vec::new()),
        ]));
        let ctx = rig.context_with(rig.resolver.clone(), source.clone());
        let player = GuildPlayer::spawn(GuildId(1), &ctx);

        player
            .start_mix(SeedVideo {
                video: video("a", "A", 100),
                related: Vec::new(),
            })
            .await;
        settle().await;

        assert!(!player.is_collecting());
        let upcoming: Vec<String> = player
            .upcoming_songs()
            .into_iter()
            .map(|s| s.source_id)
            .collect();
        assert_eq!(upcoming, vec!["d", "e"]);
        let totals = player.collection_counters().snapshot();
        assert_eq!(totals.accepted, 3);
        assert_eq!(totals.ignored_live, 1);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn starting_a_mix_while_one_is_collecting_is_a_no_op() {
        let rig = TestRig::new();
        let player = GuildPlayer::spawn(GuildId(1), &rig.context());
        push_songs(&player, &[song("a", "A", 100)]);
        player.state.lock().collecting = true;

        let started = player
            .start_mix(SeedVideo {
                video: video("x", "X", 100),
                related: Vec::new(),
            })
            .await;

        assert!(!started);
        assert_eq!(player.current_song().unwrap().source_id, "a");
        assert!(rig.node.plays().is_empty());
    }

    struct GatedSource {
        entered: Notify,
        gate: Notify,
        pages: Mutex<VecDeque<Vec<Candidate>>>,
    }

    impl GatedSource {
        fn with_pages(pages: Vec<Vec<Candidate>>) -> Self {
            Self {
                entered: Notify::new(),
                gate: Notify::new(),
                pages: Mutex::new(pages.into()),
            }
        }
    }

    #[async_trait::async_trait]
    impl CandidateSource for GatedSource {
        async fn related_page(
            &self,
            _seed_source_id: &str,
            _page_index: u32,
        ) -> SourceResult<Vec<Candidate>> {
            self.entered.notify_one();
            self.gate.notified().await;
            Ok(self.pages.lock().pop_front().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn clearing_mid_collection_abandons_the_traversal() {
        let rig = TestRig::new();
        let source = Arc::new(GatedSource::with_pages(vec![vec![video("d", "D", 100)]]));
        let ctx = rig.context_with(rig.resolver.clone(), source.clone());
        let player = GuildPlayer::spawn(GuildId(1), &ctx);

        assert!(
            player
                .start_mix(SeedVideo {
                    video: video("a", "A", 100),
                    related: Vec::new(),
                })
                .await
        );
        source.entered.notified().await;

        player.clear();
        source.gate.notify_one();
        settle().await;

        assert_eq!(player.current_song(), None);
        assert!(player.upcoming_songs().is_empty());
        assert!(!player.is_collecting());

        // the guard is released, so a fresh mix can start
        assert!(
            player
                .start_mix(SeedVideo {
                    video: video("z", "Z", 100),
                    related: Vec::new(),
                })
                .await
        );
        assert_eq!(player.current_song().unwrap().source_id, "z");
    }

    #[tokio::test]
    async fn hydrating_restores_the_saved_session_and_resumes() {
        let rig = TestRig::new();
        let player = GuildPlayer::spawn(GuildId(1), &rig.context());

        player
            .hydrate(PlayerSnapshot {
                current_song: Some(song("a", "A", 300)),
                songs: vec![song("b", "B", 200)],
                progress_seconds: 42.0,
                paused: true,
                voice_channel_id: Some(ChannelId(7)),
            })
            .await;

        assert_eq!(player.current_song().unwrap().source_id, "a");
        assert_eq!(player.upcoming_songs().len(), 1);
        assert_eq!(player.progress_seconds(), 42.0);
        assert!(player.is_paused());
        assert_eq!(player.voice_channel_id(), Some(ChannelId(7)));
        assert_eq!(rig.gateway.joins(), vec![(GuildId(1), ChannelId(7))]);
        assert_eq!(
            rig.node.plays(),
            vec![NodeCommand::Play {
                guild_id: GuildId(1),
                track: "ref:a".to_string(),
                start_time_ms: 42000,
                paused: true,
            }]
        );
    }

    #[tokio::test]
    async fn snapshot_captures_resumable_state() {
        let rig = TestRig::new();
        let player = GuildPlayer::spawn(GuildId(1), &rig.context());
        push_songs(&player, &[song("a", "A", 300), song("b", "B", 200)]);
        player.join_voice_channel(ChannelId(7));
        {
            let mut state = player.state.lock();
            state.progress_seconds = 10.5;
            state.paused = true;
        }

        let snapshot = player.snapshot();

        assert_eq!(snapshot.current_song.unwrap().source_id, "a");
        assert_eq!(snapshot.songs.len(), 1);
        assert_eq!(snapshot.songs[0].source_id, "b");
        assert_eq!(snapshot.progress_seconds, 10.5);
        assert!(snapshot.paused);
        assert_eq!(snapshot.voice_channel_id, Some(ChannelId(7)));
    }
}
