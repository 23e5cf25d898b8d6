//! Candidate screening and queue-growth bookkeeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::mix::song::{Candidate, CandidateKind, Song};
use crate::traits::CandidateSource;

/// Attempts per related page before the traversal gives up on it.
const PAGE_FETCH_ATTEMPTS: usize = 3;
const PAGE_RETRY_DELAYS_MS: [u64; 2] = [250, 750];

/// Running totals for a collection pass. Shared so UI collaborators can read
/// a live snapshot while collection is still appending.
#[derive(Debug, Default)]
pub struct CollectionCounters {
    accepted: AtomicU64,
    ignored_live: AtomicU64,
    ignored_playlists: AtomicU64,
    ignored_overlong: AtomicU64,
}

impl CollectionCounters {
    pub fn reset(&self) {
        self.accepted.store(0, Ordering::Relaxed);
        self.ignored_live.store(0, Ordering::Relaxed);
        self.ignored_playlists.store(0, Ordering::Relaxed);
        self.ignored_overlong.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            ignored_live: self.ignored_live.load(Ordering::Relaxed),
            ignored_playlists: self.ignored_playlists.load(Ordering::Relaxed),
            ignored_overlong: self.ignored_overlong.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counter values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub accepted: u64,
    pub ignored_live: u64,
    pub ignored_playlists: u64,
    pub ignored_overlong: u64,
}

/// Filters candidates into playable songs and pulls related pages with
/// bounded retries.
pub struct SongCollector {
    source: Arc<dyn CandidateSource>,
    max_song_duration_secs: u64,
    counters: Arc<CollectionCounters>,
}

impl SongCollector {
    pub fn new(source: Arc<dyn CandidateSource>, max_song_duration_secs: u64) -> Self {
        Self {
            source,
            max_song_duration_secs,
            counters: Arc::new(CollectionCounters::default()),
        }
    }

    pub fn counters(&self) -> Arc<CollectionCounters> {
        Arc::clone(&self.counters)
    }

    /// Classifies one candidate. Every candidate lands in exactly one
    /// bucket: accepted as a song, or counted under the reason it was
    /// dropped. Unknown durations count as overlong since they cannot be
    /// bounded.
    pub fn screen(&self, candidate: Candidate) -> Option<Song> {
        match candidate.kind {
            CandidateKind::Live => {
                self.counters.ignored_live.fetch_add(1, Ordering::Relaxed);
                None
            }
            CandidateKind::Playlist => {
                self.counters
                    .ignored_playlists
                    .fetch_add(1, Ordering::Relaxed);
                None
            }
            CandidateKind::Video { duration_seconds } => match duration_seconds {
                Some(secs) if secs <= self.max_song_duration_secs => {
                    self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                    Some(Song {
                        title: candidate.title,
                        duration_seconds: secs,
                        source_id: candidate.source_id,
                        thumbnail_url: candidate.thumbnail_url,
                        channel_name: candidate.channel_name,
                        channel_url: candidate.channel_url,
                        channel_avatar_url: candidate.channel_avatar_url,
                    })
                }
                _ => {
                    self.counters
                        .ignored_overlong
                        .fetch_add(1, Ordering::Relaxed);
                    None
                }
            },
        }
    }

    /// Fetches one related page, retrying transient failures. Exhausted
    /// retries come back as an empty page so the traversal ends with the
    /// partial queue instead of propagating the error.
    pub async fn fetch_page(&self, seed_source_id: &str, page_index: u32) -> Vec<Candidate> {
        for attempt in 1..=PAGE_FETCH_ATTEMPTS {
            match self.source.related_page(seed_source_id, page_index).await {
                Ok(candidates) => return candidates,
                Err(e) => {
                    log::warn!(
                        "[Collector] Related page {page_index} attempt {attempt}/{PAGE_FETCH_ATTEMPTS} failed: {e}"
                    );
                    if attempt < PAGE_FETCH_ATTEMPTS {
                        let delay =
                            PAGE_RETRY_DELAYS_MS[(attempt - 1).min(PAGE_RETRY_DELAYS_MS.len() - 1)];
                        sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }
        log::warn!("[Collector] Giving up on related page {page_index}, ending traversal");
        Vec::new()
    }
}
