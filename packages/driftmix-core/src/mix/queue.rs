//! Ordered song list with a play-position pointer.

use super::song::Song;

/// Per-guild song list plus the index of the song being played.
///
/// `position` clamps at zero on rewind but is free to run past the end;
/// callers observe that as "nothing current" while collection may still
/// append songs behind it, at which point a song re-emerges as current.
#[derive(Debug, Clone, Default)]
pub struct SongQueue {
    songs: Vec<Song>,
    position: usize,
}

impl SongQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Song> {
        self.songs.get(self.position)
    }

    /// Songs after the current one; empty when the position is out of range.
    pub fn upcoming(&self) -> &[Song] {
        let start = self.position.saturating_add(1).min(self.songs.len());
        &self.songs[start..]
    }

    pub fn push(&mut self, song: Song) {
        self.songs.push(song);
    }

    /// Moves the position by `count`; negative counts rewind, clamped at
    /// zero. The upper bound is intentionally unclamped.
    pub fn advance(&mut self, count: i64) {
        let next = self.position as i64 + count;
        self.position = next.max(0) as usize;
    }

    /// Replaces the song list without touching the position. Rehydration
    /// sets the position separately.
    pub fn set_all(&mut self, songs: Vec<Song>) {
        self.songs = songs;
    }

    pub fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    /// Drops every song and rewinds to the start.
    pub fn reset(&mut self) {
        self.songs.clear();
        self.position = 0;
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }
}
