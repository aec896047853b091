//! Upcoming tracks and play history

use crate::error::{Error, Result};
use cadence_common::{Track, TrackId};
use rand::Rng;
use std::collections::VecDeque;

/// Upcoming queue plus history stack (most recent last)
#[derive(Debug, Default, Clone)]
pub struct PlayQueue {
    upcoming: VecDeque<Track>,
    history: Vec<Track>,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the end of the upcoming queue
    pub fn push(&mut self, track: Track) {
        self.upcoming.push_back(track);
    }

    /// Put a track at the head of the upcoming queue
    pub fn push_front(&mut self, track: Track) {
        self.upcoming.push_front(track);
    }

    pub fn remove(&mut self, index: usize) -> Result<Track> {
        let len = self.upcoming.len();
        self.upcoming.remove(index).ok_or_else(|| {
            Error::Queue(format!("Index {} out of range (queue length {})", index, len))
        })
    }

    /// Consume the next track: the head, or a uniformly random entry when
    /// shuffling
    pub fn pop_next<R: Rng + ?Sized>(&mut self, shuffle: bool, rng: &mut R) -> Option<Track> {
        if self.upcoming.is_empty() {
            return None;
        }
        if shuffle {
            let index = rng.gen_range(0..self.upcoming.len());
            self.upcoming.remove(index)
        } else {
            self.upcoming.pop_front()
        }
    }

    pub fn push_history(&mut self, track: Track) {
        self.history.push(track);
    }

    pub fn pop_history(&mut self) -> Option<Track> {
        self.history.pop()
    }

    /// Replace the upcoming queue, leaving history alone
    pub fn replace(&mut self, tracks: Vec<Track>) {
        self.upcoming = tracks.into();
    }

    /// Empty the upcoming queue
    pub fn clear(&mut self) {
        self.upcoming.clear();
    }

    pub fn upcoming(&self) -> &VecDeque<Track> {
        &self.upcoming
    }

    pub fn upcoming_ids(&self) -> Vec<TrackId> {
        self.upcoming.iter().map(|t| t.id).collect()
    }

    pub fn history(&self) -> &[Track] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.upcoming.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upcoming.is_empty()
    }

    /// Apply a favorite flag change to every queued copy of a track
    pub fn set_favorite(&mut self, id: TrackId, favorite: bool) {
        for track in self.upcoming.iter_mut().chain(self.history.iter_mut()) {
            if track.id == id {
                track.favorite = favorite;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn track(name: &str) -> Track {
        Track::from_path(format!("/music/{}.flac", name))
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = PlayQueue::new();
        let mut rng = StdRng::seed_from_u64(1);
        queue.push(track("a"));
        queue.push(track("b"));

        assert_eq!(queue.pop_next(false, &mut rng).unwrap().title, "a");
        assert_eq!(queue.pop_next(false, &mut rng).unwrap().title, "b");
        assert!(queue.pop_next(false, &mut rng).is_none());
    }

    #[test]
    fn test_shuffle_pops_every_entry_once() {
        let mut queue = PlayQueue::new();
        let mut rng = StdRng::seed_from_u64(42);
        for name in ["a", "b", "c", "d", "e"] {
            queue.push(track(name));
        }

        let mut seen: Vec<String> = std::iter::from_fn(|| queue.pop_next(true, &mut rng))
            .map(|t| t.title)
            .collect();
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_remove_out_of_range() {
        let mut queue = PlayQueue::new();
        queue.push(track("a"));
        assert!(matches!(queue.remove(3), Err(Error::Queue(_))));
        assert_eq!(queue.remove(0).unwrap().title, "a");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_history_is_a_stack() {
        let mut queue = PlayQueue::new();
        queue.push_history(track("first"));
        queue.push_history(track("second"));
        assert_eq!(queue.pop_history().unwrap().title, "second");
        assert_eq!(queue.pop_history().unwrap().title, "first");
        assert!(queue.pop_history().is_none());
    }

    #[test]
    fn test_replace_keeps_history() {
        let mut queue = PlayQueue::new();
        queue.push(track("old"));
        queue.push_history(track("played"));
        queue.replace(vec![track("x"), track("y")]);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.history().len(), 1);
        queue.push_front(track("front"));
        assert_eq!(queue.upcoming()[0].title, "front");
    }
}
