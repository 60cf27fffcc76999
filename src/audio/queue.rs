use rand::{seq::SliceRandom, Rng};

use crate::sources::Track;

/// Ordered tracks plus the position pointer.
///
/// Unlike a FIFO play queue nothing is consumed when a track finishes: the
/// pointer walks over the list and wraps around, so the queue only shrinks
/// when it is cleared or replaced.
#[derive(Debug, Default)]
pub struct Queue {
    tracks: Vec<Track>,
    position: usize,
    cycle: ShuffleCycle,
}

/// Draw-without-replacement state for shuffle mode.
///
/// `origin` is where the cycle started; once every other index has been drawn
/// the pointer folds back to it and a new cycle begins.
#[derive(Debug, Default)]
struct ShuffleCycle {
    origin: usize,
    undrawn: Vec<usize>,
}

impl ShuffleCycle {
    fn restart(&mut self, origin: usize, len: usize) {
        self.origin = origin;
        self.undrawn = (0..len).filter(|&index| index != origin).collect();
    }

    fn mark_drawn(&mut self, index: usize) {
        self.undrawn.retain(|&candidate| candidate != index);
    }
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    #[cfg(test)]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Current position, `None` while the queue is empty.
    pub fn position(&self) -> Option<usize> {
        (!self.tracks.is_empty()).then_some(self.position)
    }

    pub fn current(&self) -> Option<&Track> {
        self.tracks.get(self.position)
    }

    /// Drops the old contents and starts over at position 0.
    pub fn replace(&mut self, tracks: Vec<Track>) {
        self.tracks = tracks;
        self.position = 0;
        self.cycle.restart(0, self.tracks.len());
    }

    /// Appends without moving the pointer.
    pub fn extend(&mut self, tracks: Vec<Track>) {
        let start = self.tracks.len();
        self.tracks.extend(tracks);

        if start == 0 {
            self.position = 0;
            self.cycle.restart(0, self.tracks.len());
        } else {
            self.cycle.undrawn.extend(start..self.tracks.len());
        }
    }

    /// Jumps to `index`. Returns false when it is out of range.
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.tracks.len() {
            return false;
        }

        self.position = index;
        self.cycle.restart(index, self.tracks.len());
        true
    }

    pub fn step_forward(&mut self) {
        if self.tracks.is_empty() {
            return;
        }

        self.position = (self.position + 1) % self.tracks.len();
        self.cycle.mark_drawn(self.position);
    }

    pub fn step_backward(&mut self) {
        if self.tracks.is_empty() {
            return;
        }

        let len = self.tracks.len();
        self.position = (self.position + len - 1) % len;
        self.cycle.mark_drawn(self.position);
    }

    /// Picks a uniformly random index not yet drawn in the current cycle.
    pub fn draw_shuffled<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.tracks.is_empty() {
            return;
        }

        if self.cycle.undrawn.is_empty() {
            // Cycle exhausted: behave like the end of an unshuffled queue.
            self.position = self.cycle.origin.min(self.tracks.len() - 1);
            self.cycle.restart(self.position, self.tracks.len());
            return;
        }

        let slot = rng.gen_range(0..self.cycle.undrawn.len());
        self.position = self.cycle.undrawn.swap_remove(slot);
    }

    /// Permutes everything except the current track, which moves to slot 0.
    pub fn shuffle_tail<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.tracks.is_empty() {
            return;
        }

        self.tracks.swap(0, self.position);
        self.tracks[1..].shuffle(rng);
        self.position = 0;
        self.cycle.restart(0, self.tracks.len());
    }

    pub fn restart_cycle(&mut self) {
        self.cycle.restart(self.position, self.tracks.len());
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.position = 0;
        self.cycle = ShuffleCycle::default();
    }
}
