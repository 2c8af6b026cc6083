use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

/// Consumable permutation of catalog indices.
///
/// Indices are drawn without replacement until the permutation runs dry,
/// then a fresh one is dealt that leaves out the track that just played.
/// `history` records the order picks were played in so "back" can retrace it.
#[derive(Debug)]
pub struct ShuffleOrder {
    remaining: Vec<usize>,
    history: Vec<usize>,
    len: usize,
    rng: SmallRng,
}

impl ShuffleOrder {
    pub fn new() -> Self {
        Self::with_rng(SmallRng::try_from_rng(&mut rand::rngs::SysRng).expect("from_os_rng failed"))
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(SmallRng::seed_from_u64(seed))
    }

    fn with_rng(rng: SmallRng) -> Self {
        Self {
            remaining: Vec::new(),
            history: Vec::new(),
            len: 0,
            rng,
        }
    }

    /// Deals a new permutation of `0..len`, leaving `current` out.
    pub fn regenerate(&mut self, len: usize, current: Option<usize>) {
        self.len = len;
        self.remaining = (0..len).filter(|idx| Some(*idx) != current).collect();
        self.remaining.shuffle(&mut self.rng);
        self.history.clear();
        if let Some(current) = current.filter(|idx| *idx < len) {
            self.history.push(current);
        }
    }

    pub fn clear(&mut self) {
        self.remaining.clear();
        self.history.clear();
        self.len = 0;
    }

    /// Pops the next pick. A catalog of one keeps replaying `current`.
    pub fn next(&mut self, len: usize, current: Option<usize>) -> Option<usize> {
        if len == 0 {
            return None;
        }
        if len != self.len || self.remaining.is_empty() {
            self.regenerate(len, current);
        }

        let Some(pick) = self.remaining.pop() else {
            return current.filter(|idx| *idx < len).or(Some(0));
        };
        self.history.push(pick);
        Some(pick)
    }

    /// Steps back through the play history. The track being left is put back
    /// on top of the permutation so a following `next` returns to it.
    pub fn back(&mut self) -> Option<usize> {
        if self.history.len() < 2 {
            return None;
        }
        let left = self.history.pop()?;
        self.remaining.push(left);
        self.history.last().copied()
    }

    /// Records a pick made outside the permutation (direct selection).
    pub fn mark_played(&mut self, index: usize) {
        self.remaining.retain(|idx| *idx != index);
        if self.history.last() != Some(&index) {
            self.history.push(index);
        }
    }

    pub fn remaining(&self) -> &[usize] {
        &self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_empty()
    }
}

impl Default for ShuffleOrder {
    fn default() -> Self {
        Self::new()
    }
}
