// Copyright (c) 2024 Botho Foundation

//! Sliding-window anti-replay filter.
//!
//! Keeps the highest accepted sequence and a bitmap over the trailing
//! window. Routed messages may arrive out of order; anything inside the
//! window is accepted once, anything behind it is rejected.
//!
//! ```text
//!   window base                        highest
//!        │◀──────────── capacity ─────────▶│
//!  ──────┼─────────────────────────────────┼──────▶ sequence
//!  TooOld│    Accept once / Replay         │AcceptAndAdvance
//! ```
//!
//! Not synchronized; the owning route wraps it in a mutex.

/// Outcome of [`ReplayWindow::check_detailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayCheck {
    /// Inside the window and not seen before
    Accept,
    /// Ahead of the window; the window slid forward
    AcceptAndAdvance,
    /// Already seen
    Replay,
    /// Behind the trailing edge
    TooOld,
}

impl ReplayCheck {
    /// Whether the sequence should be processed.
    pub fn is_accepted(self) -> bool {
        matches!(self, ReplayCheck::Accept | ReplayCheck::AcceptAndAdvance)
    }
}

/// Anti-replay window over `u64` sequence numbers.
#[derive(Debug, Clone)]
pub struct ReplayWindow {
    capacity: u64,
    highest: Option<u64>,
    bitmap: Vec<u64>,
}

impl ReplayWindow {
    /// Create a window holding `capacity` sequences, rounded up to a
    /// multiple of 64.
    pub fn new(capacity: usize) -> Self {
        let words = capacity.max(1).div_ceil(64);
        Self {
            capacity: (words * 64) as u64,
            highest: None,
            bitmap: vec![0u64; words],
        }
    }

    /// Number of sequences the window tracks.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Highest sequence accepted so far.
    pub fn highest(&self) -> Option<u64> {
        self.highest
    }

    /// Oldest sequence that can still be accepted.
    pub fn window_base(&self) -> u64 {
        match self.highest {
            Some(highest) => highest.saturating_sub(self.capacity - 1),
            None => 0,
        }
    }

    /// Check a sequence and record it if accepted.
    pub fn check(&mut self, sequence: u64) -> bool {
        self.check_detailed(sequence).is_accepted()
    }

    /// Check a sequence and record it if accepted, reporting why.
    pub fn check_detailed(&mut self, sequence: u64) -> ReplayCheck {
        let highest = match self.highest {
            None => {
                self.highest = Some(sequence);
                self.set_bit(sequence);
                return ReplayCheck::AcceptAndAdvance;
            }
            Some(highest) => highest,
        };

        if sequence > highest {
            let advance = sequence - highest;
            if advance >= self.capacity {
                self.bitmap.iter_mut().for_each(|word| *word = 0);
            } else {
                // Slots for the new sequences still hold bits from one
                // window ago.
                for slot in highest + 1..=sequence {
                    self.clear_bit(slot);
                }
            }
            self.highest = Some(sequence);
            self.set_bit(sequence);
            return ReplayCheck::AcceptAndAdvance;
        }

        if sequence < self.window_base() {
            return ReplayCheck::TooOld;
        }
        if self.get_bit(sequence) {
            return ReplayCheck::Replay;
        }
        self.set_bit(sequence);
        ReplayCheck::Accept
    }

    #[inline]
    fn position(&self, sequence: u64) -> (usize, u64) {
        let bit = sequence % self.capacity;
        ((bit / 64) as usize, 1u64 << (bit % 64))
    }

    #[inline]
    fn get_bit(&self, sequence: u64) -> bool {
        let (word, mask) = self.position(sequence);
        self.bitmap[word] & mask != 0
    }

    #[inline]
    fn set_bit(&mut self, sequence: u64) {
        let (word, mask) = self.position(sequence);
        self.bitmap[word] |= mask;
    }

    #[inline]
    fn clear_bit(&mut self, sequence: u64) {
        let (word, mask) = self.position(sequence);
        self.bitmap[word] &= !mask;
    }
}
