//! Sequence claiming and publication for single and multi producer rings.
//!
//! - Single producer: the claim counter is only touched under the ring's
//!   producer lock, so claiming is a plain load/store. `cursor` is the
//!   published count and advances on every publish.
//! - Multi producer: claims race on `cursor` with CAS. Publication marks the
//!   slot in an availability buffer with the lap number, and processors scan
//!   that buffer for the highest contiguous published sequence.

use std::sync::atomic::{ AtomicU64, Ordering };
use std::sync::Arc;

use parking_lot::RwLock;

use crate::disruptor::{ PaddedSequence, ProducerType, Sequence, WaitStrategy };
use crate::error::{ Result, VortexError };

pub struct Sequencer {
    producer_type: ProducerType,
    buffer_size: u64,
    index_mask: usize,
    index_shift: u32,
    /// Single: published count. Multi: claimed count.
    cursor: PaddedSequence,
    /// Single only: claimed count
    next_value: PaddedSequence,
    /// Last observed minimum gating sequence
    gating_cache: PaddedSequence,
    /// Multi only: lap + 1 of the last publish into each slot (0 = never)
    available: Box<[AtomicU64]>,
    gating_sequences: RwLock<Vec<Arc<PaddedSequence>>>,
    wait_strategy: Arc<dyn WaitStrategy>,
}

impl Sequencer {
    pub fn new(buffer_size: usize, producer_type: ProducerType, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        if buffer_size == 0 || !buffer_size.is_power_of_two() {
            return Err(VortexError::config("Size must be power of 2"));
        }

        let available = match producer_type {
            ProducerType::Single => Vec::new().into_boxed_slice(),
            ProducerType::Multi =>
                (0..buffer_size)
                    .map(|_| AtomicU64::new(0))
                    .collect::<Vec<_>>()
                    .into_boxed_slice(),
        };

        Ok(Self {
            producer_type,
            buffer_size: buffer_size as u64,
            index_mask: buffer_size - 1,
            index_shift: buffer_size.trailing_zeros(),
            cursor: PaddedSequence::new(0),
            next_value: PaddedSequence::new(0),
            gating_cache: PaddedSequence::new(0),
            available,
            gating_sequences: RwLock::new(Vec::new()),
            wait_strategy,
        })
    }

    #[inline(always)]
    pub fn producer_type(&self) -> ProducerType {
        self.producer_type
    }

    #[inline(always)]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size as usize
    }

    /// Cursor processors wait on
    #[inline(always)]
    pub fn cursor(&self) -> &PaddedSequence {
        &self.cursor
    }

    /// Number of sequences handed out to producers so far
    #[inline(always)]
    pub fn claimed(&self) -> Sequence {
        match self.producer_type {
            ProducerType::Single => self.next_value.get(),
            ProducerType::Multi => self.cursor.get(),
        }
    }

    pub fn add_gating_sequence(&self, sequence: Arc<PaddedSequence>) {
        self.gating_sequences.write().push(sequence);
    }

    /// Slowest processor position, or `default` when nothing gates the ring
    pub fn minimum_gating_sequence(&self, default: Sequence) -> Sequence {
        self.gating_sequences
            .read()
            .iter()
            .map(|s| s.get())
            .min()
            .unwrap_or(default)
    }

    /// Try to claim the next sequence without waiting.
    ///
    /// For `ProducerType::Single` the caller must hold the ring's producer lock.
    pub fn try_next(&self) -> Option<Sequence> {
        match self.producer_type {
            ProducerType::Single => {
                let current = self.next_value.get();
                if !self.has_capacity_for(current) {
                    return None;
                }
                self.next_value.set(current + 1);
                Some(current)
            }
            ProducerType::Multi => {
                loop {
                    let current = self.cursor.get();
                    if !self.has_capacity_for(current) {
                        return None;
                    }
                    if self.cursor.compare_and_set(current, current + 1) {
                        return Some(current);
                    }
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Claiming `sequence` overwrites the slot of `sequence - size`, which
    /// every gating sequence must have moved past.
    #[inline]
    fn has_capacity_for(&self, sequence: Sequence) -> bool {
        let wrap_point = (sequence + 1).saturating_sub(self.buffer_size);
        if wrap_point <= self.gating_cache.get() {
            return true;
        }
        let min = self.minimum_gating_sequence(sequence);
        self.gating_cache.set(min);
        wrap_point <= min
    }

    /// Make a claimed sequence visible to processors
    pub fn publish(&self, sequence: Sequence) {
        match self.producer_type {
            ProducerType::Single => self.cursor.set(sequence + 1),
            ProducerType::Multi => {
                let index = (sequence as usize) & self.index_mask;
                let lap = (sequence >> self.index_shift) + 1;
                self.available[index].store(lap, Ordering::Release);
            }
        }
        self.wait_strategy.signal_all_when_blocking();
    }

    #[inline]
    fn is_available(&self, sequence: Sequence) -> bool {
        let index = (sequence as usize) & self.index_mask;
        let lap = (sequence >> self.index_shift) + 1;
        self.available[index].load(Ordering::Acquire) == lap
    }

    /// Highest published count in `[lower, available)` reachable without gaps
    pub fn highest_published(&self, lower: Sequence, available: Sequence) -> Sequence {
        match self.producer_type {
            ProducerType::Single => available,
            ProducerType::Multi => {
                let mut sequence = lower;
                while sequence < available {
                    if !self.is_available(sequence) {
                        return sequence;
                    }
                    sequence += 1;
                }
                available
            }
        }
    }

    pub fn remaining_capacity(&self) -> usize {
        let claimed = self.claimed();
        let consumed = self.minimum_gating_sequence(claimed);
        (self.buffer_size - claimed.saturating_sub(consumed)) as usize
    }

    /// Claimed sequences not yet processed by every gating sequence
    pub fn pending(&self) -> usize {
        let claimed = self.claimed();
        claimed.saturating_sub(self.minimum_gating_sequence(claimed)) as usize
    }
}
