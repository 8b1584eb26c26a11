//! Pre-allocated ring of slots with a claim/publish protocol.
//!
//! Producers claim a slot, write it through [`ClaimedSlot`], and the slot is
//! published when the claim is dropped. Processors read published slots by
//! sequence through [`RingBuffer::wait_for`] and [`RingBuffer::get`].
//!
//! The ring also carries a publish gate: producers hold a [`PublishPermit`]
//! while they claim and publish, and shutdown closes the gate and waits for
//! in-flight permits before it drains and halts the ring. `open` and
//! `in_flight` are both accessed with `SeqCst` so that a producer either
//! sees the gate closed or is counted by the shutdown wait.

use std::cell::UnsafeCell;
use std::ops::{ Deref, DerefMut };
use std::sync::atomic::{ AtomicBool, AtomicUsize, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::{ Duration, Instant };

use parking_lot::{ Mutex, MutexGuard };

use crate::constants::CLAIM_SPIN_TRIES;
use crate::disruptor::{ PaddedSequence, ProducerType, Sequence, Sequencer, WaitStrategy };
use crate::error::{ Result, VortexError };

pub struct RingBuffer<E> {
    slots: Box<[UnsafeCell<E>]>,
    index_mask: usize,
    sequencer: Sequencer,
    wait_strategy: Arc<dyn WaitStrategy>,
    alert: AtomicBool,
    /// Serializes claim..publish for `ProducerType::Single`
    producer_lock: Option<Mutex<()>>,
    open: AtomicBool,
    in_flight: AtomicUsize,
}

// Slot access is coordinated by the sequencer: a slot is written only by the
// producer that claimed it and read only after it has been published.
unsafe impl<E: Send + Sync> Send for RingBuffer<E> {}
unsafe impl<E: Send + Sync> Sync for RingBuffer<E> {}

impl<E: Default> RingBuffer<E> {
    /// Create a ring buffer with `size` pre-allocated slots.
    ///
    /// `size` must be a power of two.
    pub fn new(size: usize, producer_type: ProducerType, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        let sequencer = Sequencer::new(size, producer_type, wait_strategy.clone())?;
        let slots = (0..size)
            .map(|_| UnsafeCell::new(E::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            slots,
            index_mask: size - 1,
            sequencer,
            wait_strategy,
            alert: AtomicBool::new(false),
            producer_lock: match producer_type {
                ProducerType::Single => Some(Mutex::new(())),
                ProducerType::Multi => None,
            },
            open: AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
        })
    }
}

impl<E> RingBuffer<E> {
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    #[inline(always)]
    pub fn producer_type(&self) -> ProducerType {
        self.sequencer.producer_type()
    }

    pub fn add_gating_sequence(&self, sequence: Arc<PaddedSequence>) {
        self.sequencer.add_gating_sequence(sequence);
    }

    /// Claim the next slot, waiting for capacity.
    ///
    /// Fails with `VortexError::Halted` once the ring has been halted, or
    /// when it is full and publishing has been closed.
    pub fn claim(&self) -> Result<ClaimedSlot<'_, E>> {
        let mut spins = 0u32;

        loop {
            if self.is_alerted() {
                return Err(VortexError::Halted);
            }
            // The producer lock is held from a successful claim to publish,
            // never across the backoff below
            let guard = self.producer_lock.as_ref().map(|lock| lock.lock());
            if let Some(sequence) = self.sequencer.try_next() {
                return Ok(ClaimedSlot {
                    ring: self,
                    sequence,
                    _producer: guard,
                });
            }
            drop(guard);
            if !self.is_open() {
                return Err(VortexError::Halted);
            }

            if spins < CLAIM_SPIN_TRIES {
                std::hint::spin_loop();
                spins += 1;
            } else if spins < CLAIM_SPIN_TRIES * 2 {
                thread::yield_now();
                spins += 1;
            } else {
                thread::sleep(Duration::from_micros(50));
            }
        }
    }

    /// Claim the next slot or fail with `VortexError::RingBufferFull`.
    ///
    /// Never waits: a single-producer ring whose producer lock is taken by
    /// another claimer counts as full.
    pub fn try_claim(&self) -> Result<ClaimedSlot<'_, E>> {
        if self.is_alerted() {
            return Err(VortexError::Halted);
        }
        let guard = match self.producer_lock.as_ref() {
            Some(lock) => Some(lock.try_lock().ok_or(VortexError::RingBufferFull)?),
            None => None,
        };
        match self.sequencer.try_next() {
            Some(sequence) =>
                Ok(ClaimedSlot {
                    ring: self,
                    sequence,
                    _producer: guard,
                }),
            None => Err(VortexError::RingBufferFull),
        }
    }

    /// Read a published slot.
    ///
    /// # Safety
    ///
    /// `sequence` must be published and its slot must not be reclaimed while
    /// the reference is alive, i.e. the caller's gating sequence is at or
    /// below `sequence`.
    #[inline(always)]
    pub unsafe fn get(&self, sequence: Sequence) -> &E {
        &*self.slots[(sequence as usize) & self.index_mask].get()
    }

    /// Wait until `sequence` is published. Returns the published count, which
    /// is always greater than `sequence`.
    pub fn wait_for(&self, sequence: Sequence) -> Result<Sequence> {
        loop {
            let available = self.wait_strategy.wait_for(sequence, self.sequencer.cursor(), &self.alert)?;
            let highest = self.sequencer.highest_published(sequence, available);
            if highest > sequence {
                return Ok(highest);
            }
            // Multi producer gap: claimed ahead of us but not yet published
            if self.is_alerted() {
                return Err(VortexError::Halted);
            }
            std::hint::spin_loop();
        }
    }

    /// Stop processors and blocked producers
    pub fn halt(&self) {
        self.alert.store(true, Ordering::Release);
        self.wait_strategy.signal_all_when_blocking();
    }

    #[inline(always)]
    pub fn is_alerted(&self) -> bool {
        self.alert.load(Ordering::Acquire)
    }

    pub fn remaining_capacity(&self) -> usize {
        self.sequencer.remaining_capacity()
    }

    /// Claimed exchanges not yet consumed by every processor
    pub fn pending(&self) -> usize {
        self.sequencer.pending()
    }

    /// Enter the publish gate, `None` once it has been closed
    pub fn try_enter_publish(&self) -> Option<PublishPermit<'_, E>> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if !self.open.load(Ordering::SeqCst) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(PublishPermit { ring: self })
    }

    pub fn close_publishing(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Wait for producers inside the gate to leave. Returns false on timeout.
    pub fn await_publishers(&self, timeout: Duration) -> bool {
        wait_until(timeout, || self.in_flight.load(Ordering::SeqCst) == 0)
    }

    /// Wait for processors to consume everything claimed. Returns false on timeout.
    pub fn await_drained(&self, timeout: Duration) -> bool {
        wait_until(timeout, || self.pending() == 0)
    }
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if done() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_micros(100));
    }
}

/// A claimed slot. Publishes its sequence when dropped.
pub struct ClaimedSlot<'a, E> {
    ring: &'a RingBuffer<E>,
    sequence: Sequence,
    _producer: Option<MutexGuard<'a, ()>>,
}

impl<'a, E> ClaimedSlot<'a, E> {
    #[inline(always)]
    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    /// Publish explicitly (same as dropping the claim)
    pub fn publish(self) {}
}

impl<'a, E> Deref for ClaimedSlot<'a, E> {
    type Target = E;

    fn deref(&self) -> &E {
        unsafe { &*self.ring.slots[(self.sequence as usize) & self.ring.index_mask].get() }
    }
}

impl<'a, E> DerefMut for ClaimedSlot<'a, E> {
    fn deref_mut(&mut self) -> &mut E {
        // The claim is exclusive until published
        unsafe { &mut *self.ring.slots[(self.sequence as usize) & self.ring.index_mask].get() }
    }
}

impl<'a, E> Drop for ClaimedSlot<'a, E> {
    fn drop(&mut self) {
        self.ring.sequencer.publish(self.sequence);
    }
}

/// Proof that a producer is inside the publish gate
pub struct PublishPermit<'a, E> {
    ring: &'a RingBuffer<E>,
}

impl<'a, E> Drop for PublishPermit<'a, E> {
    fn drop(&mut self) {
        self.ring.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
