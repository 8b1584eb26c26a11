//! Ring buffer core based on the LMAX Disruptor pattern.
//!
//! ## Components
//!
//! | Type | Role |
//! |------|------|
//! | `RingBuffer<E>` | Pre-allocated slots, claim/publish protocol, publish gate |
//! | `Sequencer` | Single or multi producer sequence claiming and publication |
//! | `WaitStrategy` | How processors wait for published sequences |
//! | `EventProcessor<E>` | Run loop delivering sequences to one `EventHandler` |
//!
//! Sequences start at 0. Cursors and gating sequences hold counts, so a
//! cursor value of `n` means sequences `0..n` are visible.
//!
//! ## Safety
//!
//! Slots are `UnsafeCell`s. A producer only gets `&mut` access to a slot after
//! every gating sequence has moved past the previous lap of that slot, and
//! processors only read slots below the published cursor.

pub mod common;
pub mod processor;
pub mod ring_buffer;
pub mod sequencer;
pub mod wait_strategy;

use std::sync::Arc;

use serde::{ Deserialize, Serialize };

pub use common::PaddedSequence;
pub use processor::{ EventHandler, EventProcessor };
pub use ring_buffer::{ ClaimedSlot, PublishPermit, RingBuffer };
pub use sequencer::Sequencer;
pub use wait_strategy::{
    BlockingWaitStrategy,
    BusySpinWaitStrategy,
    SleepingWaitStrategy,
    WaitStrategy,
    YieldingWaitStrategy,
};

/// Sequence number type for ring buffer positions
pub type Sequence = u64;

/// Claim protocol used by producers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProducerType {
    /// One publishing thread at a time, claims without CAS
    Single,
    /// Any number of concurrent publishing threads
    #[default]
    Multi,
}

/// Available wait strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WaitStrategyType {
    /// Condition variable wait, lowest CPU usage
    #[default]
    Blocking,
    /// Spin, then yield, then sleep
    Sleeping,
    /// Busy spin for lowest latency
    BusySpin,
    /// Spin, then yield
    Yielding,
}

impl WaitStrategyType {
    /// Create a fresh strategy instance for a new ring buffer
    pub fn create(self) -> Arc<dyn WaitStrategy> {
        match self {
            Self::Blocking => Arc::new(BlockingWaitStrategy::new()),
            Self::Sleeping => Arc::new(SleepingWaitStrategy::default()),
            Self::BusySpin => Arc::new(BusySpinWaitStrategy::new()),
            Self::Yielding => Arc::new(YieldingWaitStrategy::new()),
        }
    }
}
