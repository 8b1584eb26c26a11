//! Wait strategies for ring buffer processors
//!
//! This module provides different wait strategies that control how event
//! processors wait for the producer cursor to move. Each strategy offers
//! different trade-offs between latency, CPU usage, and throughput.

use std::sync::atomic::{ AtomicBool, Ordering };
use std::thread;
use std::time::Duration;

use crate::disruptor::{ PaddedSequence, Sequence };
use crate::error::{ Result, VortexError };

/// Trait for wait strategies that determine how processors wait for data
pub trait WaitStrategy: Send + Sync {
    /// Wait until the cursor has moved past `sequence`
    ///
    /// # Arguments
    ///
    /// * `sequence` - The sequence number to wait for
    /// * `cursor` - The ring buffer cursor (a count, so `cursor > sequence` means available)
    /// * `alert` - Set when the ring buffer is halted
    ///
    /// # Returns
    ///
    /// Returns the cursor value observed, or `VortexError::Halted` if the
    /// ring buffer was halted while waiting.
    fn wait_for(&self, sequence: Sequence, cursor: &PaddedSequence, alert: &AtomicBool) -> Result<Sequence>;

    /// Signal that new data is available (or that the ring buffer halted)
    fn signal_all_when_blocking(&self);
}

#[inline(always)]
fn check_alert(alert: &AtomicBool) -> Result<()> {
    if alert.load(Ordering::Acquire) { Err(VortexError::Halted) } else { Ok(()) }
}

/// Busy spin wait strategy - lowest latency, highest CPU usage.
/// This strategy continuously checks the cursor in a tight loop and will
/// consume 100% of a CPU core while waiting.
pub struct BusySpinWaitStrategy;

impl BusySpinWaitStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BusySpinWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait_for(&self, sequence: Sequence, cursor: &PaddedSequence, alert: &AtomicBool) -> Result<Sequence> {
        loop {
            let available = cursor.get();
            if available > sequence {
                return Ok(available);
            }
            check_alert(alert)?;
            std::hint::spin_loop();
        }
    }

    fn signal_all_when_blocking(&self) {
        // No-op for busy spin - no blocking threads to signal
    }
}

/// Blocking wait strategy - lowest CPU usage.
/// Parks the processor thread on a condition variable until a producer
/// publishes. Publishing takes the mutex so a wakeup can't be lost between
/// the cursor check and the wait.
pub struct BlockingWaitStrategy {
    mutex: parking_lot::Mutex<()>,
    condition: parking_lot::Condvar,
}

impl BlockingWaitStrategy {
    pub fn new() -> Self {
        Self {
            mutex: parking_lot::Mutex::new(()),
            condition: parking_lot::Condvar::new(),
        }
    }
}

impl Default for BlockingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(&self, sequence: Sequence, cursor: &PaddedSequence, alert: &AtomicBool) -> Result<Sequence> {
        loop {
            let available = cursor.get();
            if available > sequence {
                return Ok(available);
            }
            check_alert(alert)?;

            let mut guard = self.mutex.lock();
            if cursor.get() > sequence || alert.load(Ordering::Acquire) {
                continue;
            }
            // Timed so a missed signal costs at most one period
            self.condition.wait_for(&mut guard, Duration::from_millis(1));
        }
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condition.notify_all();
    }
}

/// Sleeping wait strategy - spin, then yield, then sleep.
/// Keeps CPU usage low once the ring buffer goes idle at the cost of wakeup
/// latency.
pub struct SleepingWaitStrategy {
    retries: u32,
    sleep_duration: Duration,
}

impl SleepingWaitStrategy {
    /// Create a new sleeping wait strategy with custom sleep duration
    pub fn new(sleep_duration: Duration) -> Self {
        Self {
            retries: 200,
            sleep_duration,
        }
    }
}

impl Default for SleepingWaitStrategy {
    fn default() -> Self {
        Self::new(Duration::from_micros(100))
    }
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_for(&self, sequence: Sequence, cursor: &PaddedSequence, alert: &AtomicBool) -> Result<Sequence> {
        let mut counter = self.retries;

        loop {
            let available = cursor.get();
            if available > sequence {
                return Ok(available);
            }
            check_alert(alert)?;

            if counter > self.retries / 2 {
                std::hint::spin_loop();
                counter -= 1;
            } else if counter > 0 {
                thread::yield_now();
                counter -= 1;
            } else {
                thread::sleep(self.sleep_duration);
            }
        }
    }

    fn signal_all_when_blocking(&self) {
        // No-op for sleeping - threads will wake up naturally
    }
}

/// Yielding wait strategy - spin, then yield to other threads.
/// A compromise between busy spinning and sleeping: low latency without
/// starving other runnable threads.
pub struct YieldingWaitStrategy {
    spin_tries: u32,
}

impl YieldingWaitStrategy {
    pub fn new() -> Self {
        Self { spin_tries: 100 }
    }

    pub fn with_spin_tries(spin_tries: u32) -> Self {
        Self { spin_tries }
    }
}

impl Default for YieldingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_for(&self, sequence: Sequence, cursor: &PaddedSequence, alert: &AtomicBool) -> Result<Sequence> {
        let mut counter = 0;

        loop {
            let available = cursor.get();
            if available > sequence {
                return Ok(available);
            }
            check_alert(alert)?;

            if counter < self.spin_tries {
                std::hint::spin_loop();
                counter += 1;
            } else {
                thread::yield_now();
            }
        }
    }

    fn signal_all_when_blocking(&self) {
        // No-op for yielding - threads will wake up naturally
    }
}
