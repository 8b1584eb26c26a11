//! # vortex-test-support
//!
//! Testing infrastructure for vortex endpoints.
//!
//! ## Components
//!
//! - **Recorder** - Processor that records every delivery with its dispatch info
//! - **Latch** - One-shot gate for holding consumers at a known point
//! - **SequenceChecker** - Ordering, loss and duplicate checks
//! - **StressRunner** - Long-running publish/reconfigure runs with progress output

pub mod recorder;
pub mod stress;
pub mod verify;

pub use recorder::{ Delivery, Latch, Recorder };
pub use stress::{ print_summary, StressConfig, StressCounters, StressMetrics, StressRunner };
pub use verify::{ missing_and_duplicates, SequenceChecker };

use std::time::{ Duration, Instant };

/// Poll `condition` every millisecond until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Install a warn-level subscriber; later calls are no-ops
pub fn init_test_logging() {
    vortex::insights::init_logging(vortex::insights::Level::WARN);
}
