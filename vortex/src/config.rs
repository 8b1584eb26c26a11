//! Endpoint and component configuration.
//!
//! Both structs deserialize with serde and fall back to the defaults in
//! [`crate::constants`] for every field that is left out.

use std::time::Duration;

use serde::{ Deserialize, Serialize };

use crate::constants::{
    DEFAULT_BUFFER_SIZE,
    DEFAULT_TIMEOUT_MILLIS,
    LIFECYCLE_TIMEOUT,
    MAX_CONCURRENT_CONSUMERS,
    RECONFIGURE_WAIT,
};
use crate::disruptor::{ ProducerType, WaitStrategyType };
use crate::error::{ Result, VortexError };

/// Whether a producer blocks until its exchange has been processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WaitForTaskToComplete {
    /// Always wait for completion
    Always,
    /// Wait only for exchanges that expect a reply (`InOut`)
    #[default]
    IfReplyExpected,
    /// Never wait, hand the completion over to the consumer side
    Never,
}

/// Round a requested buffer size up to the next power of two
pub fn power_of_two(size: usize) -> usize {
    size.max(1).next_power_of_two()
}

/// Per-endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Requested ring buffer size, `None` uses the component default
    pub size: Option<usize>,
    /// Single or multi producer claim protocol
    pub producer_type: ProducerType,
    /// Strategy consumers use while waiting for new sequences
    pub wait_strategy: WaitStrategyType,
    /// Number of handlers partitioning the work of one consumer
    pub concurrent_consumers: usize,
    /// Allow more than one consumer on the endpoint (each receives every exchange)
    pub multiple_consumers: bool,
    /// Block the producer when the ring buffer is full instead of failing
    pub block_when_full: bool,
    /// Producer wait policy
    pub wait_for_task_to_complete: WaitForTaskToComplete,
    /// Completion timeout in milliseconds, 0 waits forever
    pub timeout_millis: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            size: None,
            producer_type: ProducerType::Multi,
            wait_strategy: WaitStrategyType::Blocking,
            concurrent_consumers: 1,
            multiple_consumers: false,
            block_when_full: true,
            wait_for_task_to_complete: WaitForTaskToComplete::IfReplyExpected,
            timeout_millis: DEFAULT_TIMEOUT_MILLIS,
        }
    }
}

impl EndpointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_producer_type(mut self, producer_type: ProducerType) -> Self {
        self.producer_type = producer_type;
        self
    }

    pub fn with_wait_strategy(mut self, wait_strategy: WaitStrategyType) -> Self {
        self.wait_strategy = wait_strategy;
        self
    }

    pub fn with_concurrent_consumers(mut self, concurrent_consumers: usize) -> Self {
        self.concurrent_consumers = concurrent_consumers;
        self
    }

    pub fn with_multiple_consumers(mut self, multiple_consumers: bool) -> Self {
        self.multiple_consumers = multiple_consumers;
        self
    }

    pub fn with_block_when_full(mut self, block_when_full: bool) -> Self {
        self.block_when_full = block_when_full;
        self
    }

    pub fn with_wait_for_task_to_complete(mut self, wait: WaitForTaskToComplete) -> Self {
        self.wait_for_task_to_complete = wait;
        self
    }

    pub fn with_timeout_millis(mut self, timeout_millis: u64) -> Self {
        self.timeout_millis = timeout_millis;
        self
    }

    /// Check the configuration against the component limits
    pub fn validate(&self, max_concurrent_consumers: usize) -> Result<()> {
        if self.size == Some(0) {
            return Err(VortexError::config("Ring buffer size must be greater than 0"));
        }
        if self.concurrent_consumers == 0 {
            return Err(VortexError::config("Number of concurrent consumers must be greater than 0"));
        }
        if self.concurrent_consumers > max_concurrent_consumers {
            return Err(
                crate::config_error!(
                    "Number of concurrent consumers {} exceeds the limit of {}",
                    self.concurrent_consumers,
                    max_concurrent_consumers
                )
            );
        }
        Ok(())
    }

    /// Buffer size actually used: requested (or default) rounded to a power of two
    pub fn effective_size(&self, default_size: usize) -> usize {
        power_of_two(self.size.unwrap_or(default_size))
    }

    /// Completion timeout, `None` means wait forever
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_millis == 0 { None } else { Some(Duration::from_millis(self.timeout_millis)) }
    }
}

/// Component-wide defaults and limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentConfig {
    /// Buffer size for endpoints that do not request one
    pub buffer_size: usize,
    /// Upper bound for `concurrent_consumers`
    pub max_concurrent_consumers: usize,
    /// Bounded wait for handler start/stop confirmation
    pub lifecycle_timeout_millis: u64,
    /// Bound on a producer's wait while the reference is reconfiguring
    pub reconfigure_wait_millis: u64,
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_concurrent_consumers: MAX_CONCURRENT_CONSUMERS,
            lifecycle_timeout_millis: LIFECYCLE_TIMEOUT.as_millis() as u64,
            reconfigure_wait_millis: RECONFIGURE_WAIT.as_millis() as u64,
        }
    }
}

impl ComponentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(VortexError::config("Default buffer size must be greater than 0"));
        }
        if self.max_concurrent_consumers == 0 {
            return Err(VortexError::config("Maximum concurrent consumers must be greater than 0"));
        }
        Ok(())
    }

    pub fn lifecycle_timeout(&self) -> Duration {
        Duration::from_millis(self.lifecycle_timeout_millis)
    }

    pub fn reconfigure_wait(&self) -> Duration {
        Duration::from_millis(self.reconfigure_wait_millis)
    }
}
