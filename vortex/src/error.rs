//! Error types and handling for vortex

use thiserror::Error;

/// Result type alias for vortex operations
pub type Result<T> = std::result::Result<T, VortexError>;

/// Main error type for vortex.
///
/// Errors are `Clone` so that a failure can be stored on an exchange and
/// copied back from a consumer's copy onto the producer's original.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VortexError {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message describing the configuration issue
        message: String,
    },

    /// The ring buffer reference is empty and no reconfiguration is pending
    #[error("Disruptor is not yet started or already shut down")]
    NotStarted,

    /// Ring buffer is full and cannot accept more exchanges
    #[error("Ring buffer is full")]
    RingBufferFull,

    /// The producer gave up waiting for the exchange to complete
    #[error("Exchange timed out after {millis} ms")]
    Timeout {
        /// Configured timeout that elapsed
        millis: u64,
    },

    /// A consumer failed while processing an exchange
    #[error("Processing error: {message}")]
    Processing {
        /// Error message reported by the processor
        message: String,
    },

    /// Operation is not allowed in the current lifecycle state
    #[error("Illegal state: {message}")]
    IllegalState {
        /// Error message describing the state violation
        message: String,
    },

    /// The ring buffer was halted while a processor was waiting on it
    #[error("Ring buffer was halted")]
    Halted,
}

impl VortexError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a new processing error
    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing {
            message: message.into(),
        }
    }

    /// Create a new illegal state error
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable by retrying the same call later
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RingBufferFull | Self::Timeout { .. })
    }

    /// Check if this error was raised by a consumer rather than the endpoint
    pub fn is_processing_error(&self) -> bool {
        matches!(self, Self::Processing { .. })
    }
}

/// Convenience macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::error::VortexError::config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = VortexError::config("test message");
        assert!(matches!(err, VortexError::InvalidConfig { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_error_classification() {
        assert!(VortexError::RingBufferFull.is_recoverable());
        assert!(VortexError::Timeout { millis: 50 }.is_recoverable());
        assert!(!VortexError::NotStarted.is_recoverable());

        let failed = VortexError::processing("boom");
        assert!(failed.is_processing_error());
        assert!(!failed.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            VortexError::Timeout { millis: 50 }.to_string(),
            "Exchange timed out after 50 ms"
        );
        assert_eq!(VortexError::RingBufferFull.to_string(), "Ring buffer is full");
    }

    #[test]
    fn test_error_macros() {
        let err = config_error!("Invalid value: {}", 42);
        assert_eq!(err, VortexError::config("Invalid value: 42"));
    }
}
