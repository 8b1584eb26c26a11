//! Insights - logging setup for vortex.
//!
//! The crate logs through `tracing`. Lifecycle transitions are `debug`,
//! per-exchange decisions are `trace`, reconfiguration anomalies are `warn`
//! and lost exchanges are `error`.
//!
//! # Usage
//!
//! ```rust,ignore
//! vortex::insights::init_logging(tracing::Level::DEBUG);
//! ```

pub use tracing::Level;

/// Install a console subscriber at `level`.
///
/// Safe to call more than once; only the first call installs a subscriber.
/// Returns false if a global subscriber was already set.
pub fn init_logging(level: Level) -> bool {
    tracing_subscriber::fmt().with_max_level(level).with_thread_names(true).try_init().is_ok()
}

/// Span covering one reconfiguration of a shared ring buffer
#[inline]
pub fn reconfigure_span(uri: &str) -> tracing::Span {
    tracing::debug_span!("reconfigure", uri = %uri)
}
