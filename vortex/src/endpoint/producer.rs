//! Producer: the publish gateway in front of an endpoint's ring buffer.

use std::time::Duration;

use crossbeam::channel::{ self, RecvTimeoutError };
use tracing::trace;

use crate::config::WaitForTaskToComplete;
use crate::endpoint::endpoint::Endpoint;
use crate::endpoint::exchange::{ Exchange, Payload };
use crate::endpoint::reference::Rejected;
use crate::error::{ Result, VortexError };

/// Sends exchanges into an endpoint.
///
/// Waiting sends publish a private copy and block until a consumer completes
/// it, then copy the result onto the caller's exchange. Non-waiting sends
/// hand the caller's completion callbacks over to the published copy and
/// return immediately.
pub struct Producer<T: Payload> {
    endpoint: Endpoint<T>,
}

impl<T: Payload> Producer<T> {
    pub(crate) fn new(endpoint: Endpoint<T>) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &Endpoint<T> {
        &self.endpoint
    }

    /// Send with the endpoint's configured wait policy and timeout
    pub fn send(&self, exchange: &mut Exchange<T>) -> Result<()> {
        let config = self.endpoint.config();
        let wait = exchange.wait_for_task_to_complete().unwrap_or(config.wait_for_task_to_complete);
        self.send_with(exchange, wait, config.timeout_millis)
    }

    /// Send with an explicit wait policy and timeout (0 waits forever).
    ///
    /// Returns `Err` when the exchange could not be published or the wait
    /// timed out; the error is also stored on `exchange`. Processing failures
    /// are only stored on `exchange`.
    pub fn send_with(&self, exchange: &mut Exchange<T>, wait: WaitForTaskToComplete, timeout_millis: u64) -> Result<()> {
        let wait_required = match wait {
            WaitForTaskToComplete::Always => true,
            WaitForTaskToComplete::IfReplyExpected => exchange.is_reply_expected(),
            WaitForTaskToComplete::Never => false,
        };

        if wait_required {
            self.send_and_wait(exchange, timeout_millis)
        } else {
            self.send_async(exchange)
        }
    }

    fn send_and_wait(&self, exchange: &mut Exchange<T>, timeout_millis: u64) -> Result<()> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        let mut copy = exchange.copy();
        copy.add_on_completion(move |done: &Exchange<T>| {
            // Receiver is gone once the producer timed out
            let _ = reply_tx.try_send(done.copy());
        });

        if let Err(rejected) = self.publish(copy) {
            exchange.set_error(rejected.error.clone());
            return Err(rejected.error);
        }

        let reply = if timeout_millis == 0 {
            reply_rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
        } else {
            reply_rx.recv_timeout(Duration::from_millis(timeout_millis))
        };

        match reply {
            Ok(done) => {
                exchange.copy_results_from(&done);
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                exchange.mark_ignored();
                let error = VortexError::Timeout { millis: timeout_millis };
                exchange.set_error(error.clone());
                self.endpoint.record_timeout();
                trace!(exchange_id = exchange.id(), timeout_ms = timeout_millis, "Exchange timed out");
                Err(error)
            }
            Err(RecvTimeoutError::Disconnected) => {
                let error = VortexError::illegal_state("Exchange was dropped before completion");
                exchange.set_error(error.clone());
                Err(error)
            }
        }
    }

    fn send_async(&self, exchange: &mut Exchange<T>) -> Result<()> {
        let mut copy = exchange.copy();
        copy.restore_completions(exchange.handover_completions());

        if let Err(rejected) = self.publish(copy) {
            let (error, mut returned) = rejected.into_parts();
            exchange.restore_completions(returned.handover_completions());
            exchange.set_error(error.clone());
            return Err(error);
        }
        Ok(())
    }

    fn publish(&self, exchange: Exchange<T>) -> std::result::Result<(), Rejected<T>> {
        if self.endpoint.config().block_when_full {
            self.endpoint.publish(exchange)
        } else {
            self.endpoint.try_publish(exchange)
        }
    }
}

impl<T: Payload> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
        }
    }
}
