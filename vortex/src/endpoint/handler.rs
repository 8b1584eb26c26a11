//! Handler lifecycle tracking and the parking handler.

use std::sync::Arc;
use std::time::{ Duration, Instant };

use parking_lot::{ Condvar, Mutex };
use tracing::{ error, trace };

use crate::disruptor::{ EventHandler, Sequence };
use crate::endpoint::buffer::TemporaryBuffer;
use crate::endpoint::event::ExchangeEvent;
use crate::endpoint::exchange::Payload;
use crate::error::VortexError;
use crate::metrics::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Start/stop confirmation for one event handler.
///
/// The processor thread reports `on_started`/`on_stopped`; the reference
/// manager waits on them with a bound before swapping ring buffers.
pub struct Lifecycle {
    state: Mutex<HandlerState>,
    changed: Condvar,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HandlerState::Created),
            changed: Condvar::new(),
        }
    }

    pub fn state(&self) -> HandlerState {
        *self.state.lock()
    }

    pub fn mark_starting(&self) {
        self.set(HandlerState::Starting);
    }

    pub fn on_started(&self) {
        self.set(HandlerState::Running);
    }

    pub fn mark_stopping(&self) {
        let mut state = self.state.lock();
        if matches!(*state, HandlerState::Starting | HandlerState::Running) {
            *state = HandlerState::Stopping;
        }
    }

    pub fn on_stopped(&self) {
        self.set(HandlerState::Stopped);
    }

    fn set(&self, new: HandlerState) {
        *self.state.lock() = new;
        self.changed.notify_all();
    }

    /// Wait until the handler runs; `None` waits forever. Returns false on timeout.
    pub fn await_started(&self, timeout: Option<Duration>) -> bool {
        self.await_state(timeout, |s| s == HandlerState::Running)
    }

    /// Wait until the handler has shut down; `None` waits forever. Returns false on timeout.
    pub fn await_stopped(&self, timeout: Option<Duration>) -> bool {
        self.await_state(timeout, |s| s == HandlerState::Stopped)
    }

    fn await_state(&self, timeout: Option<Duration>, reached: impl Fn(HandlerState) -> bool) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        while !reached(*state) {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut state, deadline).timed_out() {
                        return reached(*state);
                    }
                }
                None => self.changed.wait(&mut state),
            }
        }
        true
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Handlers whose start and stop the reference manager waits on
pub trait LifecycleAware {
    fn lifecycle(&self) -> &Arc<Lifecycle>;

    fn await_started(&self, timeout: Option<Duration>) -> bool {
        self.lifecycle().await_started(timeout)
    }

    fn await_stopped(&self, timeout: Option<Duration>) -> bool {
        self.lifecycle().await_stopped(timeout)
    }
}

/// Stand-in consumer installed while no real consumer is attached.
///
/// Blocks on the first event until released, which leaves published
/// exchanges in the ring. Once released it moves every exchange it sees into
/// the temporary buffer for replay into the next ring.
pub struct ParkingHandler<T> {
    lifecycle: Arc<Lifecycle>,
    released: Mutex<bool>,
    release_signal: Condvar,
    buffer: Arc<TemporaryBuffer<T>>,
    metrics: Arc<Metrics>,
}

impl<T> ParkingHandler<T> {
    pub fn new(buffer: Arc<TemporaryBuffer<T>>, metrics: Arc<Metrics>) -> Self {
        Self {
            lifecycle: Arc::new(Lifecycle::new()),
            released: Mutex::new(false),
            release_signal: Condvar::new(),
            buffer,
            metrics,
        }
    }

    pub fn release(&self) {
        *self.released.lock() = true;
        self.release_signal.notify_all();
    }

    fn await_release(&self) {
        let mut released = self.released.lock();
        while !*released {
            self.release_signal.wait(&mut released);
        }
    }
}

impl<T: Payload> LifecycleAware for ParkingHandler<T> {
    fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }
}

impl<T: Payload> EventHandler<ExchangeEvent<T>> for ParkingHandler<T> {
    fn on_event(&self, event: &ExchangeEvent<T>, sequence: Sequence, _end_of_batch: bool) {
        self.await_release();

        let Some(exchange) = event.synchronized().and_then(|sync| sync.cancel_and_take()) else {
            return;
        };
        if exchange.is_ignored() {
            trace!(exchange_id = exchange.id(), sequence, "Ignoring parked exchange");
            self.metrics.record_ignored();
            return;
        }
        if let Err(mut rejected) = self.buffer.offer(exchange) {
            error!(
                exchange_id = rejected.id(),
                capacity = self.buffer.capacity(),
                "Temporary buffer full, failing parked exchange"
            );
            rejected.set_error(VortexError::RingBufferFull);
            rejected.done();
        }
    }

    fn on_start(&self) {
        self.lifecycle.on_started();
    }

    fn on_shutdown(&self) {
        self.lifecycle.on_stopped();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::exchange::Exchange;
    use std::thread;

    #[test]
    fn test_lifecycle_latches() {
        let lifecycle = Arc::new(Lifecycle::new());
        assert!(!lifecycle.await_started(Some(Duration::from_millis(5))));

        let l = lifecycle.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            l.on_started();
        });
        assert!(lifecycle.await_started(Some(Duration::from_secs(5))));
        handle.join().unwrap();

        lifecycle.mark_stopping();
        assert_eq!(lifecycle.state(), HandlerState::Stopping);
        lifecycle.on_stopped();
        assert!(lifecycle.await_stopped(None));
        assert!(!lifecycle.await_started(Some(Duration::from_millis(1))));
    }

    #[test]
    fn test_parking_handler_buffers_after_release() {
        let buffer = Arc::new(TemporaryBuffer::new(4));
        let metrics = Arc::new(Metrics::new());
        let handler = Arc::new(ParkingHandler::new(buffer.clone(), metrics.clone()));

        let mut event = ExchangeEvent::default();
        event.set_exchange(Exchange::new(42), 0);

        let mut ignored = ExchangeEvent::default();
        let skipped = Exchange::new(7);
        skipped.mark_ignored();
        ignored.set_exchange(skipped, 0);

        let h = handler.clone();
        let worker = thread::spawn(move || {
            h.on_event(&event, 0, false);
            h.on_event(&ignored, 1, true);
        });

        thread::sleep(Duration::from_millis(10));
        assert!(buffer.is_empty());
        handler.release();
        worker.join().unwrap();

        let parked: Vec<i32> = buffer.drain().into_iter().map(Exchange::into_body).collect();
        assert_eq!(parked, vec![42]);
        assert_eq!(metrics.snapshot().ignored, 1);
    }

    #[test]
    fn test_parking_overflow_fails_exchange() {
        let buffer = Arc::new(TemporaryBuffer::new(0));
        let handler = ParkingHandler::new(buffer, Arc::new(Metrics::new()));
        handler.release();

        let failed = Arc::new(Mutex::new(None));
        let f = failed.clone();
        let mut exchange = Exchange::new(1);
        exchange.add_on_completion(move |ex| {
            *f.lock() = ex.error().cloned();
        });

        let mut event = ExchangeEvent::default();
        event.set_exchange(exchange, 0);
        handler.on_event(&event, 0, true);

        assert_eq!(*failed.lock(), Some(VortexError::RingBufferFull));
    }
}
