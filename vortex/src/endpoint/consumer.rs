//! Consumer groups: a processor fanned out over `concurrent_consumers`
//! partitioned event handlers.

use std::any::Any;
use std::panic::{ self, AssertUnwindSafe };
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{ trace, warn };

use crate::disruptor::{ EventHandler, Sequence };
use crate::endpoint::event::ExchangeEvent;
use crate::endpoint::exchange::{ DispatchInfo, Exchange, Payload };
use crate::endpoint::handler::{ Lifecycle, LifecycleAware };
use crate::error::{ Result, VortexError };
use crate::metrics::Metrics;

/// User code run for every exchange a consumer receives
pub trait Processor<T>: Send + Sync {
    fn process(&self, exchange: &mut Exchange<T>) -> Result<()>;
}

impl<T, F> Processor<T> for F where F: Fn(&mut Exchange<T>) -> Result<()> + Send + Sync {
    fn process(&self, exchange: &mut Exchange<T>) -> Result<()> {
        self(exchange)
    }
}

/// Receives processing failures. Never sees ring buffer errors.
pub trait ExceptionHandler<T>: Send + Sync {
    fn handle(&self, exchange: &Exchange<T>, error: &VortexError);
}

pub struct LoggingExceptionHandler;

impl<T> ExceptionHandler<T> for LoggingExceptionHandler {
    fn handle(&self, exchange: &Exchange<T>, error: &VortexError) {
        warn!(exchange_id = exchange.id(), error = %error, "Error processing exchange");
    }
}

/// One started consumer: its processor and the number of handlers that
/// partition its share of the ring.
pub struct ConsumerGroup<T> {
    id: usize,
    concurrent_consumers: usize,
    processor: Arc<dyn Processor<T>>,
    exception_handler: RwLock<Arc<dyn ExceptionHandler<T>>>,
    metrics: Arc<Metrics>,
    started: AtomicBool,
}

impl<T: Payload> ConsumerGroup<T> {
    pub fn new(
        id: usize,
        concurrent_consumers: usize,
        processor: Arc<dyn Processor<T>>,
        metrics: Arc<Metrics>
    ) -> Self {
        Self {
            id,
            concurrent_consumers: concurrent_consumers.max(1),
            processor,
            exception_handler: RwLock::new(Arc::new(LoggingExceptionHandler)),
            metrics,
            started: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Whether the group is registered with a started endpoint
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Returns `true` if the group was not already started.
    pub(crate) fn mark_started(&self) -> bool {
        !self.started.swap(true, Ordering::AcqRel)
    }

    /// Returns `true` if the group was started.
    pub(crate) fn mark_stopped(&self) -> bool {
        self.started.swap(false, Ordering::AcqRel)
    }

    pub fn concurrent_consumers(&self) -> usize {
        self.concurrent_consumers
    }

    pub fn set_exception_handler(&self, handler: Arc<dyn ExceptionHandler<T>>) {
        *self.exception_handler.write() = handler;
    }

    /// Fresh handlers with ordinals `0..concurrent_consumers`
    pub fn create_event_handlers(self: &Arc<Self>) -> Vec<Arc<ConsumerEventHandler<T>>> {
        (0..self.concurrent_consumers)
            .map(|ordinal| {
                Arc::new(ConsumerEventHandler {
                    ordinal,
                    lifecycle: Arc::new(Lifecycle::new()),
                    group: self.clone(),
                })
            })
            .collect()
    }

    fn handle_failure(&self, exchange: &Exchange<T>, error: &VortexError) {
        let handler = self.exception_handler.read().clone();
        handler.handle(exchange, error);
    }
}

/// Handler for one ordinal of a consumer group.
///
/// Processes sequence `s` iff `s % concurrent_consumers == ordinal`.
pub struct ConsumerEventHandler<T> {
    ordinal: usize,
    lifecycle: Arc<Lifecycle>,
    group: Arc<ConsumerGroup<T>>,
}

impl<T: Payload> ConsumerEventHandler<T> {
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn owns(&self, sequence: Sequence) -> bool {
        sequence % (self.group.concurrent_consumers as u64) == (self.ordinal as u64)
    }

    fn run_processor(&self, exchange: &mut Exchange<T>) {
        let processor = &self.group.processor;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| processor.process(exchange)));
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(error),
            Err(payload) => Some(VortexError::processing(panic_message(payload))),
        };
        if let Some(error) = failure {
            exchange.set_error(error);
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("Processor panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("Processor panicked: {message}")
    } else {
        String::from("Processor panicked")
    }
}

impl<T: Payload> LifecycleAware for ConsumerEventHandler<T> {
    fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }
}

impl<T: Payload> EventHandler<ExchangeEvent<T>> for ConsumerEventHandler<T> {
    fn on_event(&self, event: &ExchangeEvent<T>, sequence: Sequence, _end_of_batch: bool) {
        if !self.owns(sequence) {
            return;
        }
        let Some(sync) = event.synchronized() else {
            return;
        };
        if sync.is_ignored() {
            trace!(sequence, consumer = self.group.id, "Ignoring exchange");
            self.group.metrics.record_ignored();
            return;
        }

        let mut exchange = sync.exchange_copy();
        exchange.set_dispatch(DispatchInfo {
            sequence,
            ordinal: self.ordinal,
            consumer_id: self.group.id,
        });

        self.run_processor(&mut exchange);
        if let Some(error) = exchange.error() {
            self.group.handle_failure(&exchange, error);
        }
        self.group.metrics.record_processed();
        sync.consumed(&exchange);
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
    use parking_lot::Mutex;
    use proptest::prelude::*;

    fn group<F>(n: usize, f: F) -> Arc<ConsumerGroup<i32>>
        where F: Fn(&mut Exchange<i32>) -> Result<()> + Send + Sync + 'static
    {
        Arc::new(ConsumerGroup::new(1, n, Arc::new(f), Arc::new(Metrics::new())))
    }

    fn event(body: i32) -> ExchangeEvent<i32> {
        let mut event = ExchangeEvent::default();
        event.set_exchange(Exchange::new(body), 1);
        event
    }

    #[test]
    fn test_handlers_get_ordinals() {
        let handlers = group(3, |_| Ok(())).create_event_handlers();
        let ordinals: Vec<usize> = handlers.iter().map(|h| h.ordinal()).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
        assert!(handlers[1].owns(4));
        assert!(!handlers[0].owns(4));
    }

    #[test]
    fn test_result_copied_to_original() {
        let handler = group(1, |ex| {
            let doubled = *ex.body() * 2;
            ex.set_body(doubled);
            Ok(())
        }).create_event_handlers()
            .remove(0);

        let result = Arc::new(Mutex::new(None));
        let r = result.clone();
        let mut exchange = Exchange::new(21);
        exchange.add_on_completion(move |ex| {
            *r.lock() = Some(*ex.body());
        });
        let mut slot = ExchangeEvent::default();
        slot.set_exchange(exchange, 1);

        handler.on_event(&slot, 0, true);
        assert_eq!(*result.lock(), Some(42));
    }

    #[test]
    fn test_panic_becomes_processing_error() {
        struct Recording(Mutex<Vec<VortexError>>);
        impl ExceptionHandler<i32> for Recording {
            fn handle(&self, _exchange: &Exchange<i32>, error: &VortexError) {
                self.0.lock().push(error.clone());
            }
        }

        let g = group(1, |_| panic!("boom"));
        let recording = Arc::new(Recording(Mutex::new(Vec::new())));
        g.set_exception_handler(recording.clone());
        let handler = g.create_event_handlers().remove(0);

        handler.on_event(&event(1), 0, true);
        let errors = recording.0.lock();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0], VortexError::processing("Processor panicked: boom"));
    }

    #[test]
    fn test_ignored_exchange_skipped() {
        let calls = Arc::new(Mutex::new(0));
        let c = calls.clone();
        let handler = group(1, move |_| {
            *c.lock() += 1;
            Ok(())
        }).create_event_handlers()
            .remove(0);

        let slot = event(1);
        slot.synchronized().unwrap().exchange_copy().mark_ignored();
        handler.on_event(&slot, 0, true);
        assert_eq!(*calls.lock(), 0);
    }

    proptest! {
        #[test]
        fn prop_exactly_one_owner(n in 1usize..16, sequence in 0u64..10_000) {
            let handlers = group(n, |_| Ok(())).create_event_handlers();
            let owners = handlers.iter().filter(|h| h.owns(sequence)).count();
            prop_assert_eq!(owners, 1);
            prop_assert!(handlers[(sequence % n as u64) as usize].owns(sequence));
        }
    }
}
