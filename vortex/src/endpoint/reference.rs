//! Shared ring buffer reference and its reconfiguration state machine.
//!
//! One `DisruptorReference` exists per canonical endpoint URI. It owns the
//! live ring buffer, the worker pool running the event processors, and the
//! temporary buffer that carries parked exchanges across a ring swap.
//!
//! ## States
//!
//! ```text
//! Stopped ──add_endpoint──▶ Running ──reconfigure──▶ Reconfiguring ──▶ Running
//!    ▲                                                                    │
//!    └──────────────────────── remove last endpoint ─────────────────────┘
//! ```
//!
//! `reconfigure`, `add_endpoint` and `remove_endpoint` are serialized by the
//! state mutex. Producers never take that mutex: they read the holder, spin
//! (bounded) while it is `Reconfiguring`, and fail fast when it is `Stopped`.

use std::fmt;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::{ Duration, Instant };

use parking_lot::{ Mutex, RwLock };
use tracing::{ debug, warn };

use crate::config::ComponentConfig;
use crate::constants::CLAIM_SPIN_TRIES;
use crate::disruptor::{ EventHandler, EventProcessor, ProducerType, RingBuffer, WaitStrategyType };
use crate::endpoint::buffer::TemporaryBuffer;
use crate::endpoint::consumer::ConsumerGroup;
use crate::endpoint::event::ExchangeEvent;
use crate::endpoint::exchange::{ Exchange, Payload };
use crate::endpoint::handler::{ Lifecycle, LifecycleAware, ParkingHandler };
use crate::endpoint::pool::WorkerPool;
use crate::error::{ Result, VortexError };
use crate::insights;
use crate::metrics::Metrics;

/// Something registered with a reference that may contribute consumers
pub trait HandlerSource<T>: Send + Sync {
    fn endpoint_id(&self) -> u64;

    /// Consumer groups currently started on this source
    fn consumer_groups(&self) -> Vec<Arc<ConsumerGroup<T>>>;
}

/// A running ring buffer and the consumer count its exchanges must reach
pub struct ActiveRing<T> {
    pub ring: Arc<RingBuffer<ExchangeEvent<T>>>,
    pub expected_consumers: usize,
}

pub enum HolderState<R> {
    Stopped,
    Reconfiguring,
    Running(Arc<R>),
}

impl<R> Clone for HolderState<R> {
    fn clone(&self) -> Self {
        match self {
            Self::Stopped => Self::Stopped,
            Self::Reconfiguring => Self::Reconfiguring,
            Self::Running(r) => Self::Running(r.clone()),
        }
    }
}

impl<R> fmt::Debug for HolderState<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("Stopped"),
            Self::Reconfiguring => f.write_str("Reconfiguring"),
            Self::Running(_) => f.write_str("Running"),
        }
    }
}

/// Swappable handle to the live ring buffer
pub struct ReferenceHolder<R> {
    state: RwLock<HolderState<R>>,
}

impl<R> ReferenceHolder<R> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HolderState::Stopped),
        }
    }

    pub fn load(&self) -> HolderState<R> {
        self.state.read().clone()
    }

    pub fn store(&self, state: HolderState<R>) {
        *self.state.write() = state;
    }
}

impl<R> Default for ReferenceHolder<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// An exchange the ring did not accept, handed back with the reason
pub struct Rejected<T> {
    pub error: VortexError,
    pub exchange: Exchange<T>,
}

impl<T> Rejected<T> {
    pub fn into_parts(self) -> (VortexError, Exchange<T>) {
        (self.error, self.exchange)
    }
}

impl<T> fmt::Debug for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .field("exchange_id", &self.exchange.id())
            .finish()
    }
}

impl<T> fmt::Display for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exchange {} rejected: {}", self.exchange.id(), self.error)
    }
}

enum ActiveHandlers<T> {
    None,
    Parking(Arc<ParkingHandler<T>>),
    Consumers,
}

struct ReferenceState<T> {
    endpoints: Vec<Arc<dyn HandlerSource<T>>>,
    ring: Option<Arc<RingBuffer<ExchangeEvent<T>>>>,
    handlers: ActiveHandlers<T>,
    lifecycles: Vec<Arc<Lifecycle>>,
    pool: WorkerPool,
}

impl<T> ReferenceState<T> {
    fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            ring: None,
            handlers: ActiveHandlers::None,
            lifecycles: Vec::new(),
            pool: WorkerPool::new("vortex-worker"),
        }
    }
}

pub struct DisruptorReference<T> {
    uri: String,
    size: AtomicUsize,
    producer_type: ProducerType,
    wait_strategy: WaitStrategyType,
    lifecycle_timeout: Duration,
    reconfigure_wait: Duration,
    holder: ReferenceHolder<ActiveRing<T>>,
    temporary_buffer: Arc<TemporaryBuffer<T>>,
    metrics: Arc<Metrics>,
    state: Mutex<ReferenceState<T>>,
}

impl<T: Payload> DisruptorReference<T> {
    /// `size` must already be a power of two
    pub fn new(
        uri: impl Into<String>,
        size: usize,
        producer_type: ProducerType,
        wait_strategy: WaitStrategyType,
        config: &ComponentConfig
    ) -> Self {
        Self {
            uri: uri.into(),
            size: AtomicUsize::new(size),
            producer_type,
            wait_strategy,
            lifecycle_timeout: config.lifecycle_timeout(),
            reconfigure_wait: config.reconfigure_wait(),
            holder: ReferenceHolder::new(),
            temporary_buffer: Arc::new(TemporaryBuffer::new(size)),
            metrics: Arc::new(Metrics::new()),
            state: Mutex::new(ReferenceState::new()),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Configured size; a running ring may still be smaller until the next reconfigure
    pub fn buffer_size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Grow the configured size to at least `size`. Applies at the next start.
    pub fn ensure_size(&self, size: usize) {
        let previous = self.size.fetch_max(size, Ordering::AcqRel);
        if size > previous {
            self.temporary_buffer.set_capacity(size);
            debug!(uri = %self.uri, from = previous, to = size, "Grew ring buffer size");
        }
    }

    pub fn holder_state(&self) -> HolderState<ActiveRing<T>> {
        self.holder.load()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.holder.load(), HolderState::Running(_))
    }

    pub fn endpoint_count(&self) -> usize {
        self.state.lock().endpoints.len()
    }

    /// Event handlers on the live ring, including the parking handler
    pub fn handler_count(&self) -> usize {
        self.state.lock().lifecycles.len()
    }

    pub fn pool_size(&self) -> usize {
        self.state.lock().pool.size()
    }

    /// Register an endpoint; the first one starts the ring
    pub fn add_endpoint(&self, endpoint: Arc<dyn HandlerSource<T>>) -> Result<()> {
        let mut state = self.state.lock();
        if state.endpoints.iter().any(|e| e.endpoint_id() == endpoint.endpoint_id()) {
            return Ok(());
        }
        let endpoint_id = endpoint.endpoint_id();
        state.endpoints.push(endpoint);
        debug!(uri = %self.uri, endpoint_id, endpoints = state.endpoints.len(), "Added endpoint");

        if state.ring.is_none() {
            if let Err(error) = self.start_locked(&mut state) {
                state.endpoints.retain(|e| e.endpoint_id() != endpoint_id);
                return Err(error);
            }
        }
        Ok(())
    }

    /// Unregister an endpoint. Returns how many endpoints remain; at zero the
    /// ring and worker pool have been shut down.
    pub fn remove_endpoint(&self, endpoint_id: u64) -> Result<usize> {
        let mut state = self.state.lock();
        let Some(position) = state.endpoints.iter().position(|e| e.endpoint_id() == endpoint_id) else {
            return Ok(state.endpoints.len());
        };

        if state.endpoints.len() == 1 {
            self.shutdown_locked(&mut state, false);
            state.pool.shutdown();
            state.endpoints.clear();
            debug!(uri = %self.uri, endpoint_id, "Removed last endpoint, reference stopped");
            return Ok(0);
        }

        let removed = state.endpoints.remove(position);
        debug!(uri = %self.uri, endpoint_id, endpoints = state.endpoints.len(), "Removed endpoint");
        if !removed.consumer_groups().is_empty() {
            self.reconfigure_locked(&mut state)?;
        }
        Ok(state.endpoints.len())
    }

    /// Swap in a new ring with the current consumer topology
    pub fn reconfigure(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.endpoints.is_empty() {
            return Err(VortexError::NotStarted);
        }
        self.reconfigure_locked(&mut state)
    }

    fn reconfigure_locked(&self, state: &mut ReferenceState<T>) -> Result<()> {
        let span = insights::reconfigure_span(&self.uri);
        let _guard = span.enter();

        self.shutdown_locked(state, true);
        let result = self.start_locked(state);
        if result.is_err() {
            self.holder.store(HolderState::Stopped);
        }
        self.metrics.record_reconfiguration();
        result
    }

    fn start_locked(&self, state: &mut ReferenceState<T>) -> Result<()> {
        let size = self.buffer_size();
        let ring = Arc::new(RingBuffer::new(size, self.producer_type, self.wait_strategy.create())?);

        let groups: Vec<Arc<ConsumerGroup<T>>> = state.endpoints
            .iter()
            .flat_map(|endpoint| endpoint.consumer_groups())
            .collect();
        let expected_consumers = groups.len();

        let mut handlers: Vec<Arc<dyn EventHandler<ExchangeEvent<T>>>> = Vec::new();
        let mut lifecycles = Vec::new();
        if groups.is_empty() {
            let parking = Arc::new(ParkingHandler::new(self.temporary_buffer.clone(), self.metrics.clone()));
            lifecycles.push(parking.lifecycle().clone());
            handlers.push(parking.clone());
            state.handlers = ActiveHandlers::Parking(parking);
        } else {
            for group in &groups {
                for handler in group.create_event_handlers() {
                    lifecycles.push(handler.lifecycle().clone());
                    handlers.push(handler);
                }
            }
            state.handlers = ActiveHandlers::Consumers;
        }

        let processors: Vec<Arc<EventProcessor<ExchangeEvent<T>>>> = handlers
            .into_iter()
            .map(|handler| Arc::new(EventProcessor::new(ring.clone(), handler)))
            .collect();

        // Size the pool before any run loop is submitted
        state.pool.resize(processors.len())?;
        for lifecycle in &lifecycles {
            lifecycle.mark_starting();
        }
        for processor in processors {
            state.pool.execute(move || processor.run())?;
        }
        for (index, lifecycle) in lifecycles.iter().enumerate() {
            if !lifecycle.await_started(Some(self.lifecycle_timeout)) {
                warn!(
                    uri = %self.uri,
                    handler = index,
                    timeout_ms = self.lifecycle_timeout.as_millis() as u64,
                    "Event handler did not confirm start"
                );
            }
        }

        let buffered = self.temporary_buffer.drain();
        if !buffered.is_empty() {
            let count = buffered.len();
            for exchange in buffered {
                let mut slot = ring.claim()?;
                slot.set_exchange(exchange, expected_consumers);
            }
            self.metrics.record_replayed(count as u64);
            debug!(uri = %self.uri, count, "Replayed parked exchanges");
        }

        state.ring = Some(ring.clone());
        state.lifecycles = lifecycles;
        self.holder.store(
            HolderState::Running(
                Arc::new(ActiveRing {
                    ring,
                    expected_consumers,
                })
            )
        );
        debug!(uri = %self.uri, size, consumers = expected_consumers, "Ring buffer started");
        Ok(())
    }

    /// Publish, waiting for capacity when the ring is full
    pub fn publish(&self, exchange: Exchange<T>) -> std::result::Result<(), Rejected<T>> {
        self.publish_with(exchange, true)
    }

    /// Publish, failing with `RingBufferFull` instead of waiting
    pub fn try_publish(&self, exchange: Exchange<T>) -> std::result::Result<(), Rejected<T>> {
        self.publish_with(exchange, false)
    }

    fn publish_with(&self, exchange: Exchange<T>, blocking: bool) -> std::result::Result<(), Rejected<T>> {
        loop {
            let active = match self.current_ring() {
                Ok(active) => active,
                Err(error) => {
                    return Err(Rejected { error, exchange });
                }
            };
            // Gate closed: the ring is being swapped out
            let Some(_permit) = active.ring.try_enter_publish() else {
                continue;
            };

            let claimed = if blocking { active.ring.claim() } else { active.ring.try_claim() };
            match claimed {
                Ok(mut slot) => {
                    slot.set_exchange(exchange, active.expected_consumers);
                    self.metrics.record_publish();
                    return Ok(());
                }
                Err(VortexError::Halted) => {
                    continue;
                }
                Err(error) => {
                    if error == VortexError::RingBufferFull {
                        self.metrics.record_backpressure();
                    }
                    return Err(Rejected { error, exchange });
                }
            }
        }
    }

    /// The live ring, waiting out a reconfiguration for at most `reconfigure_wait`
    fn current_ring(&self) -> Result<Arc<ActiveRing<T>>> {
        let mut deadline = None;
        let mut spins = 0u32;
        loop {
            match self.holder.load() {
                HolderState::Running(active) => {
                    return Ok(active);
                }
                HolderState::Stopped => {
                    return Err(VortexError::NotStarted);
                }
                HolderState::Reconfiguring => {
                    let deadline = *deadline.get_or_insert_with(|| Instant::now() + self.reconfigure_wait);
                    if Instant::now() >= deadline {
                        warn!(uri = %self.uri, "Gave up waiting for reconfiguration");
                        return Err(VortexError::NotStarted);
                    }
                    if spins < CLAIM_SPIN_TRIES {
                        std::hint::spin_loop();
                        spins += 1;
                    } else {
                        thread::park_timeout(Duration::from_micros(100));
                    }
                }
            }
        }
    }

    /// Exchanges published but not yet consumed, including parked ones
    pub fn pending_count(&self) -> usize {
        let in_ring = match self.holder.load() {
            HolderState::Running(active) => active.ring.pending(),
            _ => 0,
        };
        in_ring + self.temporary_buffer.len()
    }

    pub fn remaining_capacity(&self) -> Result<usize> {
        Ok(self.current_ring()?.ring.remaining_capacity())
    }

    /// Size of the live ring
    pub fn ring_size(&self) -> Result<usize> {
        Ok(self.current_ring()?.ring.size())
    }
}

impl<T> DisruptorReference<T> {
    fn shutdown_locked(&self, state: &mut ReferenceState<T>, pending: bool) {
        self.holder.store(if pending { HolderState::Reconfiguring } else { HolderState::Stopped });

        let Some(ring) = state.ring.take() else {
            return;
        };

        // Producers blocked on a full ring leave the gate and retry on the next one
        ring.close_publishing();
        if !ring.await_publishers(self.lifecycle_timeout) {
            warn!(uri = %self.uri, "Timed out waiting for in-flight publishers");
        }

        // The parked backlog can no longer grow past the ring size, so it
        // fits the temporary buffer.
        if let ActiveHandlers::Parking(parking) = &state.handlers {
            parking.release();
        }
        if !ring.await_drained(self.lifecycle_timeout) {
            warn!(uri = %self.uri, pending = ring.pending(), "Timed out draining ring buffer, drain continues after halt");
        }

        for lifecycle in &state.lifecycles {
            lifecycle.mark_stopping();
        }
        ring.halt();
        for (index, lifecycle) in state.lifecycles.iter().enumerate() {
            if !lifecycle.await_stopped(Some(self.lifecycle_timeout)) {
                warn!(
                    uri = %self.uri,
                    handler = index,
                    timeout_ms = self.lifecycle_timeout.as_millis() as u64,
                    "Event handler did not confirm shutdown"
                );
            }
        }

        state.handlers = ActiveHandlers::None;
        state.lifecycles.clear();
        debug!(uri = %self.uri, "Ring buffer stopped");
    }
}

impl<T> Drop for DisruptorReference<T> {
    fn drop(&mut self) {
        let mut state = std::mem::replace(self.state.get_mut(), ReferenceState::new());
        self.shutdown_locked(&mut state, false);
    }
}

impl<T> fmt::Debug for DisruptorReference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisruptorReference")
            .field("uri", &self.uri)
            .field("size", &self.size.load(Ordering::Relaxed))
            .field("producer_type", &self.producer_type)
            .field("wait_strategy", &self.wait_strategy)
            .field("holder", &*self.holder.state.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::consumer::Processor;
    use std::sync::atomic::AtomicU64;

    struct Source {
        id: u64,
        groups: Mutex<Vec<Arc<ConsumerGroup<u32>>>>,
    }

    impl HandlerSource<u32> for Source {
        fn endpoint_id(&self) -> u64 {
            self.id
        }

        fn consumer_groups(&self) -> Vec<Arc<ConsumerGroup<u32>>> {
            self.groups.lock().clone()
        }
    }

    static NEXT_ID: AtomicU64 = AtomicU64::new(1);

    fn source() -> Arc<Source> {
        Arc::new(Source {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            groups: Mutex::new(Vec::new()),
        })
    }

    fn reference(size: usize) -> DisruptorReference<u32> {
        reference_with_timeout(size, 2_000)
    }

    fn reference_with_timeout(size: usize, lifecycle_timeout_millis: u64) -> DisruptorReference<u32> {
        let config = ComponentConfig {
            lifecycle_timeout_millis,
            ..ComponentConfig::default()
        };
        DisruptorReference::new("disruptor:unit", size, ProducerType::Multi, WaitStrategyType::Yielding, &config)
    }

    fn collecting_group(seen: Arc<Mutex<Vec<u32>>>) -> Arc<ConsumerGroup<u32>> {
        slow_collecting_group(seen, Duration::ZERO)
    }

    fn slow_collecting_group(seen: Arc<Mutex<Vec<u32>>>, delay: Duration) -> Arc<ConsumerGroup<u32>> {
        let processor: Arc<dyn Processor<u32>> = Arc::new(move |ex: &mut Exchange<u32>| -> Result<()> {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            seen.lock().push(*ex.body());
            Ok(())
        });
        Arc::new(ConsumerGroup::new(1, 1, processor, Arc::new(Metrics::new())))
    }

    fn wait_for_len(seen: &Mutex<Vec<u32>>, len: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while seen.lock().len() < len && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_not_started_before_first_endpoint() {
        let reference = reference(8);
        let rejected = reference.publish(Exchange::new(1)).unwrap_err();
        assert_eq!(rejected.error, VortexError::NotStarted);
        assert_eq!(*rejected.exchange.body(), 1);
        assert!(reference.reconfigure().is_err());
        assert!(reference.remaining_capacity().is_err());
    }

    #[test]
    fn test_first_endpoint_starts_parking_handler() {
        let reference = reference(8);
        reference.add_endpoint(source()).unwrap();
        assert!(reference.is_running());
        assert_eq!(reference.handler_count(), 1);
        assert_eq!(reference.pool_size(), 1);

        reference.publish(Exchange::new(1)).unwrap();
        assert_eq!(reference.pending_count(), 1);
        assert_eq!(reference.remaining_capacity().unwrap(), 7);
    }

    #[test]
    fn test_parked_exchanges_replayed_to_consumer() {
        let reference = reference(8);
        let endpoint = source();
        reference.add_endpoint(endpoint.clone()).unwrap();
        for i in 0..3 {
            reference.publish(Exchange::new(i)).unwrap();
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        endpoint.groups.lock().push(collecting_group(seen.clone()));
        reference.reconfigure().unwrap();
        reference.publish(Exchange::new(3)).unwrap();

        wait_for_len(&seen, 4);
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3]);
        assert_eq!(reference.metrics().snapshot().replayed, 3);
        assert_eq!(reference.metrics().snapshot().reconfigurations, 1);
    }

    #[test]
    fn test_drain_timeout_keeps_pending_exchanges() {
        let reference = reference_with_timeout(32, 50);
        let endpoint = source();
        let seen = Arc::new(Mutex::new(Vec::new()));
        endpoint.groups.lock().push(slow_collecting_group(seen.clone(), Duration::from_millis(10)));
        reference.add_endpoint(endpoint.clone()).unwrap();

        for i in 0..15 {
            reference.publish(Exchange::new(i)).unwrap();
        }
        // Drain takes ~150ms, well past the 50ms lifecycle timeout
        reference.reconfigure().unwrap();
        for i in 15..20 {
            reference.publish(Exchange::new(i)).unwrap();
        }

        wait_for_len(&seen, 20);
        assert_eq!(*seen.lock(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_last_endpoint_removal_stops() {
        let reference = reference(8);
        let a = source();
        let b = source();
        reference.add_endpoint(a.clone()).unwrap();
        reference.add_endpoint(b.clone()).unwrap();
        assert_eq!(reference.endpoint_count(), 2);

        assert_eq!(reference.remove_endpoint(a.id).unwrap(), 1);
        assert!(reference.is_running());
        assert_eq!(reference.remove_endpoint(b.id).unwrap(), 0);
        assert!(!reference.is_running());
        assert_eq!(reference.pool_size(), 0);

        let rejected = reference.try_publish(Exchange::new(9)).unwrap_err();
        assert_eq!(rejected.error, VortexError::NotStarted);
    }

    #[test]
    fn test_ensure_size_applies_on_reconfigure() {
        let reference = reference(4);
        reference.add_endpoint(source()).unwrap();
        reference.ensure_size(2);
        assert_eq!(reference.buffer_size(), 4);

        reference.ensure_size(16);
        assert_eq!(reference.buffer_size(), 16);
        assert_eq!(reference.ring_size().unwrap(), 4);
        reference.reconfigure().unwrap();
        assert_eq!(reference.ring_size().unwrap(), 16);
    }
}
