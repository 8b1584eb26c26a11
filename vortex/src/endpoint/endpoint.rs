//! Endpoint and consumer handles over a shared ring buffer reference.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{ AtomicBool, AtomicU64, AtomicUsize, Ordering };
use std::sync::{ Arc, Weak };

use parking_lot::Mutex;
use tracing::debug;

use crate::config::EndpointConfig;
use crate::endpoint::consumer::{ ConsumerGroup, ExceptionHandler, Processor };
use crate::endpoint::exchange::{ Exchange, Payload };
use crate::endpoint::producer::Producer;
use crate::endpoint::reference::{ DisruptorReference, HandlerSource, Rejected };
use crate::error::{ Result, VortexError };
use crate::metrics::MetricsSnapshot;

pub(crate) type References<T> = Mutex<HashMap<String, Arc<DisruptorReference<T>>>>;

static NEXT_ENDPOINT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CONSUMER_ID: AtomicUsize = AtomicUsize::new(1);

struct EndpointInner<T> {
    id: u64,
    uri: String,
    key: String,
    config: EndpointConfig,
    reference: Arc<DisruptorReference<T>>,
    consumers: Mutex<Vec<Arc<ConsumerGroup<T>>>>,
    started: AtomicBool,
    references: Weak<References<T>>,
}

impl<T: Payload> HandlerSource<T> for EndpointInner<T> {
    fn endpoint_id(&self) -> u64 {
        self.id
    }

    fn consumer_groups(&self) -> Vec<Arc<ConsumerGroup<T>>> {
        self.consumers.lock().clone()
    }
}

impl<T> Drop for EndpointInner<T> {
    fn drop(&mut self) {
        // A started endpoint is held by its reference and never drops here,
        // so this only forgets references no other endpoint can reach.
        let Some(references) = self.references.upgrade() else {
            return;
        };
        let mut map = references.lock();
        let unused = map
            .get(&self.key)
            .is_some_and(|r| Arc::ptr_eq(r, &self.reference) && Arc::strong_count(&self.reference) == 2);
        if unused {
            map.remove(&self.key);
            debug!(key = %self.key, "Removed unused shared reference");
        }
    }
}

/// A named endpoint. Endpoints whose URIs share the part before `?` share
/// one ring buffer reference.
pub struct Endpoint<T: Payload> {
    inner: Arc<EndpointInner<T>>,
}

impl<T: Payload> Clone for Endpoint<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Payload> Endpoint<T> {
    pub(crate) fn new(
        uri: &str,
        key: String,
        config: EndpointConfig,
        reference: Arc<DisruptorReference<T>>,
        references: Weak<References<T>>
    ) -> Self {
        Self {
            inner: Arc::new(EndpointInner {
                id: NEXT_ENDPOINT_ID.fetch_add(1, Ordering::Relaxed),
                uri: uri.to_string(),
                key,
                config,
                reference,
                consumers: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
                references,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    /// The canonical key shared endpoints are grouped by
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.inner.config
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    /// Register with the shared reference. The first endpoint starts the ring.
    pub fn start(&self) -> Result<()> {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let result = match self.inner.references.upgrade() {
            Some(references) => {
                let mut map = references.lock();
                map.entry(self.inner.key.clone()).or_insert_with(|| self.inner.reference.clone());
                self.inner.reference.add_endpoint(self.inner.clone())
            }
            None => self.inner.reference.add_endpoint(self.inner.clone()),
        };

        if result.is_err() {
            self.inner.started.store(false, Ordering::Release);
        } else {
            debug!(uri = %self.inner.uri, endpoint_id = self.inner.id, "Endpoint started");
        }
        result
    }

    /// Unregister from the shared reference. The last endpoint tears it down
    /// and removes it from the component.
    pub fn stop(&self) -> Result<()> {
        if !self.inner.started.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let result = match self.inner.references.upgrade() {
            Some(references) => {
                let mut map = references.lock();
                let remaining = self.inner.reference.remove_endpoint(self.inner.id);
                if matches!(remaining, Ok(0)) {
                    let ours = map
                        .get(&self.inner.key)
                        .is_some_and(|r| Arc::ptr_eq(r, &self.inner.reference));
                    if ours {
                        map.remove(&self.inner.key);
                        debug!(key = %self.inner.key, "Removed shared reference");
                    }
                }
                remaining
            }
            None => self.inner.reference.remove_endpoint(self.inner.id),
        };

        for group in self.inner.consumers.lock().drain(..) {
            group.mark_stopped();
        }
        debug!(uri = %self.inner.uri, endpoint_id = self.inner.id, "Endpoint stopped");
        result.map(|_| ())
    }

    pub fn create_producer(&self) -> Producer<T> {
        Producer::new(self.clone())
    }

    pub fn create_consumer(&self, processor: impl Processor<T> + 'static) -> Consumer<T> {
        let group = Arc::new(
            ConsumerGroup::new(
                NEXT_CONSUMER_ID.fetch_add(1, Ordering::Relaxed),
                self.inner.config.concurrent_consumers,
                Arc::new(processor),
                self.inner.reference.metrics().clone()
            )
        );
        Consumer {
            endpoint: self.clone(),
            group,
        }
    }

    /// Publish into the shared ring, waiting for capacity
    pub fn publish(&self, exchange: Exchange<T>) -> std::result::Result<(), Rejected<T>> {
        self.inner.reference.publish(exchange)
    }

    /// Publish into the shared ring, failing with `RingBufferFull` when it is full
    pub fn try_publish(&self, exchange: Exchange<T>) -> std::result::Result<(), Rejected<T>> {
        self.inner.reference.try_publish(exchange)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.reference.pending_count()
    }

    pub fn remaining_capacity(&self) -> Result<usize> {
        self.inner.reference.remaining_capacity()
    }

    /// Configured size of the shared ring buffer
    pub fn buffer_size(&self) -> usize {
        self.inner.reference.buffer_size()
    }

    /// Started consumers on this endpoint
    pub fn consumer_count(&self) -> usize {
        self.inner.consumers.lock().len()
    }

    /// Counters of the shared reference
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.reference.metrics().snapshot()
    }

    /// Swap in a new ring buffer for the current consumer set
    pub fn reconfigure(&self) -> Result<()> {
        self.inner.reference.reconfigure()
    }

    pub(crate) fn record_timeout(&self) {
        self.inner.reference.metrics().record_timeout();
    }

    #[cfg(test)]
    pub(crate) fn reference(&self) -> &Arc<DisruptorReference<T>> {
        &self.inner.reference
    }

    fn consumer_started(&self, group: &Arc<ConsumerGroup<T>>) -> Result<()> {
        if !self.is_started() {
            return Err(VortexError::illegal_state(format!("Endpoint {} is not started", self.inner.uri)));
        }
        {
            let mut consumers = self.inner.consumers.lock();
            if !self.inner.config.multiple_consumers && !consumers.is_empty() {
                return Err(
                    VortexError::illegal_state(
                        format!("Multiple consumers for the same endpoint is not allowed: {}", self.inner.uri)
                    )
                );
            }
            consumers.push(group.clone());
        }

        // The consumer lock must be released: reconfigure reads it back
        if let Err(error) = self.inner.reference.reconfigure() {
            self.inner.consumers.lock().retain(|g| !Arc::ptr_eq(g, group));
            return Err(error);
        }
        debug!(uri = %self.inner.uri, consumer = group.id(), "Consumer started");
        Ok(())
    }

    fn consumer_stopped(&self, group: &Arc<ConsumerGroup<T>>) -> Result<()> {
        let removed = {
            let mut consumers = self.inner.consumers.lock();
            let before = consumers.len();
            consumers.retain(|g| !Arc::ptr_eq(g, group));
            consumers.len() != before
        };
        if removed && self.is_started() {
            self.inner.reference.reconfigure()?;
        }
        debug!(uri = %self.inner.uri, consumer = group.id(), "Consumer stopped");
        Ok(())
    }
}

impl<T: Payload> fmt::Debug for Endpoint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.inner.id)
            .field("uri", &self.inner.uri)
            .field("started", &self.is_started())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// A consumer attached to an endpoint. Starting and stopping it reconfigures
/// the shared ring buffer.
pub struct Consumer<T: Payload> {
    endpoint: Endpoint<T>,
    group: Arc<ConsumerGroup<T>>,
}

impl<T: Payload> Consumer<T> {
    pub fn with_exception_handler(self, handler: impl ExceptionHandler<T> + 'static) -> Self {
        self.group.set_exception_handler(Arc::new(handler));
        self
    }

    pub fn id(&self) -> usize {
        self.group.id()
    }

    pub fn endpoint(&self) -> &Endpoint<T> {
        &self.endpoint
    }

    /// Cleared when the consumer or its endpoint stops
    pub fn is_started(&self) -> bool {
        self.group.is_started()
    }

    pub fn start(&self) -> Result<()> {
        if !self.group.mark_started() {
            return Ok(());
        }
        let result = self.endpoint.consumer_started(&self.group);
        if result.is_err() {
            self.group.mark_stopped();
        }
        result
    }

    pub fn stop(&self) -> Result<()> {
        if !self.group.mark_stopped() {
            return Ok(());
        }
        self.endpoint.consumer_stopped(&self.group)
    }
}
