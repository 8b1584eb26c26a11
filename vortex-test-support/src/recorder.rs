//! Recording processors for integration tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{ Duration, Instant };

use parking_lot::{ Condvar, Mutex };
use vortex::{ Exchange, Processor, Result, VortexError };

/// One exchange as seen by a consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery<B> {
    pub body: B,
    pub sequence: u64,
    pub ordinal: usize,
    pub consumer_id: usize,
}

/// Collects deliveries from any number of consumers and lets tests wait for them
pub struct Recorder<B> {
    deliveries: Mutex<Vec<Delivery<B>>>,
    changed: Condvar,
}

impl<B: Clone + Send + 'static> Recorder<B> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            deliveries: Mutex::new(Vec::new()),
            changed: Condvar::new(),
        })
    }

    pub fn record(&self, exchange: &Exchange<B>) {
        let dispatch = exchange.dispatch();
        let delivery = Delivery {
            body: exchange.body().clone(),
            sequence: dispatch.map_or(0, |d| d.sequence),
            ordinal: dispatch.map_or(0, |d| d.ordinal),
            consumer_id: dispatch.map_or(0, |d| d.consumer_id),
        };
        self.deliveries.lock().push(delivery);
        self.changed.notify_all();
    }

    /// Records and succeeds
    pub fn processor(self: &Arc<Self>) -> impl Processor<B> {
        let recorder = self.clone();
        move |exchange: &mut Exchange<B>| -> Result<()> {
            recorder.record(exchange);
            Ok(())
        }
    }

    /// Sleeps for `delay`, then records
    pub fn delayed_processor(self: &Arc<Self>, delay: Duration) -> impl Processor<B> {
        let recorder = self.clone();
        move |exchange: &mut Exchange<B>| -> Result<()> {
            std::thread::sleep(delay);
            recorder.record(exchange);
            Ok(())
        }
    }

    /// Waits on `latch`, then records
    pub fn gated_processor(self: &Arc<Self>, latch: Arc<Latch>) -> impl Processor<B> {
        let recorder = self.clone();
        move |exchange: &mut Exchange<B>| -> Result<()> {
            latch.wait();
            recorder.record(exchange);
            Ok(())
        }
    }

    /// Records, then fails with a processing error
    pub fn failing_processor(self: &Arc<Self>, message: &'static str) -> impl Processor<B> {
        let recorder = self.clone();
        move |exchange: &mut Exchange<B>| -> Result<()> {
            recorder.record(exchange);
            Err(VortexError::processing(message))
        }
    }

    /// Wait until at least `count` deliveries were recorded
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut deliveries = self.deliveries.lock();
        while deliveries.len() < count {
            if self.changed.wait_until(&mut deliveries, deadline).timed_out() {
                return deliveries.len() >= count;
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.deliveries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.lock().is_empty()
    }

    pub fn deliveries(&self) -> Vec<Delivery<B>> {
        self.deliveries.lock().clone()
    }

    pub fn bodies(&self) -> Vec<B> {
        self.deliveries.lock().iter().map(|d| d.body.clone()).collect()
    }

    /// Sequences handled per ordinal, in delivery order
    pub fn sequences_by_ordinal(&self) -> BTreeMap<usize, Vec<u64>> {
        let mut map: BTreeMap<usize, Vec<u64>> = BTreeMap::new();
        for delivery in self.deliveries.lock().iter() {
            map.entry(delivery.ordinal).or_default().push(delivery.sequence);
        }
        map
    }

    /// Bodies received per consumer, in delivery order
    pub fn bodies_by_consumer(&self) -> BTreeMap<usize, Vec<B>> {
        let mut map: BTreeMap<usize, Vec<B>> = BTreeMap::new();
        for delivery in self.deliveries.lock().iter() {
            map.entry(delivery.consumer_id).or_default().push(delivery.body.clone());
        }
        map
    }
}

/// One-shot gate: `wait` blocks until `open` is called
pub struct Latch {
    open: Mutex<bool>,
    opened: Condvar,
}

impl Latch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            open: Mutex::new(false),
            opened: Condvar::new(),
        })
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }

    pub fn is_open(&self) -> bool {
        *self.open.lock()
    }

    pub fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
    }
}
