//! Completion tracking for one published exchange across its consumers.
//!
//! | Mode | Completes when | Copies results back |
//! |------|----------------|---------------------|
//! | `Single` | the consumer finishes | always |
//! | `Multi` | all expected consumers finish, or the first one fails | only on failure |
//!
//! Completion runs the callbacks taken from the published exchange, at most once.

use std::sync::atomic::{ AtomicBool, AtomicUsize, Ordering };
use std::sync::Arc;

use parking_lot::Mutex;

use crate::endpoint::exchange::{ Exchange, OnCompletion, Payload };

#[derive(Debug)]
pub enum ConsumerSync {
    Single,
    Multi {
        expected: usize,
        processed: AtomicUsize,
    },
}

impl ConsumerSync {
    pub fn for_consumers(expected: usize) -> Self {
        if expected <= 1 {
            Self::Single
        } else {
            Self::Multi {
                expected,
                processed: AtomicUsize::new(0),
            }
        }
    }
}

pub struct SynchronizedExchange<T> {
    exchange: Mutex<Exchange<T>>,
    callbacks: Mutex<Vec<OnCompletion<T>>>,
    ignored: Arc<AtomicBool>,
    sync: ConsumerSync,
    done: AtomicBool,
}

impl<T: Payload> SynchronizedExchange<T> {
    /// Wrap a published exchange, taking over its completion callbacks
    pub fn new(mut exchange: Exchange<T>, expected_consumers: usize) -> Self {
        let callbacks = exchange.handover_completions();
        let ignored = exchange.ignore_marker();
        Self {
            exchange: Mutex::new(exchange),
            callbacks: Mutex::new(callbacks),
            ignored,
            sync: ConsumerSync::for_consumers(expected_consumers),
            done: AtomicBool::new(false),
        }
    }

    pub fn sync(&self) -> &ConsumerSync {
        &self.sync
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored.load(Ordering::Acquire)
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// A private copy for one consumer
    pub fn exchange_copy(&self) -> Exchange<T> {
        self.exchange.lock().copy()
    }

    /// Record that a consumer finished with `result`
    pub fn consumed(&self, result: &Exchange<T>) {
        match &self.sync {
            ConsumerSync::Single => {
                if !self.done.swap(true, Ordering::AcqRel) {
                    self.exchange.lock().copy_results_from(result);
                    self.complete();
                }
            }
            ConsumerSync::Multi { expected, processed } => {
                let count = processed.fetch_add(1, Ordering::AcqRel) + 1;
                let failed = result.is_failed();
                if (count == *expected || failed) && !self.done.swap(true, Ordering::AcqRel) {
                    if failed {
                        self.exchange.lock().copy_results_from(result);
                    }
                    self.complete();
                }
            }
        }
    }

    /// Suppress completion
    pub fn cancel(&self) {
        self.done.store(true, Ordering::Release);
    }

    /// Suppress completion and return the exchange with its callbacks
    /// restored, or `None` if it already completed.
    pub fn cancel_and_take(&self) -> Option<Exchange<T>> {
        if self.done.swap(true, Ordering::AcqRel) {
            return None;
        }
        let mut exchange = self.exchange.lock().copy();
        exchange.restore_completions(std::mem::take(&mut *self.callbacks.lock()));
        Some(exchange)
    }

    fn complete(&self) {
        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        let exchange = self.exchange.lock();
        for callback in callbacks {
            callback(&exchange);
        }
    }
}
