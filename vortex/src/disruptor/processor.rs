//! Batch event processor: one thread, one handler, one gating sequence.

use std::sync::Arc;

use tracing::trace;

use crate::disruptor::{ PaddedSequence, RingBuffer, Sequence };

/// Callback interface for processing ring buffer events
pub trait EventHandler<E>: Send + Sync {
    /// Handle one published event. Sequences arrive in increasing order.
    fn on_event(&self, event: &E, sequence: Sequence, end_of_batch: bool);

    /// Called on the processor thread before the first event
    fn on_start(&self) {}

    /// Called on the processor thread after the ring has been halted
    fn on_shutdown(&self) {}
}

/// Drives an [`EventHandler`] over every sequence published to a ring.
///
/// The processor's sequence is registered as a gating sequence at
/// construction, so producers never overwrite a slot it has not handled.
pub struct EventProcessor<E> {
    ring: Arc<RingBuffer<E>>,
    handler: Arc<dyn EventHandler<E>>,
    sequence: Arc<PaddedSequence>,
}

impl<E: Send + Sync> EventProcessor<E> {
    /// Must be created before anything is published to `ring`
    pub fn new(ring: Arc<RingBuffer<E>>, handler: Arc<dyn EventHandler<E>>) -> Self {
        let sequence = Arc::new(PaddedSequence::new(0));
        ring.add_gating_sequence(sequence.clone());
        Self {
            ring,
            handler,
            sequence,
        }
    }

    /// Count of sequences fully handled
    pub fn sequence(&self) -> Sequence {
        self.sequence.get()
    }

    /// Run until the ring is halted
    pub fn run(&self) {
        self.handler.on_start();

        let mut next = self.sequence.get();
        loop {
            match self.ring.wait_for(next) {
                Ok(available) => {
                    while next < available {
                        // Safety: `next` is published and our gating sequence
                        // keeps producers from reclaiming its slot.
                        let event = unsafe { self.ring.get(next) };
                        self.handler.on_event(event, next, next + 1 == available);
                        next += 1;
                    }
                    self.sequence.set(available);
                }
                Err(err) => {
                    if self.ring.is_alerted() {
                        trace!(sequence = next, "Event processor halted");
                        break;
                    }
                    trace!(error = %err, "Event processor wait failed, retrying");
                }
            }
        }

        self.handler.on_shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruptor::{ ProducerType, YieldingWaitStrategy };
    use parking_lot::Mutex;
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<(u64, Sequence)>>,
        started: Mutex<bool>,
        stopped: Mutex<bool>,
    }

    impl EventHandler<u64> for Recording {
        fn on_event(&self, event: &u64, sequence: Sequence, _end_of_batch: bool) {
            self.seen.lock().push((*event, sequence));
        }

        fn on_start(&self) {
            *self.started.lock() = true;
        }

        fn on_shutdown(&self) {
            *self.stopped.lock() = true;
        }
    }

    #[test]
    fn test_processes_in_order_and_stops_on_halt() {
        let ring = Arc::new(
            RingBuffer::<u64>::new(8, ProducerType::Multi, Arc::new(YieldingWaitStrategy::new())).unwrap()
        );
        let handler = Arc::new(Recording::default());
        let processor = Arc::new(EventProcessor::new(ring.clone(), handler.clone()));

        let p = processor.clone();
        let worker = thread::spawn(move || p.run());

        for value in 0..20u64 {
            let mut slot = ring.claim().unwrap();
            *slot = value + 100;
        }
        assert!(ring.await_drained(Duration::from_secs(5)));
        assert_eq!(processor.sequence(), 20);

        ring.halt();
        worker.join().unwrap();

        let seen = handler.seen.lock().clone();
        assert_eq!(seen, (0..20).map(|s| (s + 100, s)).collect::<Vec<_>>());
        assert!(*handler.started.lock());
        assert!(*handler.stopped.lock());
    }
}
