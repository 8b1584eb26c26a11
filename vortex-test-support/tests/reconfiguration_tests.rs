//! Consumers starting and stopping while producers keep publishing.

use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use vortex::{ DisruptorComponent, EndpointConfig, Exchange, VortexError };
use vortex_test_support::{ missing_and_duplicates, wait_until, Recorder, SequenceChecker };

const WAIT: Duration = Duration::from_secs(10);

/// Exchanges published with no consumer are parked, then delivered first and in order
#[test]
fn test_parked_exchanges_replayed_in_order() {
    let component = DisruptorComponent::<u64>::default();
    let endpoint = component.create_endpoint("disruptor:park", EndpointConfig::new().with_size(8)).unwrap();
    endpoint.start().unwrap();

    for value in 0..5u64 {
        endpoint.publish(Exchange::new(value)).unwrap();
    }
    assert_eq!(endpoint.pending_count(), 5);

    let recorder = Recorder::new();
    let consumer = endpoint.create_consumer(recorder.processor());
    consumer.start().unwrap();

    for value in 5..10u64 {
        endpoint.publish(Exchange::new(value)).unwrap();
    }
    assert!(recorder.wait_for(10, WAIT));

    let mut checker = SequenceChecker::new(0);
    assert!(checker.check_all(recorder.bodies()), "out of order: {:?}", checker.errors());
    assert_eq!(endpoint.metrics().replayed, 5);

    consumer.stop().unwrap();
    endpoint.stop().unwrap();
}

/// Reconfiguring with an unchanged consumer set loses and reorders nothing
#[test]
fn test_noop_reconfigure_keeps_order() {
    let component = DisruptorComponent::<u64>::default();
    let endpoint = component.create_endpoint("disruptor:noop", EndpointConfig::new().with_size(64)).unwrap();
    endpoint.start().unwrap();

    let recorder = Recorder::new();
    let consumer = endpoint.create_consumer(recorder.delayed_processor(Duration::from_micros(200)));
    consumer.start().unwrap();
    let before = endpoint.metrics().reconfigurations;

    for value in 0..40u64 {
        endpoint.publish(Exchange::new(value)).unwrap();
    }
    endpoint.reconfigure().unwrap();
    for value in 40..80u64 {
        endpoint.publish(Exchange::new(value)).unwrap();
    }
    assert!(recorder.wait_for(80, WAIT));

    let mut checker = SequenceChecker::new(0);
    assert!(checker.check_all(recorder.bodies()), "out of order: {:?}", checker.errors());
    assert_eq!(endpoint.metrics().reconfigurations, before + 1);

    consumer.stop().unwrap();
    endpoint.stop().unwrap();
}

/// Removing the last endpoint shuts the reference down and forgets it
#[test]
fn test_last_endpoint_removal() {
    let component = DisruptorComponent::<u64>::default();
    let endpoint = component.create_endpoint("disruptor:last", EndpointConfig::new().with_size(8)).unwrap();
    endpoint.start().unwrap();
    assert!(component.has_reference("disruptor:last"));

    endpoint.stop().unwrap();
    assert!(!component.has_reference("disruptor:last"));
    assert!(matches!(endpoint.remaining_capacity(), Err(VortexError::NotStarted)));

    let mut exchange = Exchange::in_out(1u64);
    let error = endpoint.create_producer().send(&mut exchange).unwrap_err();
    assert_eq!(error, VortexError::NotStarted);
    assert_eq!(exchange.error(), Some(&VortexError::NotStarted));

    // Restarting registers the reference again
    endpoint.start().unwrap();
    assert!(component.has_reference("disruptor:last"));
    endpoint.stop().unwrap();
}

/// Stopping the endpoint detaches its consumers; they can be started again
/// once the endpoint is back
#[test]
fn test_consumer_restart_after_endpoint_restart() {
    let component = DisruptorComponent::<u64>::default();
    let endpoint = component.create_endpoint("disruptor:bounce", EndpointConfig::new().with_size(8)).unwrap();
    endpoint.start().unwrap();

    let recorder = Recorder::new();
    let consumer = endpoint.create_consumer(recorder.processor());
    consumer.start().unwrap();
    assert!(consumer.is_started());

    endpoint.stop().unwrap();
    assert!(!consumer.is_started());
    assert_eq!(endpoint.consumer_count(), 0);

    endpoint.start().unwrap();
    consumer.start().unwrap();
    assert!(consumer.is_started());
    assert_eq!(endpoint.consumer_count(), 1);

    endpoint.publish(Exchange::new(7)).unwrap();
    assert!(recorder.wait_for(1, WAIT));
    assert_eq!(recorder.bodies(), vec![7]);

    consumer.stop().unwrap();
    assert_eq!(endpoint.consumer_count(), 0);
    endpoint.stop().unwrap();
}

/// Reconfigure on an endpoint that never started is refused
#[test]
fn test_reconfigure_without_endpoints() {
    let component = DisruptorComponent::<u64>::default();
    let endpoint = component.create_endpoint("disruptor:cold", EndpointConfig::new()).unwrap();
    assert_eq!(endpoint.reconfigure(), Err(VortexError::NotStarted));
}

/// Producers publishing while the consumer is restarted lose nothing and
/// keep per-producer order
#[test]
fn test_concurrent_producers_during_restarts() {
    const PRODUCERS: u64 = 3;
    const PER_PRODUCER: u64 = 3_000;
    const STRIDE: u64 = 1_000_000;

    let component = DisruptorComponent::<u64>::default();
    let endpoint = component.create_endpoint("disruptor:churn", EndpointConfig::new().with_size(256)).unwrap();
    endpoint.start().unwrap();

    let recorder = Recorder::new();
    let consumer = endpoint.create_consumer(recorder.processor());
    consumer.start().unwrap();

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let endpoint = endpoint.clone();
            thread::spawn(move || {
                for n in 0..PER_PRODUCER {
                    if let Err(rejected) = endpoint.publish(Exchange::new(producer * STRIDE + n)) {
                        eprintln!("Publish failed: {rejected}");
                        return false;
                    }
                }
                true
            })
        })
        .collect();

    for _ in 0..5 {
        thread::sleep(Duration::from_millis(5));
        consumer.stop().unwrap();
        thread::sleep(Duration::from_millis(2));
        consumer.start().unwrap();
    }

    for handle in handles {
        assert!(handle.join().unwrap());
    }
    let total = (PRODUCERS * PER_PRODUCER) as usize;
    assert!(recorder.wait_for(total, WAIT), "received {} of {}", recorder.len(), total);

    let bodies = recorder.bodies();
    assert_eq!(bodies.len(), total);
    for producer in 0..PRODUCERS {
        let values: Vec<u64> = bodies
            .iter()
            .filter(|b| **b / STRIDE == producer)
            .map(|b| *b % STRIDE)
            .collect();
        let (missing, duplicates) = missing_and_duplicates(&values, PER_PRODUCER);
        assert!(missing.is_empty(), "producer {producer} missing {missing:?}");
        assert!(duplicates.is_empty(), "producer {producer} duplicates {duplicates:?}");
        let mut checker = SequenceChecker::new(0);
        assert!(checker.check_all(values), "producer {producer} out of order");
    }

    consumer.stop().unwrap();
    endpoint.stop().unwrap();
}

/// Endpoints added and removed on a shared key while producers run
#[test]
fn test_endpoint_churn_on_shared_key() {
    let component = DisruptorComponent::<u64>::default();
    let main = component.create_endpoint("disruptor:busy", EndpointConfig::new().with_size(64)).unwrap();
    main.start().unwrap();

    let recorder = Recorder::new();
    let consumer = main.create_consumer(recorder.processor());
    consumer.start().unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    let publisher = main.clone();
    let handle = thread::spawn(move || {
        let mut sent = 0u64;
        while r.load(Ordering::Relaxed) {
            publisher.publish(Exchange::new(sent)).unwrap();
            sent += 1;
        }
        sent
    });

    for _ in 0..5 {
        let extra = component.create_endpoint("disruptor:busy?extra=1", EndpointConfig::new()).unwrap();
        extra.start().unwrap();
        let extra_consumer = extra.create_consumer(|_: &mut Exchange<u64>| -> vortex::Result<()> { Ok(()) });
        extra_consumer.start().unwrap();
        thread::sleep(Duration::from_millis(2));
        extra.stop().unwrap();
    }

    running.store(false, Ordering::Relaxed);
    let sent = handle.join().unwrap();
    assert!(recorder.wait_for(sent as usize, WAIT));

    let mut checker = SequenceChecker::new(0);
    assert!(checker.check_all(recorder.bodies()), "out of order: {:?}", checker.errors());
    assert!(component.has_reference("disruptor:busy"));

    consumer.stop().unwrap();
    main.stop().unwrap();
}

/// A later endpoint asking for a bigger ring grows it at the next reconfigure
#[test]
fn test_size_grows_on_reuse() {
    let component = DisruptorComponent::<u64>::default();
    let small = component.create_endpoint("disruptor:grow", EndpointConfig::new().with_size(8)).unwrap();
    small.start().unwrap();
    assert_eq!(small.remaining_capacity().unwrap(), 8);

    let large = component.create_endpoint("disruptor:grow", EndpointConfig::new().with_size(20)).unwrap();
    assert_eq!(small.buffer_size(), 32);
    assert_eq!(small.remaining_capacity().unwrap(), 8);

    large.start().unwrap();
    small.reconfigure().unwrap();
    assert!(wait_until(WAIT, || small.remaining_capacity().ok() == Some(32)));

    large.stop().unwrap();
    small.stop().unwrap();
}
