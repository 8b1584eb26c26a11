//! Sustained publishing with consumer restarts.
//!
//! Run: cargo test -p vortex-test-support --test stress -- --nocapture

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use vortex::{ DisruptorComponent, EndpointConfig, Exchange, Result };
use vortex_test_support::{ init_test_logging, print_summary, wait_until, StressConfig, StressCounters, StressRunner };

fn run_endpoint_stress(uri: &str, config: StressConfig) {
    init_test_logging();
    let component = DisruptorComponent::<u64>::default();
    let endpoint = component
        .create_endpoint(
            uri,
            EndpointConfig::new().with_size(1024).with_concurrent_consumers(config.concurrent_consumers)
        )
        .unwrap();
    endpoint.start().unwrap();

    let runner = StressRunner::new(config.clone());
    let counters = runner.counters();
    let c = counters.clone();
    let consumer = endpoint.create_consumer(move |_: &mut Exchange<u64>| -> Result<()> {
        c.record_process();
        Ok(())
    });
    consumer.start().unwrap();

    let mut metrics = runner.run_with_progress(|counters: Arc<StressCounters>| {
        let producers: Vec<_> = (0..config.producers)
            .map(|_| {
                let endpoint = endpoint.clone();
                let counters = counters.clone();
                thread::spawn(move || {
                    let mut value = 0u64;
                    while counters.is_running() {
                        match endpoint.publish(Exchange::new(value)) {
                            Ok(()) => counters.record_publish(),
                            Err(rejected) => {
                                eprintln!("Publish failed: {rejected}");
                                counters.record_reject();
                            }
                        }
                        value += 1;
                    }
                })
            })
            .collect();

        if let Some(interval) = config.reconfigure_interval {
            while counters.is_running() {
                thread::sleep(interval);
                consumer.stop().unwrap();
                consumer.start().unwrap();
                counters.record_reconfiguration();
            }
        }

        for producer in producers {
            producer.join().unwrap();
        }
    });

    let published = metrics.published;
    let drained = wait_until(Duration::from_secs(10), || counters.snapshot().processed >= published);
    metrics.processed = counters.snapshot().processed;
    print_summary(&metrics);

    assert!(drained, "processed {} of {}", metrics.processed, published);
    assert_eq!(metrics.rejected, 0);
    assert_eq!(metrics.processed, published);

    consumer.stop().unwrap();
    endpoint.stop().unwrap();
}

/// Several producers, steady consumer
#[test]
fn stress_steady_publish() {
    run_endpoint_stress(
        "disruptor:stress-steady",
        StressConfig::new(Duration::from_millis(500)).with_producers(4).with_concurrent_consumers(2)
    );
}

/// Several producers while the consumer restarts every few milliseconds
#[test]
fn stress_publish_with_restarts() {
    run_endpoint_stress(
        "disruptor:stress-restarts",
        StressConfig::new(Duration::from_millis(500))
            .with_producers(3)
            .with_concurrent_consumers(2)
            .with_reconfigure_interval(Duration::from_millis(20))
    );
}

/// Long run for manual soak testing
#[test]
#[ignore]
fn stress_soak() {
    run_endpoint_stress(
        "disruptor:stress-soak",
        StressConfig::new(Duration::from_secs(60))
            .with_producers(4)
            .with_concurrent_consumers(4)
            .with_reconfigure_interval(Duration::from_millis(250))
            .with_report_interval(Duration::from_secs(5))
    );
}
