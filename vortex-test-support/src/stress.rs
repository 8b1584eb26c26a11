//! Stress runs: producers publishing while consumers come and go.

use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::sync::Arc;
use std::time::{ Duration, Instant };

/// Configuration for stress runs
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// How long producers keep publishing
    pub duration: Duration,
    /// Number of producer threads
    pub producers: usize,
    /// Worker threads per consumer
    pub concurrent_consumers: usize,
    /// Restart the consumer this often (None = never)
    pub reconfigure_interval: Option<Duration>,
    pub report_interval: Duration,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(2),
            producers: 1,
            concurrent_consumers: 1,
            reconfigure_interval: None,
            report_interval: Duration::from_millis(500),
        }
    }
}

impl StressConfig {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            ..Default::default()
        }
    }

    pub fn with_producers(mut self, n: usize) -> Self {
        self.producers = n;
        self
    }

    pub fn with_concurrent_consumers(mut self, n: usize) -> Self {
        self.concurrent_consumers = n;
        self
    }

    pub fn with_reconfigure_interval(mut self, interval: Duration) -> Self {
        self.reconfigure_interval = Some(interval);
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct StressMetrics {
    pub published: u64,
    pub processed: u64,
    pub rejected: u64,
    pub reconfigurations: u64,
    pub duration: Duration,
    pub peak_rate: f64,
}

impl StressMetrics {
    pub fn publish_rate(&self) -> f64 {
        per_second(self.published, self.duration)
    }

    pub fn process_rate(&self) -> f64 {
        per_second(self.processed, self.duration)
    }

    pub fn loss_rate(&self) -> f64 {
        if self.published > 0 {
            1.0 - (self.processed as f64) / (self.published as f64)
        } else {
            0.0
        }
    }
}

fn per_second(count: u64, duration: Duration) -> f64 {
    if duration.as_secs_f64() > 0.0 { (count as f64) / duration.as_secs_f64() } else { 0.0 }
}

/// Counters shared between producers, consumers and the reporter
#[derive(Default)]
pub struct StressCounters {
    pub published: AtomicU64,
    pub processed: AtomicU64,
    pub rejected: AtomicU64,
    pub reconfigurations: AtomicU64,
    stopped: AtomicBool,
}

impl StressCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_publish(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_process(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reject(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconfiguration(&self) {
        self.reconfigurations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StressMetrics {
        StressMetrics {
            published: self.published.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            reconfigurations: self.reconfigurations.load(Ordering::Relaxed),
            ..StressMetrics::default()
        }
    }
}

/// Runs a stress body with a progress reporter thread
pub struct StressRunner {
    config: StressConfig,
    counters: Arc<StressCounters>,
}

impl StressRunner {
    pub fn new(config: StressConfig) -> Self {
        Self {
            config,
            counters: StressCounters::new(),
        }
    }

    pub fn counters(&self) -> Arc<StressCounters> {
        self.counters.clone()
    }

    pub fn config(&self) -> &StressConfig {
        &self.config
    }

    /// Run `body` until it returns. The reporter flips `is_running` to false
    /// once the configured duration has elapsed.
    pub fn run_with_progress<F>(&self, body: F) -> StressMetrics where F: FnOnce(Arc<StressCounters>) {
        let start = Instant::now();
        let counters = self.counters.clone();
        let duration = self.config.duration;
        let report_interval = self.config.report_interval;

        let report_counters = counters.clone();
        let reporter = std::thread::spawn(move || {
            let mut last_published = 0u64;
            let mut peak_rate = 0.0f64;

            while report_counters.is_running() {
                std::thread::sleep(report_interval);

                let published = report_counters.published.load(Ordering::Relaxed);
                let processed = report_counters.processed.load(Ordering::Relaxed);
                let reconfigurations = report_counters.reconfigurations.load(Ordering::Relaxed);

                let rate = ((published - last_published) as f64) / report_interval.as_secs_f64();
                peak_rate = peak_rate.max(rate);
                last_published = published;

                let elapsed = start.elapsed();
                eprintln!(
                    "[{:>5.1}s] published: {:>9}, processed: {:>9}, rate: {:>9.0}/s, reconfigured: {}",
                    elapsed.as_secs_f64(),
                    published,
                    processed,
                    rate,
                    reconfigurations
                );

                if elapsed >= duration {
                    report_counters.stop();
                    break;
                }
            }

            peak_rate
        });

        body(counters.clone());

        counters.stop();
        let peak_rate = reporter.join().unwrap_or(0.0);

        let mut metrics = counters.snapshot();
        metrics.duration = start.elapsed();
        metrics.peak_rate = peak_rate;
        metrics
    }
}

pub fn print_summary(metrics: &StressMetrics) {
    eprintln!("\n╔══════════════════════════════════════════════════════════════╗");
    eprintln!("║                    STRESS RUN RESULTS                        ║");
    eprintln!("╠══════════════════════════════════════════════════════════════╣");
    eprintln!("║  Duration:        {:>10.2}s                                ║", metrics.duration.as_secs_f64());
    eprintln!("║  Published:       {:>10}                                  ║", metrics.published);
    eprintln!("║  Processed:       {:>10}                                  ║", metrics.processed);
    eprintln!("║  Rejected:        {:>10}                                  ║", metrics.rejected);
    eprintln!("║  Reconfigured:    {:>10}                                  ║", metrics.reconfigurations);
    eprintln!("║  Publish Rate:    {:>10.0} ex/s                           ║", metrics.publish_rate());
    eprintln!("║  Process Rate:    {:>10.0} ex/s                           ║", metrics.process_rate());
    eprintln!("║  Peak Rate:       {:>10.0} ex/s                           ║", metrics.peak_rate);
    eprintln!("║  Loss Rate:       {:>10.4}%                               ║", metrics.loss_rate() * 100.0);
    eprintln!("╚══════════════════════════════════════════════════════════════╝");
}
