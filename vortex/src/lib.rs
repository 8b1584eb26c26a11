//! # Vortex
//!
//! In-process messaging endpoint built on an LMAX Disruptor style ring buffer.
//!
//! Producers publish exchanges into a shared ring buffer; consumers attached
//! to the endpoint process them on a pool of worker threads. Consumers can be
//! started and stopped while producers keep publishing: the ring buffer is
//! swapped out underneath them and exchanges that were waiting for a
//! consumer are replayed, in order, into the new ring.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use vortex::{ DisruptorComponent, EndpointConfig, Exchange, Result };
//!
//! fn main() -> Result<()> {
//!     let component = DisruptorComponent::<String>::default();
//!     let endpoint = component.create_endpoint("disruptor:orders", EndpointConfig::new().with_size(256))?;
//!     endpoint.start()?;
//!
//!     let consumer = endpoint.create_consumer(|exchange: &mut Exchange<String>| -> Result<()> {
//!         let upper = exchange.body().to_uppercase();
//!         exchange.set_body(upper);
//!         Ok(())
//!     });
//!     consumer.start()?;
//!
//!     let producer = endpoint.create_producer();
//!     let mut exchange = Exchange::in_out(String::from("hello"));
//!     producer.send(&mut exchange)?;
//!     assert_eq!(exchange.body(), "HELLO");
//!
//!     consumer.stop()?;
//!     endpoint.stop()
//! }
//! ```
//!
//! ## Modules
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`disruptor`] | Ring buffer, sequencer, wait strategies, event processor |
//! | [`endpoint`] | Exchanges, consumers, reference manager, producer, component |
//! | [`config`] | Endpoint and component configuration |
//! | [`metrics`] | Per-reference counters |
//! | [`insights`] | Logging setup |

pub mod config;
pub mod constants;
pub mod disruptor;
pub mod endpoint;
pub mod error;
pub mod insights;
pub mod metrics;

pub use config::{ power_of_two, ComponentConfig, EndpointConfig, WaitForTaskToComplete };
pub use disruptor::{ ProducerType, RingBuffer, WaitStrategyType };
pub use endpoint::{
    Consumer,
    DisruptorComponent,
    Endpoint,
    ExceptionHandler,
    Exchange,
    ExchangePattern,
    Payload,
    Processor,
    Producer,
    Rejected,
};
pub use error::{ Result, VortexError };
pub use metrics::{ Metrics, MetricsSnapshot };

static_assertions::assert_impl_all!(Endpoint<u64>: Send, Sync, Clone);
static_assertions::assert_impl_all!(Producer<u64>: Send, Sync);
static_assertions::assert_impl_all!(DisruptorComponent<String>: Send, Sync);
static_assertions::assert_impl_all!(RingBuffer<endpoint::ExchangeEvent<String>>: Send, Sync);
