//! Messaging endpoint on top of the ring buffer core.
//!
//! ## Data flow
//!
//! ```text
//! Producer ──▶ DisruptorReference ──▶ RingBuffer<ExchangeEvent> ──▶ ConsumerEventHandler ──▶ Processor
//!                  │      ▲                                                  │
//!                  ▼      │ replay                                           ▼
//!           ParkingHandler ──▶ TemporaryBuffer               SynchronizedExchange::consumed
//!                                                                            │
//! Producer ◀──────────────────────── completion callback ◀──────────────────┘
//! ```
//!
//! A `DisruptorComponent` hands out `Endpoint`s. Endpoints whose URIs match
//! up to the query string share one `DisruptorReference`, which owns the
//! live ring buffer and rebuilds it whenever a consumer starts or stops.
//! Every started consumer receives every exchange; the `concurrent_consumers`
//! handlers inside one consumer split the sequences between them by ordinal.

pub mod buffer;
pub mod component;
pub mod consumer;
#[allow(clippy::module_inception)]
pub mod endpoint;
pub mod event;
pub mod exchange;
pub mod handler;
pub mod pool;
pub mod producer;
pub mod reference;
pub mod synchronized;

pub use buffer::TemporaryBuffer;
pub use component::{ canonical_key, DisruptorComponent };
pub use consumer::{
    ConsumerEventHandler,
    ConsumerGroup,
    ExceptionHandler,
    LoggingExceptionHandler,
    Processor,
};
pub use endpoint::{ Consumer, Endpoint };
pub use event::ExchangeEvent;
pub use exchange::{ DispatchInfo, Exchange, ExchangePattern, OnCompletion, Payload };
pub use handler::{ HandlerState, Lifecycle, LifecycleAware, ParkingHandler };
pub use pool::WorkerPool;
pub use producer::Producer;
pub use reference::{ ActiveRing, DisruptorReference, HandlerSource, HolderState, ReferenceHolder, Rejected };
pub use synchronized::{ ConsumerSync, SynchronizedExchange };
