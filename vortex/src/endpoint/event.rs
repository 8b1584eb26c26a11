//! Ring buffer slot holding the exchange published into it.

use std::sync::Arc;

use crate::endpoint::exchange::{ Exchange, Payload };
use crate::endpoint::synchronized::SynchronizedExchange;

/// Pre-allocated slot. Each publish replaces the synchronized exchange
/// wholesale; nothing carries over from the previous lap.
pub struct ExchangeEvent<T> {
    synchronized: Option<Arc<SynchronizedExchange<T>>>,
}

impl<T> Default for ExchangeEvent<T> {
    fn default() -> Self {
        Self { synchronized: None }
    }
}

impl<T: Payload> ExchangeEvent<T> {
    pub fn set_exchange(&mut self, exchange: Exchange<T>, expected_consumers: usize) {
        self.synchronized = Some(Arc::new(SynchronizedExchange::new(exchange, expected_consumers)));
    }

    pub fn synchronized(&self) -> Option<&Arc<SynchronizedExchange<T>>> {
        self.synchronized.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::synchronized::ConsumerSync;

    #[test]
    fn test_set_exchange_replaces_sync() {
        let mut event = ExchangeEvent::default();
        assert!(event.synchronized().is_none());

        event.set_exchange(Exchange::new(1u32), 1);
        let first = event.synchronized().unwrap().clone();
        assert!(matches!(first.sync(), ConsumerSync::Single));

        event.set_exchange(Exchange::new(2u32), 3);
        let second = event.synchronized().unwrap();
        assert!(!Arc::ptr_eq(&first, second));
        assert!(matches!(second.sync(), ConsumerSync::Multi { expected: 3, .. }));
        assert_eq!(*second.exchange_copy().body(), 2);
    }
}
