//! Component: creates endpoints and shares ring buffer references between them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::{ ComponentConfig, EndpointConfig };
use crate::endpoint::endpoint::{ Endpoint, References };
use crate::endpoint::exchange::Payload;
use crate::endpoint::reference::DisruptorReference;
use crate::error::Result;

/// Canonical key for an endpoint URI: everything before the query string
pub fn canonical_key(uri: &str) -> &str {
    uri.split_once('?').map_or(uri, |(key, _)| key)
}

pub struct DisruptorComponent<T: Payload> {
    config: ComponentConfig,
    references: Arc<References<T>>,
}

impl<T: Payload> DisruptorComponent<T> {
    pub fn new(config: ComponentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            references: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn config(&self) -> &ComponentConfig {
        &self.config
    }

    /// Create an endpoint, reusing the shared reference for its canonical key.
    ///
    /// A reused reference grows to the larger of its current and the
    /// requested size.
    pub fn create_endpoint(&self, uri: &str, config: EndpointConfig) -> Result<Endpoint<T>> {
        config.validate(self.config.max_concurrent_consumers)?;
        let key = canonical_key(uri).to_string();
        let size = config.effective_size(self.config.buffer_size);

        let reference = {
            let mut map = self.references.lock();
            match map.get(&key) {
                Some(existing) => {
                    existing.ensure_size(size);
                    existing.clone()
                }
                None => {
                    let reference = Arc::new(
                        DisruptorReference::new(
                            key.clone(),
                            size,
                            config.producer_type,
                            config.wait_strategy,
                            &self.config
                        )
                    );
                    map.insert(key.clone(), reference.clone());
                    debug!(key = %key, size, "Created shared reference");
                    reference
                }
            }
        };

        Ok(Endpoint::new(uri, key, config, reference, Arc::downgrade(&self.references)))
    }

    pub fn reference_count(&self) -> usize {
        self.references.lock().len()
    }

    pub fn has_reference(&self, uri: &str) -> bool {
        self.references.lock().contains_key(canonical_key(uri))
    }
}

impl<T: Payload> Default for DisruptorComponent<T> {
    fn default() -> Self {
        Self {
            config: ComponentConfig::default(),
            references: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}
