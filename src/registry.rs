//! Registry of protocol backends.
//!
//! An explicit object rather than a process-wide table: the dispatch layer
//! constructs one at startup, registers its backends, and from then on
//! only reads it.

use std::sync::Arc;

use url::Url;

use crate::driver::{Driver, Hypervisor, OpenOptions};
use crate::error::{DriverError, Result};

#[derive(Default)]
pub struct Registry {
    drivers: Vec<Arc<dyn Driver>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Registry with every built-in backend registered.
    pub fn with_defaults() -> Self {
        let mut registry = Registry::new();
        registry.register(Arc::new(crate::qemud::QemudDriver));
        registry
    }

    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        tracing::debug!(driver = driver.name(), "registered backend");
        self.drivers.push(driver);
    }

    pub fn drivers(&self) -> impl Iterator<Item = &Arc<dyn Driver>> {
        self.drivers.iter()
    }

    /// Open a connection through whichever backend claims the URI.
    pub fn open(&self, uri: &str, opts: OpenOptions) -> Result<Box<dyn Hypervisor>> {
        let uri = Url::parse(uri).map_err(|e| DriverError::InvalidUri(e.to_string()))?;
        for driver in &self.drivers {
            if driver.probe(&uri) {
                return driver.open(&uri, opts);
            }
        }
        Err(DriverError::NoBackend(uri.to_string()))
    }
}
