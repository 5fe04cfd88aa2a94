//! Format factory registry.
//!
//! Format crates register a [`FormatFactory`] with the process-wide
//! [`DriverRegistry`]; `geoproc-core` looks factories up by driver name when
//! a pipeline opens its source or sink.

use std::sync::{Arc, OnceLock, RwLock};

use crate::drivers::Driver;
use crate::io::{DataReader, DataWriter};

/// A format implementation: its driver descriptor plus reader/writer openers.
pub trait FormatFactory: Send + Sync {
    /// Descriptor of the driver this factory implements.
    fn driver(&self) -> Driver;

    /// Returns the reader, if the format can be read.
    fn create_reader(&self) -> Option<Arc<dyn DataReader>>;

    /// Returns the writer, if the format can be written.
    fn create_writer(&self) -> Option<Arc<dyn DataWriter>>;
}

/// Registry of format factories, keyed by driver short name.
#[derive(Default)]
pub struct DriverRegistry {
    factories: RwLock<Vec<Arc<dyn FormatFactory>>>,
}

impl DriverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory, replacing any factory with the same driver name.
    pub fn register(&self, factory: Arc<dyn FormatFactory>) {
        let name = factory.driver().short_name;
        let mut factories = self.factories.write().unwrap_or_else(|e| e.into_inner());
        factories.retain(|f| !f.driver().short_name.eq_ignore_ascii_case(name));
        factories.push(factory);
    }

    /// Finds a factory by driver name (case-insensitive).
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Arc<dyn FormatFactory>> {
        let factories = self.factories.read().unwrap_or_else(|e| e.into_inner());
        factories
            .iter()
            .find(|f| f.driver().short_name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Returns the drivers of all registered factories.
    #[must_use]
    pub fn drivers(&self) -> Vec<Driver> {
        let factories = self.factories.read().unwrap_or_else(|e| e.into_inner());
        factories.iter().map(|f| f.driver()).collect()
    }
}

/// Returns the process-wide registry.
pub fn driver_registry() -> &'static DriverRegistry {
    static REGISTRY: OnceLock<DriverRegistry> = OnceLock::new();
    REGISTRY.get_or_init(DriverRegistry::new)
}
