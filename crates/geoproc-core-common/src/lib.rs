//! Common types and traits shared across `GeoProc` crates.
//!
//! This crate provides the data model and the format abstractions that are
//! shared between `geoproc-core` and format implementation crates, preventing
//! circular dependencies.

pub mod drivers;
pub mod factory;
pub mod io;
pub mod types;

// Re-export commonly used types
pub use drivers::{Driver, DriverCapabilities, SupportStatus};
pub use factory::{DriverRegistry, FormatFactory, driver_registry};
pub use io::{
    DataReader, DataWriter, FeatureReader, FeatureWriter, OpenMode, ReadOptions, STDIO_PATH,
    WriteOptions,
};
pub use types::{
    Crs, Feature, FeatureId, Field, FieldType, GeometryType, JsonObject, Meta, Schema,
    UnknownGeometryType,
};
