//! Factory implementations for `GeoJSON` format support.
//!
//! These implement the `FormatFactory` trait to integrate both `GeoJSON`
//! flavours with the dynamic driver registry.

use std::sync::Arc;

use anyhow::Result;
use geoproc_core_common::{
    DataReader, DataWriter, Driver, DriverCapabilities, FeatureReader, FeatureWriter,
    FormatFactory, Meta, ReadOptions, SupportStatus, WriteOptions,
};

use crate::collection::{COLLECTION_DRIVER, GeoJsonReader, GeoJsonWriter};
use crate::sequence::{GeoJsonSeqReader, GeoJsonSeqWriter, SEQUENCE_DRIVER};

/// Reader implementation for `GeoJSON` FeatureCollections.
struct CollectionReader;

impl DataReader for CollectionReader {
    fn open(&self, path: &str, options: &ReadOptions) -> Result<Box<dyn FeatureReader>> {
        Ok(Box::new(GeoJsonReader::open(path, options)?))
    }
}

/// Writer implementation for `GeoJSON` FeatureCollections.
struct CollectionWriter;

impl DataWriter for CollectionWriter {
    fn create(
        &self,
        path: &str,
        _meta: &Meta,
        options: &WriteOptions,
    ) -> Result<Box<dyn FeatureWriter>> {
        Ok(Box::new(GeoJsonWriter::create(path, options)?))
    }
}

/// Factory for creating `GeoJSON` readers and writers.
pub struct GeoJsonFormatFactory;

impl FormatFactory for GeoJsonFormatFactory {
    fn driver(&self) -> Driver {
        Driver::new(
            COLLECTION_DRIVER,
            "GeoJSON",
            &["geojson", "json"],
            DriverCapabilities {
                info: SupportStatus::Supported,
                read: SupportStatus::Supported,
                write: SupportStatus::Supported,
                append: SupportStatus::NotSupported,
            },
        )
    }

    fn create_reader(&self) -> Option<Arc<dyn DataReader>> {
        Some(Arc::new(CollectionReader))
    }

    fn create_writer(&self) -> Option<Arc<dyn DataWriter>> {
        Some(Arc::new(CollectionWriter))
    }
}

struct SequenceReader;

impl DataReader for SequenceReader {
    fn open(&self, path: &str, options: &ReadOptions) -> Result<Box<dyn FeatureReader>> {
        Ok(Box::new(GeoJsonSeqReader::open(path, options)?))
    }
}

struct SequenceWriter;

impl DataWriter for SequenceWriter {
    fn create(
        &self,
        path: &str,
        _meta: &Meta,
        options: &WriteOptions,
    ) -> Result<Box<dyn FeatureWriter>> {
        Ok(Box::new(GeoJsonSeqWriter::create(path, options)?))
    }
}

/// Factory for `GeoJSON` text sequences (newline-delimited `GeoJSON`).
pub struct GeoJsonSeqFormatFactory;

impl FormatFactory for GeoJsonSeqFormatFactory {
    fn driver(&self) -> Driver {
        Driver::new(
            SEQUENCE_DRIVER,
            "GeoJSON text sequence",
            &["geojsonl", "geojsons", "geojsonseq", "ndjson"],
            DriverCapabilities {
                info: SupportStatus::Supported,
                read: SupportStatus::Supported,
                write: SupportStatus::Supported,
                append: SupportStatus::Supported,
            },
        )
    }

    fn create_reader(&self) -> Option<Arc<dyn DataReader>> {
        Some(Arc::new(SequenceReader))
    }

    fn create_writer(&self) -> Option<Arc<dyn DataWriter>> {
        Some(Arc::new(SequenceWriter))
    }
}

/// Registers both `GeoJSON` formats with the global driver registry.
///
/// This is called by `geoproc-core` during initialization.
pub fn register_geojson_formats() {
    let registry = geoproc_core_common::driver_registry();
    registry.register(Arc::new(GeoJsonFormatFactory));
    registry.register(Arc::new(GeoJsonSeqFormatFactory));
}
