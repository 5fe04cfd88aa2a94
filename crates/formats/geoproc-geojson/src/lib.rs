//! `GeoJSON` support for `GeoProc`: FeatureCollection files and `GeoJSON`
//! text sequences, both streamed one feature at a time.

pub mod collection;
pub mod factory;
pub mod parser;
pub mod sequence;
mod stream;

pub use collection::{COLLECTION_DRIVER, GeoJsonReader, GeoJsonWriter};
pub use factory::{GeoJsonFormatFactory, GeoJsonSeqFormatFactory, register_geojson_formats};
pub use parser::{RECORD_SEPARATOR, feature_from_geojson, feature_to_geojson, parse_record};
pub use sequence::{GeoJsonSeqReader, GeoJsonSeqWriter, SEQUENCE_DRIVER};
