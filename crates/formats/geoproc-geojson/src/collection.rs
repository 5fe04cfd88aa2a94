//! `GeoJSON` FeatureCollection files, read and written one feature at a time.

use std::io::{BufWriter, Write};

use format_shared::{SourcePosition, SpatialFormatError, SpatialFormatResult};
use geoproc_core_common::{
    Crs, Feature, FeatureReader, FeatureWriter, Meta, OpenMode, ReadOptions, WriteOptions,
};

use crate::parser::{feature_from_geojson, feature_to_geojson, infer_meta};
use crate::stream::{open_input, open_output};

/// Driver short name of `GeoJSON` FeatureCollection files.
pub const COLLECTION_DRIVER: &str = "GeoJSON";

type GeoJsonFeatures = Box<dyn Iterator<Item = geojson::Result<geojson::Feature>>>;

/// Lazy reader over the features of a FeatureCollection.
///
/// RFC 7946 drops the `crs` member, so the reported CRS is always the
/// requested default, or `EPSG:4326`.
pub struct GeoJsonReader {
    features: GeoJsonFeatures,
    context: String,
    meta: Meta,
    pending: Option<Feature>,
    record: u64,
}

impl GeoJsonReader {
    /// Opens `path` (stdin for `"-"`) and reads the first feature.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be opened, the first feature
    /// cannot be parsed, or the collection is empty.
    pub fn open(path: &str, options: &ReadOptions) -> SpatialFormatResult<Self> {
        let input = open_input(path)?;
        let mut features: GeoJsonFeatures =
            Box::new(geojson::FeatureReader::from_reader(input).features());

        let mut record = 0;
        let first = read_feature(&mut features, &mut record, path)?.ok_or_else(|| {
            SpatialFormatError::SchemaInference {
                message: "FeatureCollection holds no features".to_string(),
                context: Some(path.to_string()),
            }
        })?;
        let crs = options.default_crs.clone().unwrap_or_else(Crs::wgs84);
        let meta = infer_meta(COLLECTION_DRIVER, &first, Some(crs))
            .map_err(|e| e.with_additional_context(path))?;

        Ok(Self {
            features,
            context: path.to_string(),
            meta,
            pending: Some(first),
            record,
        })
    }
}

fn read_feature(
    features: &mut GeoJsonFeatures,
    record: &mut u64,
    context: &str,
) -> SpatialFormatResult<Option<Feature>> {
    let Some(next) = features.next() else {
        return Ok(None);
    };
    *record += 1;
    let position = SourcePosition {
        line: None,
        record: Some(*record),
    };

    let feature = next.map_err(|err| SpatialFormatError::Parse {
        message: format!("Failed to parse GeoJSON feature: {err}"),
        position: Some(position.clone()),
        context: Some(context.to_string()),
    })?;
    feature_from_geojson(feature, Some(&position))
        .map(Some)
        .map_err(|e| e.with_additional_context(context))
}

impl FeatureReader for GeoJsonReader {
    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn next_feature(&mut self) -> anyhow::Result<Option<Feature>> {
        if let Some(first) = self.pending.take() {
            return Ok(Some(first));
        }
        Ok(read_feature(
            &mut self.features,
            &mut self.record,
            &self.context,
        )?)
    }
}

/// Streaming FeatureCollection writer.
pub struct GeoJsonWriter {
    writer: geojson::FeatureWriter<BufWriter<Box<dyn Write>>>,
    context: String,
    written: u64,
}

impl GeoJsonWriter {
    /// Creates `path` (stdout for `"-"`). Appending is not supported: a
    /// FeatureCollection cannot grow without rewriting its closing bracket.
    ///
    /// # Errors
    ///
    /// Returns an error for append mode or if the path cannot be created.
    pub fn create(path: &str, options: &WriteOptions) -> SpatialFormatResult<Self> {
        if options.mode == OpenMode::Append {
            return Err(SpatialFormatError::Unsupported {
                format: COLLECTION_DRIVER.to_string(),
                operation: "append".to_string(),
            });
        }
        let output = open_output(path, options.mode, COLLECTION_DRIVER)?;
        Ok(Self {
            writer: geojson::FeatureWriter::from_writer(output),
            context: path.to_string(),
            written: 0,
        })
    }

    fn encode_error(&self, err: geojson::Error) -> SpatialFormatError {
        match err {
            geojson::Error::Io(source) => SpatialFormatError::io(source, self.context.clone()),
            other => SpatialFormatError::Encode {
                message: format!("{other} ({})", self.context),
            },
        }
    }
}

impl FeatureWriter for GeoJsonWriter {
    fn write_feature(&mut self, feature: &Feature) -> anyhow::Result<()> {
        self.writer
            .write_feature(&feature_to_geojson(feature))
            .map_err(|e| self.encode_error(e))?;
        self.written += 1;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> anyhow::Result<()> {
        self.writer.finish().map_err(|e| self.encode_error(e))?;
        self.writer.flush().map_err(|e| self.encode_error(e))?;
        log::info!("Wrote {} features to {}", self.written, self.context);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Point;
    use geoproc_core_common::GeometryType;

    fn write_collection(path: &str, features: &[Feature]) {
        let mut writer: Box<dyn FeatureWriter> =
            Box::new(GeoJsonWriter::create(path, &WriteOptions::default()).expect("create"));
        for feature in features {
            writer.write_feature(feature).expect("write");
        }
        writer.close().expect("close");
    }

    #[test]
    fn collection_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cities.geojson");
        let path = path.to_str().expect("utf8 path");

        let features = vec![
            Feature::new(Point::new(7.42, 43.74))
                .with_id("mc")
                .with_property("name", "Monaco"),
            Feature::new(Point::new(12.45, 41.9))
                .with_id("va")
                .with_property("name", "Vatican City"),
        ];
        write_collection(path, &features);

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).expect("read")).expect("json");
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["features"].as_array().unwrap().len(), 2);

        let mut reader = GeoJsonReader::open(path, &ReadOptions::default()).expect("open");
        assert_eq!(reader.meta().driver, COLLECTION_DRIVER);
        assert_eq!(reader.meta().crs, Some(Crs::wgs84()));
        assert_eq!(reader.meta().schema.geometry, GeometryType::Point);

        let mut read = Vec::new();
        while let Some(f) = reader.next_feature().expect("next") {
            read.push(f);
        }
        assert_eq!(read, features);
    }

    #[test]
    fn empty_collection_cannot_infer_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.geojson");
        let path = path.to_str().expect("utf8 path");
        write_collection(path, &[]);

        let err = GeoJsonReader::open(path, &ReadOptions::default())
            .err()
            .expect("error");
        assert!(matches!(err, SpatialFormatError::SchemaInference { .. }));
    }

    #[test]
    fn append_is_unsupported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.geojson");
        let err = GeoJsonWriter::create(
            path.to_str().expect("utf8 path"),
            &WriteOptions {
                mode: OpenMode::Append,
                use_rs: false,
            },
        )
        .err()
        .expect("error");
        assert!(matches!(err, SpatialFormatError::Unsupported { .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = GeoJsonReader::open("/definitely/not/here.geojson", &ReadOptions::default())
            .err()
            .expect("error");
        assert!(matches!(err, SpatialFormatError::Io { .. }));
    }
}
