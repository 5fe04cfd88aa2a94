//! `GeoJSON` text sequences: one Feature per line, optionally prefixed with
//! an ASCII record separator (RFC 8142).
//!
//! The stream descriptor is never written; readers infer it from the first
//! record, and later records are not checked against it.

use std::io::{BufRead, BufWriter, ErrorKind, Write};

use format_shared::{SourcePosition, SpatialFormatError, SpatialFormatResult};
use geoproc_core_common::{
    Crs, Feature, FeatureReader, FeatureWriter, Meta, ReadOptions, WriteOptions,
};

use crate::parser::{feature_to_geojson, infer_meta, parse_record};
use crate::stream::{open_input, open_output};

/// Driver short name of `GeoJSON` text sequences.
pub const SEQUENCE_DRIVER: &str = "GeoJSONSeq";

/// Splits a byte stream into records, tracking line and record numbers.
struct RecordReader {
    input: Box<dyn BufRead>,
    context: String,
    line: u64,
    record: u64,
    buf: String,
}

impl RecordReader {
    fn new(input: Box<dyn BufRead>, context: String) -> Self {
        Self {
            input,
            context,
            line: 0,
            record: 0,
            buf: String::new(),
        }
    }

    fn next_feature(&mut self) -> SpatialFormatResult<Option<Feature>> {
        loop {
            self.buf.clear();
            let read = self.input.read_line(&mut self.buf).map_err(|err| {
                if err.kind() == ErrorKind::InvalidData {
                    SpatialFormatError::Parse {
                        message: "GeoJSON line is not valid UTF-8".to_string(),
                        position: Some(SourcePosition {
                            line: Some(self.line + 1),
                            record: None,
                        }),
                        context: Some(self.context.clone()),
                    }
                } else {
                    SpatialFormatError::io(err, self.context.clone())
                }
            })?;
            if read == 0 {
                return Ok(None);
            }
            self.line += 1;

            let position = SourcePosition::at(self.line, self.record + 1);
            let parsed = parse_record(&self.buf, &position)
                .map_err(|e| e.with_additional_context(self.context.clone()))?;
            if let Some(feature) = parsed {
                self.record += 1;
                return Ok(Some(feature));
            }
        }
    }
}

/// Lazy reader over a `GeoJSON` text sequence.
pub struct GeoJsonSeqReader {
    records: RecordReader,
    meta: Meta,
    pending: Option<Feature>,
}

impl GeoJsonSeqReader {
    /// Opens `path` (stdin for `"-"`) and reads the first record to infer
    /// the stream descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be opened, the first record
    /// cannot be parsed, or the stream holds no features.
    pub fn open(path: &str, options: &ReadOptions) -> SpatialFormatResult<Self> {
        Self::from_reader(open_input(path)?, path, options)
    }

    /// Wraps an already-open byte stream.
    ///
    /// # Errors
    ///
    /// Same as [`GeoJsonSeqReader::open`], minus opening the path.
    pub fn from_reader(
        input: Box<dyn BufRead>,
        context: &str,
        options: &ReadOptions,
    ) -> SpatialFormatResult<Self> {
        let mut records = RecordReader::new(input, context.to_string());
        let first = records
            .next_feature()?
            .ok_or_else(|| SpatialFormatError::SchemaInference {
                message: "no features to infer a schema from".to_string(),
                context: Some(context.to_string()),
            })?;

        let crs = options.default_crs.clone().unwrap_or_else(Crs::wgs84);
        let meta = infer_meta(SEQUENCE_DRIVER, &first, Some(crs))
            .map_err(|e| e.with_additional_context(context))?;
        log::debug!(
            "Inferred {} schema with {} properties from {context}",
            meta.schema.geometry,
            meta.schema.properties.len()
        );

        Ok(Self {
            records,
            meta,
            pending: Some(first),
        })
    }
}

impl FeatureReader for GeoJsonSeqReader {
    fn meta(&self) -> &Meta {
        &self.meta
    }

    fn next_feature(&mut self) -> anyhow::Result<Option<Feature>> {
        if let Some(first) = self.pending.take() {
            return Ok(Some(first));
        }
        Ok(self.records.next_feature()?)
    }
}

/// Writer of `GeoJSON` text sequences.
pub struct GeoJsonSeqWriter {
    output: BufWriter<Box<dyn Write>>,
    use_rs: bool,
    context: String,
    written: u64,
}

impl GeoJsonSeqWriter {
    /// Creates (or appends to) `path`; stdout for `"-"`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be opened for writing.
    pub fn create(path: &str, options: &WriteOptions) -> SpatialFormatResult<Self> {
        let output = open_output(path, options.mode, SEQUENCE_DRIVER)?;
        log::debug!(
            "Opened {path} for {} (record separator: {})",
            options.mode.as_str(),
            options.use_rs
        );
        Ok(Self::from_writer(output, path, options.use_rs))
    }

    /// Wraps an already-open output.
    #[must_use]
    pub fn from_writer(output: BufWriter<Box<dyn Write>>, context: &str, use_rs: bool) -> Self {
        Self {
            output,
            use_rs,
            context: context.to_string(),
            written: 0,
        }
    }

    fn write_record(&mut self, feature: &Feature) -> SpatialFormatResult<()> {
        if self.use_rs {
            self.output
                .write_all(&[0x1e])
                .map_err(|e| SpatialFormatError::io(e, self.context.clone()))?;
        }
        serde_json::to_writer(&mut self.output, &feature_to_geojson(feature)).map_err(|err| {
            SpatialFormatError::Encode {
                message: format!("feature {}: {err}", feature.id_label()),
            }
        })?;
        self.output
            .write_all(b"\n")
            .map_err(|e| SpatialFormatError::io(e, self.context.clone()))?;
        self.written += 1;
        Ok(())
    }
}

impl FeatureWriter for GeoJsonSeqWriter {
    fn write_feature(&mut self, feature: &Feature) -> anyhow::Result<()> {
        Ok(self.write_record(feature)?)
    }

    fn close(mut self: Box<Self>) -> anyhow::Result<()> {
        self.output
            .flush()
            .map_err(|e| SpatialFormatError::io(e, self.context.clone()))?;
        log::info!("Wrote {} features to {}", self.written, self.context);
        Ok(())
    }
}
