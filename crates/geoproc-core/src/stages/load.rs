//! `load`: writes the stream to a dataset.

use geoproc_core_common::{Feature, FeatureWriter, GeometryType, Meta, OpenMode, WriteOptions};
use geoproc_geojson::SEQUENCE_DRIVER;

use super::Sink;
use crate::drivers::{open_writer, resolve_driver};
use crate::error::{Access, ProtocolError, Result, classify_format_error};
use crate::logging::RunLogger;
use crate::pipeline::RunContext;

/// Options of the `load` stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSpec {
    /// Output path, `-` for stdout.
    pub output: String,
    /// Output driver; defaults to the stream's driver.
    pub driver: Option<String>,
    /// Geometry type to declare; defaults to the stream's.
    pub gtype: Option<GeometryType>,
    /// Write a GeoJSON text sequence.
    pub sequence: bool,
    /// Prefix sequence records with an RS byte.
    pub use_rs: bool,
    /// Add to an existing dataset instead of replacing it.
    pub append: bool,
}

impl LoadSpec {
    #[must_use]
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            driver: None,
            gtype: None,
            sequence: false,
            use_rs: false,
            append: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    Created,
    Open,
    Closed,
}

impl SinkState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Created => "not open",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

/// Sink writing features through a format driver.
pub struct LoadSink {
    spec: LoadSpec,
    logger: RunLogger,
    state: SinkState,
    driver: &'static str,
    writer: Option<Box<dyn FeatureWriter>>,
    written: u64,
}

impl LoadSink {
    #[must_use]
    pub fn new(spec: LoadSpec, context: &RunContext) -> Self {
        Self {
            spec,
            logger: context.logger.stage("load"),
            state: SinkState::Created,
            driver: "",
            writer: None,
            written: 0,
        }
    }

    /// Features written so far.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    fn illegal(&self, operation: &'static str) -> ProtocolError {
        ProtocolError::IllegalState {
            stage: "load".to_string(),
            state: self.state.as_str(),
            operation,
        }
    }
}

impl Sink for LoadSink {
    fn name(&self) -> &str {
        "load"
    }

    fn open(&mut self, mut meta: Meta) -> Result<Meta> {
        if self.state != SinkState::Created {
            return Err(self.illegal("open").into());
        }

        let driver_name = if self.spec.sequence {
            SEQUENCE_DRIVER.to_string()
        } else {
            self.spec.driver.clone().unwrap_or_else(|| meta.driver.clone())
        };
        let driver = resolve_driver(&driver_name)?;
        meta.driver = driver.short_name.to_string();
        if let Some(gtype) = self.spec.gtype {
            meta.schema.geometry = gtype;
        }

        let options = WriteOptions {
            mode: if self.spec.append {
                OpenMode::Append
            } else {
                OpenMode::Write
            },
            use_rs: self.spec.use_rs,
        };
        let writer = open_writer(&self.spec.output, &driver, &meta, &options)?;
        tracing::info!(
            parent: self.logger.span(),
            output = %self.spec.output,
            driver = driver.short_name,
            mode = options.mode.as_str(),
            geometry = %meta.schema.geometry,
            "Opened output"
        );

        self.driver = driver.short_name;
        self.writer = Some(writer);
        self.state = SinkState::Open;
        Ok(meta)
    }

    fn write(&mut self, feature: Feature) -> Result<()> {
        let Some(writer) = self.writer.as_mut().filter(|_| self.state == SinkState::Open) else {
            return Err(self.illegal("write").into());
        };
        writer
            .write_feature(&feature)
            .map_err(|e| classify_format_error(e, self.driver, &self.spec.output, Access::Write))?;
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.state != SinkState::Open {
            return Err(self.illegal("close").into());
        }
        self.state = SinkState::Closed;
        if let Some(writer) = self.writer.take() {
            writer
                .close()
                .map_err(|e| classify_format_error(e, self.driver, &self.spec.output, Access::Write))?;
        }
        tracing::info!(parent: self.logger.span(), features = self.written, "Closed output");
        Ok(())
    }
}
