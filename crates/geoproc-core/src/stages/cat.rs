//! `cat`: streams the features of a dataset into the pipeline.

use geoproc_core_common::{Crs, Feature, FeatureReader, Meta, ReadOptions};

use super::Stage;
use crate::crs::check_crs;
use crate::drivers::{detect_driver, open_reader, resolve_driver};
use crate::error::{Access, ProtocolError, Result, ValidationError, classify_format_error};
use crate::logging::RunLogger;
use crate::pipeline::RunContext;

/// Options of the `cat` stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatSpec {
    /// Dataset path, `-` for stdin.
    pub input: String,
    /// Driver to read with instead of the one the extension implies.
    pub driver: Option<String>,
    /// Read the input as a GeoJSON text sequence whatever its extension.
    pub sequence: bool,
    /// CRS to report instead of the dataset's own.
    pub crs: Option<Crs>,
}

impl CatSpec {
    #[must_use]
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            driver: None,
            sequence: false,
            crs: None,
        }
    }

    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidOption`] for a `--crs` that cannot be loaded.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        match &self.crs {
            Some(crs) => check_crs(crs).map_err(|e| ValidationError::InvalidOption {
                option: "--crs".to_string(),
                message: e.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Source stage reading a dataset through its format driver.
pub struct CatStage {
    spec: CatSpec,
    logger: RunLogger,
    driver: &'static str,
    reader: Option<Box<dyn FeatureReader>>,
    read: u64,
}

impl CatStage {
    #[must_use]
    pub fn new(spec: CatSpec, context: &RunContext) -> Self {
        Self {
            spec,
            logger: context.logger.stage("cat"),
            driver: "",
            reader: None,
            read: 0,
        }
    }
}

impl Stage for CatStage {
    fn name(&self) -> &str {
        "cat"
    }

    fn init(&mut self) -> Result<Meta> {
        let driver = match &self.spec.driver {
            Some(name) if !self.spec.sequence => resolve_driver(name)?,
            _ => detect_driver(&self.spec.input, self.spec.sequence)?,
        };
        let reader = open_reader(&self.spec.input, &driver, &ReadOptions::default())?;

        let mut meta = reader.meta().clone();
        if let Some(crs) = &self.spec.crs {
            meta.crs = Some(crs.clone());
        }
        tracing::info!(
            parent: self.logger.span(),
            input = %self.spec.input,
            driver = driver.short_name,
            geometry = %meta.schema.geometry,
            "Opened input"
        );

        self.driver = driver.short_name;
        self.reader = Some(reader);
        Ok(meta)
    }

    fn next(&mut self) -> Result<Option<Feature>> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(ProtocolError::IllegalState {
                stage: "cat".to_string(),
                state: "closed",
                operation: "read features",
            }
            .into());
        };

        match reader.next_feature() {
            Ok(Some(feature)) => {
                self.read += 1;
                Ok(Some(feature))
            },
            Ok(None) => {
                self.reader = None;
                tracing::info!(parent: self.logger.span(), features = self.read, "Input exhausted");
                Ok(None)
            },
            Err(e) => Err(classify_format_error(
                e,
                self.driver,
                &self.spec.input,
                Access::Read,
            )),
        }
    }
}
