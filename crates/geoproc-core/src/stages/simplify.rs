//! `simplify`: reduces the vertex count of lines and polygons.

use std::sync::Arc;

use geoproc_core_common::{Feature, Meta};

use super::{Operation, take_geometry};
use crate::error::{Result, TransformError, ValidationError};
use crate::geometry::simplify;
use crate::logging::RunLogger;
use crate::pool::{FeatureTransform, validate_jobs};

/// Options of the `simplify` stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplifySpec {
    pub tolerance: f64,
    pub preserve_topology: bool,
    pub jobs: usize,
}

impl SimplifySpec {
    #[must_use]
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            preserve_topology: true,
            jobs: 1,
        }
    }

    /// # Errors
    ///
    /// Returns a [`ValidationError`] for a negative tolerance or bad `jobs`.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ValidationError::InvalidOption {
                option: "--tolerance".to_string(),
                message: format!("must be a non-negative number, got {}", self.tolerance),
            });
        }
        validate_jobs(self.jobs).map(|_| ())
    }
}

impl Operation for SimplifySpec {
    fn name(&self) -> &'static str {
        "simplify"
    }

    fn jobs(&self) -> usize {
        self.jobs
    }

    fn prepare(&self, _meta: &mut Meta, logger: &RunLogger) -> Result<Arc<dyn FeatureTransform>> {
        tracing::info!(
            parent: logger.span(),
            tolerance = self.tolerance,
            preserve_topology = self.preserve_topology,
            "Simplifying features"
        );
        Ok(Arc::new(*self))
    }
}

impl FeatureTransform for SimplifySpec {
    fn apply(&self, mut feature: Feature) -> std::result::Result<Option<Feature>, TransformError> {
        let geometry = take_geometry(&mut feature, "simplify")?;
        feature.geometry = Some(simplify(&geometry, self.tolerance, self.preserve_topology));
        Ok(Some(feature))
    }
}
