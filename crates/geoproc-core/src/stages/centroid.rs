//! `centroid`: replaces every geometry with its centroid.

use std::sync::Arc;

use geo_types::Geometry;
use geoproc_core_common::{Feature, GeometryType, Meta};

use super::{Operation, take_geometry};
use crate::error::{Result, TransformError, ValidationError};
use crate::geometry::centroid;
use crate::logging::RunLogger;
use crate::pool::{FeatureTransform, validate_jobs};

/// Options of the `centroid` stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CentroidSpec {
    pub jobs: usize,
}

impl Default for CentroidSpec {
    fn default() -> Self {
        Self { jobs: 1 }
    }
}

impl CentroidSpec {
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for an out-of-range `jobs`.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        validate_jobs(self.jobs).map(|_| ())
    }
}

impl Operation for CentroidSpec {
    fn name(&self) -> &'static str {
        "centroid"
    }

    fn jobs(&self) -> usize {
        self.jobs
    }

    fn prepare(&self, meta: &mut Meta, _logger: &RunLogger) -> Result<Arc<dyn FeatureTransform>> {
        meta.schema.geometry = GeometryType::Point;
        Ok(Arc::new(CentroidTransform))
    }
}

struct CentroidTransform;

impl FeatureTransform for CentroidTransform {
    fn apply(&self, mut feature: Feature) -> std::result::Result<Option<Feature>, TransformError> {
        let geometry = take_geometry(&mut feature, "centroid")?;
        feature.geometry = Some(Geometry::Point(centroid(&geometry)?));
        Ok(Some(feature))
    }
}
