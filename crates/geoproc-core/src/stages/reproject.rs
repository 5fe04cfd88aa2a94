//! `reproject`: transforms every geometry to another CRS.

use std::sync::Arc;

use geoproc_core_common::{Crs, Feature, GeometryType, Meta};

use super::{Operation, take_geometry};
use crate::crs::{CrsResolution, ReprojectOptions, Reprojector, check_crs};
use crate::error::{Result, TransformError, ValidationError};
use crate::logging::RunLogger;
use crate::pool::{FeatureTransform, validate_jobs};

/// Options of the `reproject` stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReprojectSpec {
    pub dst_crs: Crs,
    /// Overrides the CRS the stream declares.
    pub src_crs: Option<Crs>,
    pub clip_antimeridian: bool,
    /// Decimal places to keep; negative keeps full precision.
    pub precision: i32,
    pub jobs: usize,
}

impl ReprojectSpec {
    #[must_use]
    pub fn new(dst_crs: Crs) -> Self {
        Self {
            dst_crs,
            src_crs: None,
            clip_antimeridian: false,
            precision: -1,
            jobs: 1,
        }
    }

    /// # Errors
    ///
    /// Returns a [`ValidationError`] for an unsupported CRS or bad `jobs`.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        let invalid = |option: &str, e: TransformError| ValidationError::InvalidOption {
            option: option.to_string(),
            message: e.to_string(),
        };
        check_crs(&self.dst_crs).map_err(|e| invalid("--dst-crs", e))?;
        if let Some(src) = &self.src_crs {
            check_crs(src).map_err(|e| invalid("--src-crs", e))?;
        }
        validate_jobs(self.jobs).map(|_| ())
    }
}

impl Operation for ReprojectSpec {
    fn name(&self) -> &'static str {
        "reproject"
    }

    fn jobs(&self) -> usize {
        self.jobs
    }

    fn prepare(&self, meta: &mut Meta, logger: &RunLogger) -> Result<Arc<dyn FeatureTransform>> {
        let crs = CrsResolution::resolve(
            self.src_crs.as_ref(),
            None,
            Some(&self.dst_crs),
            meta.crs.as_ref(),
        );
        let source = crs.source().ok_or_else(|| ValidationError::MissingRequired {
            option: "--src-crs".to_string(),
        })?;

        let reprojector = Reprojector::new(
            source,
            &self.dst_crs,
            ReprojectOptions {
                antimeridian_cut: self.clip_antimeridian,
                precision: self.precision,
            },
        )
        .map_err(|e| ValidationError::InvalidOption {
            option: "--src-crs".to_string(),
            message: e.to_string(),
        })?;

        tracing::info!(
            parent: logger.span(),
            from = %source,
            to = %self.dst_crs,
            "Reprojecting features"
        );

        meta.crs = Some(self.dst_crs.clone());
        if reprojector.cuts_lines() && meta.schema.geometry == GeometryType::LineString {
            meta.schema.geometry = GeometryType::MultiLineString;
        }
        Ok(Arc::new(ReprojectTransform { reprojector }))
    }
}

struct ReprojectTransform {
    reprojector: Reprojector,
}

impl FeatureTransform for ReprojectTransform {
    fn apply(&self, mut feature: Feature) -> std::result::Result<Option<Feature>, TransformError> {
        let geometry = take_geometry(&mut feature, "reproject")?;
        feature.geometry = Some(self.reprojector.transform(&geometry)?);
        Ok(Some(feature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeoProcError;
    use crate::failure::FailurePolicy;
    use crate::pipeline::RunContext;
    use crate::stages::TransformStage;
    use crate::stages::testing::{VecSource, collect};
    use geo_types::{Geometry, Point, line_string};

    fn run(spec: ReprojectSpec, geometry: GeometryType, features: Vec<Feature>) -> Result<(Meta, Vec<Feature>)> {
        spec.validate()?;
        let mut stage = TransformStage::new(
            VecSource::boxed(geometry, features),
            Box::new(spec),
            &RunContext::new(FailurePolicy::Propagate, "test | reproject"),
        );
        collect(&mut stage)
    }

    #[test]
    fn sets_destination_crs() {
        let (meta, features) = run(
            ReprojectSpec::new(Crs::new("EPSG:3857")),
            GeometryType::Point,
            vec![Feature::new(Point::new(0.0, 0.0))],
        )
        .unwrap();

        assert_eq!(meta.crs, Some(Crs::new("EPSG:3857")));
        let Some(Geometry::Point(p)) = features[0].geometry else {
            panic!("expected a point");
        };
        assert!(p.x().abs() < 1e-6 && p.y().abs() < 1e-6);
    }

    #[test]
    fn antimeridian_cut_promotes_lines() {
        let mut spec = ReprojectSpec::new(Crs::new("EPSG:4326"));
        spec.clip_antimeridian = true;
        let crossing = line_string![(x: 170.0, y: 0.0), (x: -170.0, y: 0.0)];

        let (meta, features) = run(spec, GeometryType::LineString, vec![Feature::new(crossing)]).unwrap();

        assert_eq!(meta.schema.geometry, GeometryType::MultiLineString);
        let Some(Geometry::MultiLineString(parts)) = &features[0].geometry else {
            panic!("expected a MultiLineString");
        };
        assert_eq!(parts.0.len(), 2);
    }

    #[test]
    fn unknown_crs_is_a_validation_error() {
        let err = run(
            ReprojectSpec::new(Crs::new("EPSG:0")),
            GeometryType::Point,
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, GeoProcError::Validation(_)));
    }
}
