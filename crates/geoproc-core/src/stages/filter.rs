//! `filter`: keeps features matching every expression and a bounding box.

use std::sync::Arc;

use geo::{BoundingRect, Intersects};
use geo_types::{Rect, coord};
use geoproc_core_common::{Feature, Meta};

use super::Operation;
use crate::error::{Result, TransformError, ValidationError};
use crate::logging::RunLogger;
use crate::pool::{FeatureTransform, validate_jobs};
use crate::predicate::Predicate;

/// Options of the `filter` stage.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    /// Expressions, all of which must hold.
    pub expressions: Vec<String>,
    /// `[xmin, ymin, xmax, ymax]` the feature bounds must intersect.
    pub bbox: Option<[f64; 4]>,
    pub jobs: usize,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            expressions: Vec::new(),
            bbox: None,
            jobs: 1,
        }
    }
}

impl FilterSpec {
    /// Validates the bbox and compiles the expressions.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for an inverted bbox, an expression that
    /// does not compile, or bad `jobs`.
    pub fn compile(&self) -> std::result::Result<Vec<Predicate>, ValidationError> {
        if let Some(bbox) = self.bbox {
            let [xmin, ymin, xmax, ymax] = bbox;
            if xmin > xmax || ymin > ymax {
                return Err(ValidationError::InvalidOption {
                    option: "--bbox".to_string(),
                    message: format!("self-intersection: ({xmin}, {ymin}, {xmax}, {ymax})"),
                });
            }
        }
        validate_jobs(self.jobs)?;
        self.expressions
            .iter()
            .map(|e| Predicate::compile(e))
            .collect()
    }
}

/// A [`FilterSpec`] with its expressions compiled.
pub(crate) struct FilterOperation {
    predicates: Vec<Predicate>,
    bbox: Option<Rect<f64>>,
    jobs: usize,
}

impl FilterOperation {
    pub(crate) fn new(spec: &FilterSpec) -> std::result::Result<Self, ValidationError> {
        Ok(Self {
            predicates: spec.compile()?,
            bbox: spec.bbox.map(|[xmin, ymin, xmax, ymax]| {
                Rect::new(coord! { x: xmin, y: ymin }, coord! { x: xmax, y: ymax })
            }),
            jobs: spec.jobs,
        })
    }
}

impl Operation for FilterOperation {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn jobs(&self) -> usize {
        self.jobs
    }

    fn prepare(&self, _meta: &mut Meta, logger: &RunLogger) -> Result<Arc<dyn FeatureTransform>> {
        tracing::info!(
            parent: logger.span(),
            expressions = self.predicates.len(),
            bbox = self.bbox.is_some(),
            "Filtering features"
        );
        Ok(Arc::new(FilterTransform {
            predicates: self.predicates.clone(),
            bbox: self.bbox,
        }))
    }
}

struct FilterTransform {
    predicates: Vec<Predicate>,
    bbox: Option<Rect<f64>>,
}

impl FilterTransform {
    fn in_bbox(&self, feature: &Feature) -> bool {
        let Some(bbox) = &self.bbox else {
            return true;
        };
        feature
            .geometry
            .as_ref()
            .and_then(|g| g.bounding_rect())
            .is_some_and(|bounds| bounds.intersects(bbox))
    }
}

impl FeatureTransform for FilterTransform {
    fn apply(&self, feature: Feature) -> std::result::Result<Option<Feature>, TransformError> {
        if !self.in_bbox(&feature) {
            return Ok(None);
        }
        for predicate in &self.predicates {
            if !predicate.test(&feature)? {
                return Ok(None);
            }
        }
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
    use geo_types::Point;
    use geoproc_core_common::GeometryType;

    fn cities() -> Vec<Feature> {
        vec![
            Feature::new(Point::new(-74.0, 40.7))
                .with_property("name", "New York")
                .with_property("population", 8_336_817),
            Feature::new(Point::new(-118.2, 34.1))
                .with_property("name", "Los Angeles")
                .with_property("population", 3_979_576),
            Feature::new(Point::new(2.35, 48.86))
                .with_property("name", "Paris")
                .with_property("population", 2_148_000),
        ]
    }

    fn names(spec: &FilterSpec, policy: FailurePolicy) -> Result<Vec<String>> {
        let mut stage = TransformStage::new(
            VecSource::boxed(GeometryType::Point, cities()),
            Box::new(FilterOperation::new(spec)?),
            &RunContext::new(policy, "test | filter"),
        );
        let (_, features) = collect(&mut stage)?;
        Ok(features
            .iter()
            .filter_map(|f| f.property("name").and_then(|v| v.as_str()).map(String::from))
            .collect())
    }

    #[test]
    fn expressions_are_all_required() {
        let spec = FilterSpec {
            expressions: vec![
                "population > 3000000".to_string(),
                "name != 'Los Angeles'".to_string(),
            ],
            ..FilterSpec::default()
        };
        assert_eq!(names(&spec, FailurePolicy::Propagate).unwrap(), vec!["New York"]);
    }

    #[test]
    fn bbox_keeps_intersecting_features() {
        let spec = FilterSpec {
            bbox: Some([-10.0, 40.0, 10.0, 60.0]),
            ..FilterSpec::default()
        };
        assert_eq!(names(&spec, FailurePolicy::Propagate).unwrap(), vec!["Paris"]);
    }

    #[test]
    fn inverted_bbox_is_rejected() {
        let spec = FilterSpec {
            bbox: Some([10.0, 0.0, -10.0, 5.0]),
            ..FilterSpec::default()
        };
        let err = spec.compile().unwrap_err();
        assert!(err.to_string().contains("self-intersection"));
    }

    #[test]
    fn evaluation_errors_follow_the_policy() {
        let spec = FilterSpec {
            expressions: vec!["name > 5".to_string()],
            ..FilterSpec::default()
        };
        assert!(names(&spec, FailurePolicy::Skip).unwrap().is_empty());
        assert!(matches!(
            names(&spec, FailurePolicy::Propagate),
            Err(GeoProcError::Transform(TransformError::Predicate { .. }))
        ));
    }
}
