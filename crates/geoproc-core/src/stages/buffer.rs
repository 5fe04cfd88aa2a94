//! `buffer`: replaces every geometry with its buffer.
//!
//! Geometries are reprojected from the source CRS to the buffer CRS,
//! buffered there, then reprojected to the destination CRS. Unset CRSs fall
//! back along `source -> buffer -> destination`, see [`CrsResolution`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use geo_types::{Geometry, MultiPolygon};
use geoproc_core_common::{Crs, Feature, GeometryType, Meta};
use serde_json::Value;

use super::{Operation, take_geometry};
use crate::crs::{CrsResolution, ReprojectOptions, Reprojector, check_crs};
use crate::error::{Result, TransformError, ValidationError};
use crate::geometry::{BufferParams, buffer};
use crate::logging::RunLogger;
use crate::pool::{FeatureTransform, validate_jobs};

/// Buffer distance: a constant or the name of a numeric property.
#[derive(Debug, Clone, PartialEq)]
pub enum Distance {
    Value(f64),
    Field(String),
}

impl FromStr for Distance {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::InvalidOption {
                option: "--dist".to_string(),
                message: "expected a number or a property name".to_string(),
            });
        }
        Ok(s.parse::<f64>()
            .map_or_else(|_| Self::Field(s.to_string()), Self::Value))
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            Self::Field(name) => write!(f, "{name}"),
        }
    }
}

impl Distance {
    fn resolve(&self, feature: &Feature) -> std::result::Result<f64, TransformError> {
        let name = match self {
            Self::Value(v) => return Ok(*v),
            Self::Field(name) => name,
        };
        let value = match feature.property(name) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        value.ok_or_else(|| TransformError::Geometry {
            operation: "buffer",
            message: format!("property '{name}' does not hold a numeric distance"),
        })
    }
}

/// Options of the `buffer` stage.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferSpec {
    pub distance: Distance,
    pub params: BufferParams,
    pub src_crs: Option<Crs>,
    pub buf_crs: Option<Crs>,
    pub dst_crs: Option<Crs>,
    /// `Polygon` or `MultiPolygon`.
    pub otype: GeometryType,
    pub jobs: usize,
}

impl BufferSpec {
    #[must_use]
    pub fn new(distance: Distance) -> Self {
        Self {
            distance,
            params: BufferParams::default(),
            src_crs: None,
            buf_crs: None,
            dst_crs: None,
            otype: GeometryType::MultiPolygon,
            jobs: 1,
        }
    }

    /// Checks option values before the pipeline opens anything.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for an invalid option.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if !matches!(self.otype, GeometryType::Polygon | GeometryType::MultiPolygon) {
            return Err(ValidationError::InvalidOption {
                option: "--otype".to_string(),
                message: format!("must be Polygon or MultiPolygon, got {}", self.otype),
            });
        }
        if let Distance::Value(d) = self.distance {
            if !d.is_finite() {
                return Err(ValidationError::InvalidOption {
                    option: "--dist".to_string(),
                    message: format!("{d} is not a finite distance"),
                });
            }
        }
        if !self.params.mitre_limit.is_finite() || self.params.mitre_limit < 1.0 {
            return Err(ValidationError::InvalidOption {
                option: "--mitre-limit".to_string(),
                message: format!("must be at least 1.0, got {}", self.params.mitre_limit),
            });
        }
        for (option, crs) in [
            ("--src-crs", &self.src_crs),
            ("--buf-crs", &self.buf_crs),
            ("--dst-crs", &self.dst_crs),
        ] {
            if let Some(crs) = crs {
                check_crs(crs).map_err(|e| ValidationError::InvalidOption {
                    option: option.to_string(),
                    message: e.to_string(),
                })?;
            }
        }
        validate_jobs(self.jobs)?;
        Ok(())
    }
}

/// Reprojector between two resolved CRSs; `options` names the option each
/// side came from, for errors.
fn reprojector(
    from: Option<&Crs>,
    to: Option<&Crs>,
    options: (&str, &str),
) -> Result<Option<Reprojector>> {
    match (from, to) {
        (Some(from), Some(to)) if from != to => {
            let reprojector =
                Reprojector::new(from, to, ReprojectOptions::default()).map_err(|e| {
                    let option = if check_crs(from).is_err() {
                        options.0
                    } else {
                        options.1
                    };
                    ValidationError::InvalidOption {
                        option: option.to_string(),
                        message: e.to_string(),
                    }
                })?;
            Ok(Some(reprojector))
        },
        (None, Some(_)) => Err(ValidationError::MissingRequired {
            option: "--src-crs".to_string(),
        }
        .into()),
        _ => Ok(None),
    }
}

impl Operation for BufferSpec {
    fn name(&self) -> &'static str {
        "buffer"
    }

    fn jobs(&self) -> usize {
        self.jobs
    }

    fn prepare(&self, meta: &mut Meta, logger: &RunLogger) -> Result<Arc<dyn FeatureTransform>> {
        let crs = CrsResolution::resolve(
            self.src_crs.as_ref(),
            self.buf_crs.as_ref(),
            self.dst_crs.as_ref(),
            meta.crs.as_ref(),
        );
        let to_working = reprojector(crs.source(), crs.working(), ("--src-crs", "--buf-crs"))?;
        let to_destination =
            reprojector(crs.working(), crs.destination(), ("--buf-crs", "--dst-crs"))?;
        if let Distance::Field(name) = &self.distance {
            if meta.schema.field(name).is_none() {
                tracing::warn!(
                    parent: logger.span(),
                    field = %name,
                    "Distance property is not in the input schema"
                );
            }
        }

        tracing::info!(
            parent: logger.span(),
            distance = %self.distance,
            working_crs = crs.working().map_or("unknown", Crs::as_str),
            otype = %self.otype,
            "Buffering features"
        );

        meta.crs = crs.destination().cloned();
        meta.schema.geometry = self.otype;

        Ok(Arc::new(BufferTransform {
            distance: self.distance.clone(),
            params: self.params,
            to_working,
            to_destination,
            single_part: self.otype == GeometryType::Polygon,
        }))
    }
}

struct BufferTransform {
    distance: Distance,
    params: BufferParams,
    to_working: Option<Reprojector>,
    to_destination: Option<Reprojector>,
    single_part: bool,
}

impl FeatureTransform for BufferTransform {
    fn apply(&self, mut feature: Feature) -> std::result::Result<Option<Feature>, TransformError> {
        let distance = self.distance.resolve(&feature)?;
        let mut geometry = take_geometry(&mut feature, "buffer")?;

        if let Some(reprojector) = &self.to_working {
            geometry = reprojector.transform(&geometry)?;
        }
        let mut buffered = Geometry::MultiPolygon(buffer(&geometry, distance, &self.params)?);
        if let Some(reprojector) = &self.to_destination {
            buffered = reprojector.transform(&buffered)?;
        }

        feature.geometry = Some(if self.single_part {
            into_single_polygon(buffered)?
        } else {
            buffered
        });
        Ok(Some(feature))
    }
}

fn into_single_polygon(geometry: Geometry<f64>) -> std::result::Result<Geometry<f64>, TransformError> {
    match geometry {
        Geometry::MultiPolygon(MultiPolygon(mut parts)) if parts.len() == 1 => {
            Ok(Geometry::Polygon(parts.remove(0)))
        },
        Geometry::MultiPolygon(MultiPolygon(parts)) => Err(TransformError::Geometry {
            operation: "buffer",
            message: format!(
                "buffer has {} parts and cannot be written as a Polygon",
                parts.len()
            ),
        }),
        other => Ok(other),
    }
}
