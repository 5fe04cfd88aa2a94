//! Geometry operations used by the transform stages.

use std::f64::consts::FRAC_PI_2;
use std::fmt;
use std::str::FromStr;

use geo::algorithm::buffer::{Buffer, BufferStyle, LineCap, LineJoin};
use geo::{Centroid, Simplify, SimplifyVwPreserve};
use geo_types::{Geometry, MultiPolygon, Point};

use crate::error::TransformError;

/// How the ends of buffered lines are shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapStyle {
    Flat,
    #[default]
    Round,
    Square,
}

impl FromStr for CapStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flat" => Ok(Self::Flat),
            "round" => Ok(Self::Round),
            "square" => Ok(Self::Square),
            other => Err(format!("unknown cap style '{other}' (flat, round, square)")),
        }
    }
}

impl fmt::Display for CapStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Flat => "flat",
            Self::Round => "round",
            Self::Square => "square",
        })
    }
}

/// How buffered edges meet at vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinStyle {
    #[default]
    Round,
    Mitre,
    Bevel,
}

impl FromStr for JoinStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "round" => Ok(Self::Round),
            "mitre" | "miter" => Ok(Self::Mitre),
            "bevel" => Ok(Self::Bevel),
            other => Err(format!("unknown join style '{other}' (round, mitre, bevel)")),
        }
    }
}

impl fmt::Display for JoinStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Round => "round",
            Self::Mitre => "mitre",
            Self::Bevel => "bevel",
        })
    }
}

/// Buffer parameters other than the distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferParams {
    pub cap_style: CapStyle,
    pub join_style: JoinStyle,
    /// Segments per quarter circle for round caps and joins.
    pub resolution: u32,
    /// Ratio of mitre length to buffer distance above which mitres are beveled.
    pub mitre_limit: f64,
}

impl Default for BufferParams {
    fn default() -> Self {
        Self {
            cap_style: CapStyle::Round,
            join_style: JoinStyle::Round,
            resolution: 16,
            mitre_limit: 5.0,
        }
    }
}

impl BufferParams {
    fn style(&self, distance: f64) -> BufferStyle<f64> {
        let arc_step = FRAC_PI_2 / f64::from(self.resolution.max(1));
        let cap = match self.cap_style {
            CapStyle::Flat => LineCap::Butt,
            CapStyle::Round => LineCap::Round(arc_step),
            CapStyle::Square => LineCap::Square,
        };
        let join = match self.join_style {
            JoinStyle::Round => LineJoin::Round(arc_step),
            JoinStyle::Bevel => LineJoin::Bevel,
            JoinStyle::Mitre => {
                // Corners sharper than this angle exceed the limit.
                let limit = self.mitre_limit.max(1.0);
                LineJoin::Miter(2.0 * (1.0 / limit).asin())
            },
        };
        BufferStyle::new(distance).line_cap(cap).line_join(join)
    }
}

/// Buffers a geometry by `distance`.
///
/// A zero or negative distance around points and lines yields an empty
/// `MultiPolygon`.
///
/// # Errors
///
/// Returns [`TransformError::Geometry`] for a non-finite distance.
pub fn buffer(
    geometry: &Geometry<f64>,
    distance: f64,
    params: &BufferParams,
) -> Result<MultiPolygon<f64>, TransformError> {
    if !distance.is_finite() {
        return Err(TransformError::Geometry {
            operation: "buffer",
            message: format!("distance {distance} is not finite"),
        });
    }
    Ok(geometry.buffer_with_style(params.style(distance)))
}

/// Returns the centroid of a geometry.
///
/// # Errors
///
/// Returns [`TransformError::Geometry`] for empty geometries, which have none.
pub fn centroid(geometry: &Geometry<f64>) -> Result<Point<f64>, TransformError> {
    geometry.centroid().ok_or_else(|| TransformError::Geometry {
        operation: "centroid",
        message: "empty geometry has no centroid".to_string(),
    })
}

/// Simplifies lines and polygons; points and collections come back unchanged.
///
/// Without topology preservation this is Ramer-Douglas-Peucker with
/// `tolerance` as the distance threshold. With it, Visvalingam-Whyatt with
/// topology preservation and `tolerance²` as the area threshold.
#[must_use]
pub fn simplify(geometry: &Geometry<f64>, tolerance: f64, preserve_topology: bool) -> Geometry<f64> {
    if preserve_topology {
        let area = tolerance * tolerance;
        match geometry {
            Geometry::LineString(g) => Geometry::LineString(g.simplify_vw_preserve(area)),
            Geometry::MultiLineString(g) => Geometry::MultiLineString(g.simplify_vw_preserve(area)),
            Geometry::Polygon(g) => Geometry::Polygon(g.simplify_vw_preserve(area)),
            Geometry::MultiPolygon(g) => Geometry::MultiPolygon(g.simplify_vw_preserve(area)),
            other => other.clone(),
        }
    } else {
        match geometry {
            Geometry::LineString(g) => Geometry::LineString(g.simplify(tolerance)),
            Geometry::MultiLineString(g) => Geometry::MultiLineString(g.simplify(tolerance)),
            Geometry::Polygon(g) => Geometry::Polygon(g.simplify(tolerance)),
            Geometry::MultiPolygon(g) => Geometry::MultiPolygon(g.simplify(tolerance)),
            other => other.clone(),
        }
    }
}
