//! CRS resolution and reprojection.
//!
//! [`CrsResolution`] decides, once per stage, which CRS a feature is read in,
//! which one an operation works in, and which one it is written in.
//! [`Reprojector`] moves geometries between two of them with `proj4rs`.

use geo::MapCoords;
use geo_types::{Coord, Geometry, LineString, MultiLineString};
use geoproc_core_common::Crs;
use proj4rs::Proj;

use crate::error::TransformError;

/// Effective source, working and destination CRS of a stage.
///
/// Each missing value falls back to the previous one:
///
/// ```text
/// source      = requested source      or native
/// working     = requested working     or source
/// destination = requested destination or working
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrsResolution {
    source: Option<Crs>,
    working: Option<Crs>,
    destination: Option<Crs>,
}

impl CrsResolution {
    /// Resolves the requested CRSs against the CRS the data arrives in.
    #[must_use]
    pub fn resolve(
        source: Option<&Crs>,
        working: Option<&Crs>,
        destination: Option<&Crs>,
        native: Option<&Crs>,
    ) -> Self {
        let source = source.or(native).cloned();
        let working = working.cloned().or_else(|| source.clone());
        let destination = destination.cloned().or_else(|| working.clone());
        Self {
            source,
            working,
            destination,
        }
    }

    #[must_use]
    pub fn source(&self) -> Option<&Crs> {
        self.source.as_ref()
    }

    #[must_use]
    pub fn working(&self) -> Option<&Crs> {
        self.working.as_ref()
    }

    #[must_use]
    pub fn destination(&self) -> Option<&Crs> {
        self.destination.as_ref()
    }
}

/// Returns the proj string of a CRS identifier.
///
/// Accepts raw proj strings (`+proj=...`) and a small table of EPSG codes:
/// geographic 4326 and 4269, Web Mercator 3857, World Mercator 3395, EASE
/// grid 6933 and the WGS84 UTM zones 32601-32660 / 32701-32760.
///
/// # Errors
///
/// Returns [`TransformError::Crs`] for identifiers outside that set.
pub fn proj_string(crs: &Crs) -> Result<String, TransformError> {
    let id = crs.as_str().trim();
    if id.starts_with('+') {
        return Ok(id.to_string());
    }

    let unsupported = || TransformError::Crs {
        message: format!("unsupported CRS '{id}' (use EPSG:<code> or a +proj= string)"),
    };
    let code = id
        .split_once(':')
        .filter(|(authority, _)| authority.eq_ignore_ascii_case("EPSG"))
        .and_then(|(_, code)| code.trim().parse::<u32>().ok())
        .ok_or_else(unsupported)?;

    let definition = match code {
        4326 => "+proj=longlat +datum=WGS84 +no_defs".to_string(),
        4269 => "+proj=longlat +datum=NAD83 +no_defs".to_string(),
        3857 => "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs".to_string(),
        3395 => "+proj=merc +lon_0=0 +k=1 +x_0=0 +y_0=0 +datum=WGS84 +units=m +no_defs".to_string(),
        6933 => "+proj=cea +lat_ts=30 +lon_0=0 +x_0=0 +y_0=0 +datum=WGS84 +units=m +no_defs".to_string(),
        32601..=32660 => format!("+proj=utm +zone={} +datum=WGS84 +units=m +no_defs", code - 32600),
        32701..=32760 => format!(
            "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs",
            code - 32700
        ),
        _ => return Err(unsupported()),
    };
    Ok(definition)
}

/// Checks that `crs` is supported and that its definition loads.
///
/// # Errors
///
/// Returns [`TransformError::Crs`] if [`Reprojector::new`] would reject it.
pub fn check_crs(crs: &Crs) -> Result<(), TransformError> {
    load_proj(crs).map(|_| ())
}

fn load_proj(crs: &Crs) -> Result<Proj, TransformError> {
    let definition = proj_string(crs)?;
    Proj::from_proj_string(&definition).map_err(|e| TransformError::Crs {
        message: format!("invalid CRS '{crs}': {e}"),
    })
}

/// Options applied after coordinates are transformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReprojectOptions {
    /// Split lines that cross the antimeridian into a `MultiLineString`.
    pub antimeridian_cut: bool,
    /// Decimal places to round coordinates to; negative keeps full precision.
    pub precision: i32,
}

impl Default for ReprojectOptions {
    fn default() -> Self {
        Self {
            antimeridian_cut: false,
            precision: -1,
        }
    }
}

/// Transforms geometries from one CRS to another.
#[derive(Clone)]
pub struct Reprojector {
    source: Proj,
    destination: Proj,
    source_geographic: bool,
    destination_geographic: bool,
    identity: bool,
    options: ReprojectOptions,
}

impl std::fmt::Debug for Reprojector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reprojector")
            .field("source", &self.source.projname())
            .field("destination", &self.destination.projname())
            .field("identity", &self.identity)
            .field("options", &self.options)
            .finish()
    }
}

impl Reprojector {
    /// Prepares a transformation from `source` to `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::Crs`] if either identifier is unsupported.
    pub fn new(
        source: &Crs,
        destination: &Crs,
        options: ReprojectOptions,
    ) -> Result<Self, TransformError> {
        let source_proj = load_proj(source)?;
        let destination_proj = load_proj(destination)?;
        Ok(Self {
            source_geographic: source_proj.is_latlong(),
            destination_geographic: destination_proj.is_latlong(),
            source: source_proj,
            destination: destination_proj,
            identity: source.as_str().eq_ignore_ascii_case(destination.as_str()),
            options,
        })
    }

    /// True when line geometries come out as `MultiLineString`s.
    #[must_use]
    pub fn cuts_lines(&self) -> bool {
        self.options.antimeridian_cut && self.destination_geographic
    }

    /// Transforms one coordinate. Geographic coordinates are in degrees.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::Crs`] if the coordinate cannot be projected.
    pub fn transform_coord(&self, coord: Coord<f64>) -> Result<Coord<f64>, TransformError> {
        let mut point = if self.source_geographic {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };

        proj4rs::transform::transform(&self.source, &self.destination, &mut point).map_err(
            |e| TransformError::Crs {
                message: format!("cannot transform ({}, {}): {e}", coord.x, coord.y),
            },
        )?;

        let (x, y) = if self.destination_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };
        if !x.is_finite() || !y.is_finite() {
            return Err(TransformError::Crs {
                message: format!("({}, {}) has no finite projection", coord.x, coord.y),
            });
        }
        Ok(Coord { x, y })
    }

    /// Transforms a geometry, then applies the antimeridian cut and rounding.
    ///
    /// Only line geometries are cut; polygons crossing the antimeridian are
    /// returned as transformed.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::Crs`] if any coordinate cannot be projected.
    pub fn transform(&self, geometry: &Geometry<f64>) -> Result<Geometry<f64>, TransformError> {
        let mut out = if self.identity {
            geometry.clone()
        } else {
            geometry.try_map_coords(|c| self.transform_coord(c))?
        };

        if self.options.antimeridian_cut && self.destination_geographic {
            out = cut_antimeridian(out);
        }
        if self.options.precision >= 0 {
            out = round_coords(&out, self.options.precision);
        }
        Ok(out)
    }
}

/// Splits `LineString`s and `MultiLineString`s where consecutive longitudes
/// jump by more than 180 degrees. Lines always come back as `MultiLineString`.
#[must_use]
pub fn cut_antimeridian(geometry: Geometry<f64>) -> Geometry<f64> {
    match geometry {
        Geometry::LineString(line) => Geometry::MultiLineString(MultiLineString::new(
            split_line(&line),
        )),
        Geometry::MultiLineString(lines) => Geometry::MultiLineString(MultiLineString::new(
            lines.iter().flat_map(split_line).collect(),
        )),
        other => other,
    }
}

fn split_line(line: &LineString<f64>) -> Vec<LineString<f64>> {
    let mut parts = Vec::new();
    let mut current: Vec<Coord<f64>> = Vec::new();

    for pair in line.0.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if current.is_empty() {
            current.push(a);
        }
        let delta = b.x - a.x;
        if delta.abs() > 180.0 {
            // Unwrap b next to a, find where the segment meets the meridian.
            let edge = if delta < 0.0 { 180.0 } else { -180.0 };
            let unwrapped = b.x + if delta < 0.0 { 360.0 } else { -360.0 };
            let t = (edge - a.x) / (unwrapped - a.x);
            let y = a.y + t * (b.y - a.y);

            current.push(Coord { x: edge, y });
            parts.push(LineString::new(std::mem::take(&mut current)));
            current.push(Coord { x: -edge, y });
        }
        current.push(b);
    }

    if current.len() >= 2 {
        parts.push(LineString::new(current));
    } else if parts.is_empty() {
        parts.push(line.clone());
    }
    parts
}

fn round_coords(geometry: &Geometry<f64>, precision: i32) -> Geometry<f64> {
    let factor = 10f64.powi(precision);
    geometry.map_coords(|c| Coord {
        x: (c.x * factor).round() / factor,
        y: (c.y * factor).round() / factor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{Point, line_string};

    fn crs(id: &str) -> Crs {
        Crs::new(id)
    }

    #[test]
    fn resolution_falls_back_to_native() {
        let a = crs("EPSG:4326");
        let r = CrsResolution::resolve(None, None, None, Some(&a));
        assert_eq!(r.source(), Some(&a));
        assert_eq!(r.working(), Some(&a));
        assert_eq!(r.destination(), Some(&a));
    }

    #[test]
    fn resolution_chains_explicit_values() {
        let a = crs("EPSG:4326");
        let b = crs("EPSG:3857");
        let native = crs("EPSG:4269");
        let r = CrsResolution::resolve(Some(&a), None, Some(&b), Some(&native));
        assert_eq!(r.source(), Some(&a));
        assert_eq!(r.working(), Some(&a));
        assert_eq!(r.destination(), Some(&b));
    }

    #[test]
    fn resolution_without_any_crs() {
        let r = CrsResolution::resolve(None, None, None, None);
        assert!(r.source().is_none());
        assert!(r.destination().is_none());
    }

    #[test]
    fn proj_string_table() {
        assert!(proj_string(&crs("EPSG:4326")).unwrap().contains("longlat"));
        assert!(proj_string(&crs("epsg:32633")).unwrap().contains("+zone=33"));
        assert!(proj_string(&crs("EPSG:32733")).unwrap().contains("+south"));
        assert_eq!(
            proj_string(&crs("+proj=longlat +ellps=GRS80")).unwrap(),
            "+proj=longlat +ellps=GRS80"
        );
        assert!(proj_string(&crs("EPSG:99999")).is_err());
        assert!(proj_string(&crs("WGS 84")).is_err());
    }

    #[test]
    fn check_crs_loads_the_definition() {
        assert!(check_crs(&crs("EPSG:3857")).is_ok());
        assert!(check_crs(&crs("EPSG:1")).is_err());
        // Passes the identifier table but names no projection.
        assert!(check_crs(&crs("+proj=nonsense")).is_err());
    }

    #[test]
    fn web_mercator_round_trip() {
        let forward = Reprojector::new(
            &crs("EPSG:4326"),
            &crs("EPSG:3857"),
            ReprojectOptions::default(),
        )
        .expect("forward");
        let inverse = Reprojector::new(
            &crs("EPSG:3857"),
            &crs("EPSG:4326"),
            ReprojectOptions::default(),
        )
        .expect("inverse");

        let projected = forward
            .transform(&Geometry::Point(Point::new(10.0, 45.0)))
            .expect("project");
        let Geometry::Point(p) = projected else {
            panic!("expected a point");
        };
        assert!((p.x() - 1_113_194.9).abs() < 1.0, "{p:?}");

        let back = inverse.transform(&Geometry::Point(p)).expect("unproject");
        let Geometry::Point(q) = back else {
            panic!("expected a point");
        };
        assert!((q.x() - 10.0).abs() < 1e-6);
        assert!((q.y() - 45.0).abs() < 1e-6);
    }

    #[test]
    fn identity_keeps_geometry() {
        let r = Reprojector::new(
            &crs("EPSG:4326"),
            &crs("epsg:4326"),
            ReprojectOptions::default(),
        )
        .expect("identity");
        let g = Geometry::Point(Point::new(1.5, 2.5));
        assert_eq!(r.transform(&g).unwrap(), g);
    }

    #[test]
    fn precision_rounds_coordinates() {
        let r = Reprojector::new(
            &crs("EPSG:4326"),
            &crs("EPSG:4326"),
            ReprojectOptions {
                antimeridian_cut: false,
                precision: 2,
            },
        )
        .expect("reprojector");
        let g = Geometry::Point(Point::new(1.23456, -7.65432));
        assert_eq!(
            r.transform(&g).unwrap(),
            Geometry::Point(Point::new(1.23, -7.65))
        );
    }

    #[test]
    fn antimeridian_cut_splits_crossing_line() {
        let line = line_string![(x: 170.0, y: 0.0), (x: -170.0, y: 10.0)];
        let Geometry::MultiLineString(parts) = cut_antimeridian(Geometry::LineString(line)) else {
            panic!("expected a MultiLineString");
        };
        assert_eq!(parts.0.len(), 2);
        let first_end = *parts.0[0].0.last().unwrap();
        let second_start = parts.0[1].0[0];
        assert_eq!(first_end.x, 180.0);
        assert_eq!(second_start.x, -180.0);
        assert!((first_end.y - 5.0).abs() < 1e-9);
    }

    #[test]
    fn antimeridian_cut_wraps_uncut_line() {
        let line = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 10.0)];
        let Geometry::MultiLineString(parts) = cut_antimeridian(Geometry::LineString(line.clone()))
        else {
            panic!("expected a MultiLineString");
        };
        assert_eq!(parts.0, vec![line]);
    }
}
