//! Conversion between `GeoJSON` features and pipeline features.

use format_shared::{SourcePosition, SpatialFormatError, SpatialFormatResult};
use geo_types::Geometry;
use geojson::feature::Id;
use geojson::{GeoJson, JsonValue};
use geoproc_core_common::{Crs, Feature, FeatureId, Meta, Schema};

/// ASCII record separator that may prefix each record of a text sequence.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Converts a parsed `GeoJSON` feature into a pipeline feature.
///
/// # Errors
///
/// Returns a parse error if the geometry cannot be represented as a
/// `geo_types` geometry.
pub fn feature_from_geojson(
    feature: geojson::Feature,
    position: Option<&SourcePosition>,
) -> SpatialFormatResult<Feature> {
    let geometry = match feature.geometry {
        Some(geometry) => Some(convert_geometry(geometry.value, position)?),
        None => None,
    };

    let id = feature.id.map(|id| match id {
        Id::String(s) => FeatureId::String(s),
        Id::Number(n) => FeatureId::Number(n),
    });

    Ok(Feature {
        geometry,
        properties: feature.properties.unwrap_or_default(),
        id,
    })
}

/// Converts a pipeline feature into a `GeoJSON` feature ready for serialization.
#[must_use]
pub fn feature_to_geojson(feature: &Feature) -> geojson::Feature {
    geojson::Feature {
        bbox: None,
        geometry: feature
            .geometry
            .as_ref()
            .map(|g| geojson::Geometry::new(geojson::Value::from(g))),
        id: feature.id.as_ref().map(|id| match id {
            FeatureId::String(s) => Id::String(s.clone()),
            FeatureId::Number(n) => Id::Number(n.clone()),
        }),
        properties: Some(feature.properties.clone()),
        foreign_members: None,
    }
}

fn convert_geometry(
    value: geojson::Value,
    position: Option<&SourcePosition>,
) -> SpatialFormatResult<Geometry<f64>> {
    Geometry::<f64>::try_from(value).map_err(|err| SpatialFormatError::Parse {
        message: format!("Failed to convert GeoJSON geometry: {err}"),
        position: position.cloned(),
        context: None,
    })
}

/// Parses one record of a feature sequence.
///
/// Leading record separators and surrounding whitespace are ignored. Returns
/// `Ok(None)` for blank records. A bare geometry is accepted as a feature
/// without properties.
///
/// # Errors
///
/// Returns a parse error if the record is not a JSON object holding a
/// `GeoJSON` Feature or Geometry.
pub fn parse_record(
    record: &str,
    position: &SourcePosition,
) -> SpatialFormatResult<Option<Feature>> {
    let text = record
        .trim_start_matches(|c: char| c == RECORD_SEPARATOR || c.is_whitespace())
        .trim_end();
    if text.is_empty() {
        return Ok(None);
    }

    let parse_error = |message: String| SpatialFormatError::Parse {
        message,
        position: Some(position.clone()),
        context: None,
    };

    let value: JsonValue = serde_json::from_str(text)
        .map_err(|err| parse_error(format!("Failed to parse GeoJSON feature: {err}")))?;
    if !value.is_object() {
        return Err(parse_error(format!(
            "Expected a GeoJSON object, found {}",
            describe_value(&value)
        )));
    }

    match GeoJson::from_json_value(value) {
        Ok(GeoJson::Feature(feature)) => feature_from_geojson(feature, Some(position)).map(Some),
        Ok(GeoJson::Geometry(geometry)) => Ok(Some(Feature {
            geometry: Some(convert_geometry(geometry.value, Some(position))?),
            ..Feature::default()
        })),
        Ok(GeoJson::FeatureCollection(_)) => Err(parse_error(
            "Expected a GeoJSON Feature, found a FeatureCollection".to_string(),
        )),
        Err(err) => Err(parse_error(format!(
            "Failed to parse GeoJSON feature: {err}"
        ))),
    }
}

/// Builds the stream descriptor from the first feature of a dataset.
///
/// # Errors
///
/// Returns a schema inference error if the feature has no geometry.
pub fn infer_meta(
    driver: &str,
    first: &Feature,
    crs: Option<Crs>,
) -> SpatialFormatResult<Meta> {
    let schema = Schema::infer(first).ok_or_else(|| SpatialFormatError::SchemaInference {
        message: format!(
            "first feature ({}) has no geometry to infer the geometry type from",
            first.id_label()
        ),
        context: None,
    })?;
    Ok(Meta::new(driver, crs, schema))
}

/// Helper to describe JSON value kinds for error messages.
pub(crate) fn describe_value(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
