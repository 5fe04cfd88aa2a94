//! Data model streamed through a `GeoProc` pipeline.
//!
//! A pipeline moves exactly one [`Meta`] followed by any number of [`Feature`]s
//! from stage to stage. Geometries are plain [`geo_types::Geometry`] values and
//! properties are ordered JSON maps, so format crates can convert to and from
//! `GeoJSON` without an intermediate representation.

use std::fmt;
use std::str::FromStr;

use geo_types::Geometry;
use serde_json::{Number, Value};

/// Ordered property map carried by every feature.
pub type JsonObject = serde_json::Map<String, Value>;

/// Identifier of a feature. `GeoJSON` allows either a string or a number.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureId {
    /// A string identifier.
    String(String),
    /// A numeric identifier.
    Number(Number),
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureId::String(s) => f.write_str(s),
            FeatureId::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for FeatureId {
    fn from(value: &str) -> Self {
        FeatureId::String(value.to_string())
    }
}

impl From<i32> for FeatureId {
    fn from(value: i32) -> Self {
        FeatureId::Number(Number::from(value))
    }
}

impl From<i64> for FeatureId {
    fn from(value: i64) -> Self {
        FeatureId::Number(Number::from(value))
    }
}

/// A single geometry plus its attribute properties.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Feature {
    /// The feature geometry. `None` for `GeoJSON` features with a `null` geometry.
    pub geometry: Option<Geometry<f64>>,
    /// Attribute properties, in insertion order.
    pub properties: JsonObject,
    /// Optional feature identifier.
    pub id: Option<FeatureId>,
}

impl Feature {
    /// Creates a feature with the given geometry and no properties.
    #[must_use]
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            geometry: Some(geometry.into()),
            properties: JsonObject::new(),
            id: None,
        }
    }

    /// Sets the identifier, returning the updated feature.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<FeatureId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Inserts a property, returning the updated feature.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Looks up a property by name.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Label used when logging this feature: its id, or `"unknown"`.
    #[must_use]
    pub fn id_label(&self) -> String {
        self.id
            .as_ref()
            .map_or_else(|| "unknown".to_string(), ToString::to_string)
    }
}

/// Geometry type recorded in a dataset schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryType {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryType {
    /// All geometry types, in the order they are listed to users.
    pub const ALL: [GeometryType; 7] = [
        GeometryType::Point,
        GeometryType::MultiPoint,
        GeometryType::LineString,
        GeometryType::MultiLineString,
        GeometryType::Polygon,
        GeometryType::MultiPolygon,
        GeometryType::GeometryCollection,
    ];

    /// Returns the schema type describing `geometry`.
    ///
    /// `Line` is reported as a `LineString`; `Rect` and `Triangle` as a `Polygon`.
    #[must_use]
    pub fn of(geometry: &Geometry<f64>) -> Self {
        match geometry {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::MultiPoint(_) => GeometryType::MultiPoint,
            Geometry::Line(_) | Geometry::LineString(_) => GeometryType::LineString,
            Geometry::MultiLineString(_) => GeometryType::MultiLineString,
            Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => {
                GeometryType::Polygon
            },
            Geometry::MultiPolygon(_) => GeometryType::MultiPolygon,
            Geometry::GeometryCollection(_) => GeometryType::GeometryCollection,
        }
    }

    /// Returns the `GeoJSON` name of this type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryType::Point => "Point",
            GeometryType::MultiPoint => "MultiPoint",
            GeometryType::LineString => "LineString",
            GeometryType::MultiLineString => "MultiLineString",
            GeometryType::Polygon => "Polygon",
            GeometryType::MultiPolygon => "MultiPolygon",
            GeometryType::GeometryCollection => "GeometryCollection",
        }
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown geometry type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownGeometryType(pub String);

impl fmt::Display for UnknownGeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown geometry type '{}'", self.0)
    }
}

impl std::error::Error for UnknownGeometryType {}

impl FromStr for GeometryType {
    type Err = UnknownGeometryType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GeometryType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownGeometryType(s.to_string()))
    }
}

/// Type of a property field in a dataset schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Str,
    Int,
    Float,
    Bool,
}

impl FieldType {
    /// Infers the field type of a JSON value. Nulls, arrays and objects are `Str`.
    #[must_use]
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Bool(_) => FieldType::Bool,
            Value::Number(n) if n.is_i64() || n.is_u64() => FieldType::Int,
            Value::Number(_) => FieldType::Float,
            Value::Null | Value::String(_) | Value::Array(_) | Value::Object(_) => FieldType::Str,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Str => "str",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named property field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: FieldType,
}

/// Schema of a feature stream: one geometry type plus ordered property fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Geometry type every feature is expected to carry.
    pub geometry: GeometryType,
    /// Property fields, in the order of the record they were inferred from.
    pub properties: Vec<Field>,
}

impl Schema {
    /// Creates a schema without property fields.
    #[must_use]
    pub fn new(geometry: GeometryType) -> Self {
        Self {
            geometry,
            properties: Vec::new(),
        }
    }

    /// Infers a schema from a single feature.
    ///
    /// Returns `None` when the feature has no geometry to take the type from.
    #[must_use]
    pub fn infer(feature: &Feature) -> Option<Self> {
        let geometry = GeometryType::of(feature.geometry.as_ref()?);
        let properties = feature
            .properties
            .iter()
            .map(|(name, value)| Field {
                name: name.clone(),
                field_type: FieldType::of_value(value),
            })
            .collect();
        Some(Self {
            geometry,
            properties,
        })
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.properties.iter().find(|f| f.name == name)
    }
}

/// Coordinate reference system identifier, such as `EPSG:4326`.
///
/// The pipeline only checks whether a CRS is present; interpreting the
/// identifier is left to the reprojection code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Crs(String);

impl Crs {
    /// Identifier of WGS84 longitude/latitude, the `GeoJSON` default.
    pub const WGS84: &'static str = "EPSG:4326";

    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns WGS84 (`EPSG:4326`).
    #[must_use]
    pub fn wgs84() -> Self {
        Self::new(Self::WGS84)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Crs {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Crs {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One-time descriptor that precedes the features of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    /// Short name of the driver the stream was read with (e.g. `"GeoJSON"`).
    pub driver: String,
    /// CRS of the feature geometries, when known.
    pub crs: Option<Crs>,
    /// Schema of the features.
    pub schema: Schema,
}

impl Meta {
    #[must_use]
    pub fn new(driver: impl Into<String>, crs: Option<Crs>, schema: Schema) -> Self {
        Self {
            driver: driver.into(),
            crs,
            schema,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{LineString, Point, Rect, polygon};
    use serde_json::json;

    #[test]
    fn geometry_type_of_variants() {
        assert_eq!(
            GeometryType::of(&Geometry::Point(Point::new(1.0, 2.0))),
            GeometryType::Point
        );
        let poly = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)];
        assert_eq!(
            GeometryType::of(&Geometry::Polygon(poly)),
            GeometryType::Polygon
        );
        let rect = Rect::new((0.0, 0.0), (1.0, 1.0));
        assert_eq!(
            GeometryType::of(&Geometry::Rect(rect)),
            GeometryType::Polygon
        );
        let line = LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]);
        assert_eq!(
            GeometryType::of(&Geometry::LineString(line)),
            GeometryType::LineString
        );
    }

    #[test]
    fn geometry_type_parses_case_insensitively() {
        assert_eq!(
            "multipolygon".parse::<GeometryType>(),
            Ok(GeometryType::MultiPolygon)
        );
        assert_eq!("Point".parse::<GeometryType>(), Ok(GeometryType::Point));
        assert!("Circle".parse::<GeometryType>().is_err());
    }

    #[test]
    fn field_type_inference() {
        assert_eq!(FieldType::of_value(&json!(1)), FieldType::Int);
        assert_eq!(FieldType::of_value(&json!(1.5)), FieldType::Float);
        assert_eq!(FieldType::of_value(&json!("a")), FieldType::Str);
        assert_eq!(FieldType::of_value(&json!(true)), FieldType::Bool);
        assert_eq!(FieldType::of_value(&json!(null)), FieldType::Str);
        assert_eq!(FieldType::of_value(&json!([1, 2])), FieldType::Str);
    }

    #[test]
    fn schema_inference_keeps_property_order() {
        let feature = Feature::new(Point::new(0.0, 0.0))
            .with_property("name", "A")
            .with_property("count", 3)
            .with_property("ratio", 0.5);

        let schema = Schema::infer(&feature).expect("schema");
        assert_eq!(schema.geometry, GeometryType::Point);
        let names: Vec<_> = schema.properties.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["name", "count", "ratio"]);
        assert_eq!(schema.field("count").unwrap().field_type, FieldType::Int);
    }

    #[test]
    fn schema_inference_requires_geometry() {
        let feature = Feature::default().with_property("name", "A");
        assert!(Schema::infer(&feature).is_none());
    }

    #[test]
    fn id_label_falls_back_to_unknown() {
        assert_eq!(Feature::default().id_label(), "unknown");
        assert_eq!(Feature::default().with_id(7).id_label(), "7");
        assert_eq!(Feature::default().with_id("abc").id_label(), "abc");
    }
}
