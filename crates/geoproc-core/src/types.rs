//! Summaries of datasets reported by `geoproc info`.

/// Information about a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetInfo {
    /// Path to the dataset
    pub dataset: String,
    /// Driver name
    pub driver: String,
    /// Driver long name
    pub driver_long_name: String,
    /// Geometry type declared for every feature
    pub geometry_type: String,
    /// CRS identifier, if known
    pub crs: Option<String>,
    /// Number of features
    pub feature_count: u64,
    /// Property fields
    pub fields: Vec<FieldInfo>,
}

/// Information about a property field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Field name
    pub name: String,
    /// Data type
    pub data_type: String,
}
