//! High-level operations behind the CLI commands.

use geoproc_core_common::ReadOptions;
use tracing::info;

use crate::drivers::{detect_driver, open_reader, resolve_driver};
use crate::error::{Access, DriverError, Result, classify_format_error};
use crate::failure::FailurePolicy;
use crate::pipeline::{self, RunContext, RunReport, StageSpec, describe};
use crate::stages::{CatSpec, LoadSpec};
use crate::types::{DatasetInfo, FieldInfo};

/// Runs a pipeline of stages under `policy`.
///
/// # Errors
///
/// Returns the first fatal error of the run, see [`pipeline::Pipeline::run`].
pub fn run_pipeline(specs: Vec<StageSpec>, policy: FailurePolicy) -> Result<RunReport> {
    let context = RunContext::new(policy, &describe(&specs));
    info!("Running pipeline: {} (on failure: {policy})", describe(&specs));
    pipeline::run(specs, &context)
}

/// Copies a dataset into another format.
///
/// Drivers are detected from the file extensions unless given.
///
/// # Errors
///
/// Returns an error if a driver is unknown or lacks the needed capability,
/// or if reading or writing fails.
pub fn convert(
    input: &str,
    output: &str,
    input_driver: Option<&str>,
    output_driver: Option<&str>,
) -> Result<RunReport> {
    let output_driver = match output_driver {
        Some(name) => resolve_driver(name)?,
        None => detect_driver(output, false)?,
    };
    info!("Converting {input} to {output} ({})", output_driver.short_name);

    let mut cat = CatSpec::new(input);
    cat.driver = input_driver.map(str::to_string);
    let mut load = LoadSpec::new(output);
    load.driver = Some(output_driver.short_name.to_string());

    run_pipeline(
        vec![StageSpec::Cat(cat), StageSpec::Load(load)],
        FailurePolicy::Propagate,
    )
}

/// Opens a dataset and summarises it.
///
/// # Errors
///
/// Returns an error if the driver cannot be detected or the dataset cannot
/// be read.
pub fn dataset_info(path: &str) -> Result<DatasetInfo> {
    let driver = detect_driver(path, false)?;
    if !driver.capabilities.info.is_supported() {
        return Err(DriverError::OperationNotSupported {
            driver: driver.short_name.to_string(),
            operation: "info".to_string(),
        }
        .into());
    }
    let mut reader = open_reader(path, &driver, &ReadOptions::default())?;
    let mut feature_count = 0_u64;
    while reader
        .next_feature()
        .map_err(|e| classify_format_error(e, driver.short_name, path, Access::Read))?
        .is_some()
    {
        feature_count += 1;
    }

    let meta = reader.meta();
    Ok(DatasetInfo {
        dataset: path.to_string(),
        driver: driver.short_name.to_string(),
        driver_long_name: driver.long_name.to_string(),
        geometry_type: meta.schema.geometry.to_string(),
        crs: meta.crs.as_ref().map(ToString::to_string),
        feature_count,
        fields: meta
            .schema
            .properties
            .iter()
            .map(|field| FieldInfo {
                name: field.name.clone(),
                data_type: field.field_type.to_string(),
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GeoProcError, IoError};
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    /// Helper function to create test `GeoJSON` data
    fn create_test_geojson(path: &std::path::Path) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        writeln!(
            file,
            r#"{{
  "type": "FeatureCollection",
  "features": [
    {{
      "type": "Feature",
      "geometry": {{
        "type": "Point",
        "coordinates": [-74.0060, 40.7128]
      }},
      "properties": {{
        "name": "New York",
        "population": 8336817
      }}
    }},
    {{
      "type": "Feature",
      "geometry": {{
        "type": "Point",
        "coordinates": [-118.2437, 34.0522]
      }},
      "properties": {{
        "name": "Los Angeles",
        "population": 3979576
      }}
    }}
  ]
}}"#
        )?;
        Ok(())
    }

    #[test]
    fn test_convert_geojson_to_sequence() {
        let temp_dir = TempDir::new().unwrap();
        let input_path = temp_dir.path().join("input.geojson");
        let output_path = temp_dir.path().join("output.geojsonl");
        create_test_geojson(&input_path).unwrap();

        let report = convert(
            input_path.to_str().unwrap(),
            output_path.to_str().unwrap(),
            None,
            None,
        )
        .unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(report.meta.driver, "GeoJSONSeq");
        let output_content = std::fs::read_to_string(&output_path).unwrap();
        assert_eq!(output_content.lines().count(), 2);
        assert!(output_content.contains("New York"));
        assert!(output_content.contains("Los Angeles"));
    }

    #[test]
    fn test_convert_with_explicit_output_driver() {
        let temp_dir = TempDir::new().unwrap();
        let input_path = temp_dir.path().join("input.geojson");
        let output_path = temp_dir.path().join("output.txt");
        create_test_geojson(&input_path).unwrap();

        convert(
            input_path.to_str().unwrap(),
            output_path.to_str().unwrap(),
            None,
            Some("geojson"),
        )
        .unwrap();

        let output_content = std::fs::read_to_string(&output_path).unwrap();
        assert!(output_content.contains("FeatureCollection"));
    }

    #[test]
    fn test_convert_to_planned_driver() {
        let temp_dir = TempDir::new().unwrap();
        let input_path = temp_dir.path().join("input.geojson");
        create_test_geojson(&input_path).unwrap();

        let err = convert(
            input_path.to_str().unwrap(),
            temp_dir.path().join("output.shp").to_str().unwrap(),
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, GeoProcError::Driver(_)), "got {err:?}");
    }

    #[test]
    fn test_convert_unknown_driver() {
        let err = convert("input.geojson", "output.geojson", Some("GML"), None).unwrap_err();
        assert!(matches!(err, GeoProcError::Driver(DriverError::NotFound { .. })));
    }

    #[test]
    fn test_dataset_info() {
        let temp_dir = TempDir::new().unwrap();
        let input_path = temp_dir.path().join("cities.geojson");
        create_test_geojson(&input_path).unwrap();

        let info = dataset_info(input_path.to_str().unwrap()).unwrap();
        assert_eq!(info.driver, "GeoJSON");
        assert_eq!(info.geometry_type, "Point");
        assert_eq!(info.crs.as_deref(), Some("EPSG:4326"));
        assert_eq!(info.feature_count, 2);
        assert_eq!(
            info.fields,
            vec![
                FieldInfo {
                    name: "name".to_string(),
                    data_type: "str".to_string(),
                },
                FieldInfo {
                    name: "population".to_string(),
                    data_type: "int".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_dataset_info_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.geojson");
        let err = dataset_info(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, GeoProcError::Io(IoError::FileNotFound { .. })));
    }
}
