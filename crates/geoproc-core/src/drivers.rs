//! Driver registry for vector format support and capabilities.
//!
//! The implemented drivers come from the format crates, which register a
//! factory with the process-wide
//! [`DriverRegistry`](geoproc_core_common::DriverRegistry). Formats that are
//! known but not implemented yet are listed here as planned, so `geoproc
//! drivers` can show them and path detection can name them.
//!
//! # Examples
//!
//! ```
//! use geoproc_core::drivers::{detect_driver, find_driver};
//!
//! let geojson = find_driver("GeoJSON").expect("GeoJSON driver should exist");
//! assert!(geojson.capabilities.read.is_supported());
//!
//! let driver = detect_driver("roads.geojsonl", false).expect("known extension");
//! assert_eq!(driver.short_name, "GeoJSONSeq");
//! ```

use std::path::{Path, PathBuf};
use std::sync::Once;

pub use geoproc_core_common::{Driver, DriverCapabilities, SupportStatus};
use geoproc_core_common::{
    FeatureReader, FeatureWriter, Meta, OpenMode, ReadOptions, STDIO_PATH, WriteOptions,
    driver_registry,
};
use geoproc_geojson::{SEQUENCE_DRIVER, register_geojson_formats};

use crate::error::{Access, DriverError, IoError, Result, classify_format_error, driver_not_found};

const PLANNED: DriverCapabilities = DriverCapabilities {
    info: SupportStatus::Planned,
    read: SupportStatus::Planned,
    write: SupportStatus::Planned,
    append: SupportStatus::Planned,
};

const PLANNED_DRIVERS: &[Driver] = &[
    Driver::new("ESRI Shapefile", "ESRI Shapefile / DBF", &["shp"], PLANNED),
    Driver::new("GPKG", "GeoPackage vector", &["gpkg"], PLANNED),
    Driver::new("FlatGeobuf", "FlatGeobuf", &["fgb"], PLANNED),
    Driver::new("CSV", "Comma Separated Value (.csv)", &["csv"], PLANNED),
    Driver::new("Parquet", "(Geo)Parquet", &["parquet", "geoparquet"], PLANNED),
];

fn ensure_registered() {
    static REGISTER: Once = Once::new();
    REGISTER.call_once(register_geojson_formats);
}

/// Returns every known driver: the registered ones followed by the planned ones.
#[must_use]
pub fn get_drivers() -> Vec<Driver> {
    ensure_registered();
    let mut drivers = driver_registry().drivers();
    drivers.sort_by_key(|d| d.short_name);
    drivers.extend(PLANNED_DRIVERS.iter().cloned());
    drivers
}

/// Finds a driver by short name (case-insensitive).
#[must_use]
pub fn find_driver(name: &str) -> Option<Driver> {
    get_drivers()
        .into_iter()
        .find(|d| d.short_name.eq_ignore_ascii_case(name))
}

/// Sorted short names of every known driver.
#[must_use]
pub fn get_driver_names() -> Vec<&'static str> {
    let mut names: Vec<_> = get_drivers().iter().map(|d| d.short_name).collect();
    names.sort_unstable();
    names
}

/// Looks a driver up by name, failing with [`DriverError::NotFound`].
///
/// # Errors
///
/// Returns [`DriverError::NotFound`] listing the known drivers.
pub fn resolve_driver(name: &str) -> Result<Driver> {
    find_driver(name).ok_or_else(|| driver_not_found(name).into())
}

/// Picks the driver for `path`.
///
/// `sequence` or the stdio path `-` select `GeoJSONSeq`; otherwise the file
/// extension decides.
///
/// # Errors
///
/// Returns [`IoError::InvalidPath`] if no driver claims the extension.
pub fn detect_driver(path: &str, sequence: bool) -> Result<Driver> {
    if sequence || path == STDIO_PATH {
        return resolve_driver(SEQUENCE_DRIVER);
    }

    get_drivers()
        .into_iter()
        .find(|d| d.matches_path(Path::new(path)))
        .ok_or_else(|| {
            IoError::InvalidPath {
                path: PathBuf::from(path),
                reason: "cannot detect the format from the file extension".to_string(),
            }
            .into()
        })
}

fn unsupported(driver: &Driver, operation: &str) -> DriverError {
    DriverError::OperationNotSupported {
        driver: driver.short_name.to_string(),
        operation: operation.to_string(),
    }
}

fn not_registered(driver: &Driver) -> DriverError {
    DriverError::NotRegistered {
        driver: driver.short_name.to_string(),
    }
}

/// Opens `path` for reading with `driver`.
///
/// # Errors
///
/// Returns a [`DriverError`] if the driver cannot read, or an I/O or format
/// error if the dataset cannot be opened.
pub fn open_reader(
    path: &str,
    driver: &Driver,
    options: &ReadOptions,
) -> Result<Box<dyn FeatureReader>> {
    if !driver.capabilities.read.is_supported() {
        return Err(unsupported(driver, "read").into());
    }
    ensure_registered();
    let reader = driver_registry()
        .find(driver.short_name)
        .and_then(|factory| factory.create_reader())
        .ok_or_else(|| not_registered(driver))?;

    tracing::debug!(path, driver = driver.short_name, "Opening dataset for reading");
    reader
        .open(path, options)
        .map_err(|e| classify_format_error(e, driver.short_name, path, Access::Read))
}

/// Creates `path` for writing with `driver`.
///
/// # Errors
///
/// Returns a [`DriverError`] if the driver cannot write in the requested
/// mode, or an I/O error if the dataset cannot be created.
pub fn open_writer(
    path: &str,
    driver: &Driver,
    meta: &Meta,
    options: &WriteOptions,
) -> Result<Box<dyn FeatureWriter>> {
    let (status, operation) = match options.mode {
        OpenMode::Append => (driver.capabilities.append, "append"),
        OpenMode::Write | OpenMode::Read => (driver.capabilities.write, "write"),
    };
    if !status.is_supported() {
        return Err(unsupported(driver, operation).into());
    }
    ensure_registered();
    let writer = driver_registry()
        .find(driver.short_name)
        .and_then(|factory| factory.create_writer())
        .ok_or_else(|| not_registered(driver))?;

    tracing::debug!(path, driver = driver.short_name, operation, "Opening dataset for writing");
    writer
        .create(path, meta, options)
        .map_err(|e| classify_format_error(e, driver.short_name, path, Access::Write))
}
