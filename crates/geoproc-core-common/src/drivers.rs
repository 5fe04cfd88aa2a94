//! Driver descriptors for vector format support and capabilities.
//!
//! A driver names one on-disk or stream format and states which operations
//! (info, read, write, append) are implemented for it. Format crates describe
//! themselves with a [`Driver`] when registering with the
//! [`DriverRegistry`](crate::DriverRegistry).

use std::path::Path;

/// Support status for a specific driver operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportStatus {
    /// The feature is fully supported and implemented.
    Supported,
    /// The feature is not supported by the driver.
    NotSupported,
    /// The feature is planned for future implementation.
    Planned,
}

impl SupportStatus {
    /// Returns `true` if the operation is fully supported and implemented.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        matches!(self, SupportStatus::Supported)
    }

    /// Returns the string representation of this support status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            SupportStatus::Supported => "Supported",
            SupportStatus::NotSupported => "Not Supported",
            SupportStatus::Planned => "Planned",
        }
    }
}

/// Capabilities supported by a format driver.
#[derive(Debug, Clone, Copy)]
pub struct DriverCapabilities {
    /// Support status for reading dataset metadata.
    pub info: SupportStatus,
    /// Support status for streaming features out of the format.
    pub read: SupportStatus,
    /// Support status for creating a new dataset.
    pub write: SupportStatus,
    /// Support status for adding features to an existing dataset.
    pub append: SupportStatus,
}

/// Vector format driver definition.
///
/// The short name is what users pass to `--driver` and what ends up in a
/// stream's `Meta::driver`; the extensions drive format detection for paths.
#[derive(Debug, Clone)]
pub struct Driver {
    /// Short name used in the CLI and for driver identification (e.g., `"GeoJSON"`).
    pub short_name: &'static str,
    /// Long descriptive name for display purposes.
    pub long_name: &'static str,
    /// Lower-case file extensions, without the leading dot.
    pub extensions: &'static [&'static str],
    /// Operations supported by this driver.
    pub capabilities: DriverCapabilities,
}

impl Driver {
    /// Creates a new driver definition with specified capabilities.
    #[must_use]
    pub const fn new(
        short_name: &'static str,
        long_name: &'static str,
        extensions: &'static [&'static str],
        capabilities: DriverCapabilities,
    ) -> Self {
        Self {
            short_name,
            long_name,
            extensions,
            capabilities,
        }
    }

    /// Returns `true` if `path` carries one of this driver's extensions.
    #[must_use]
    pub fn matches_path(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
    }
}
