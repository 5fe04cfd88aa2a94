//! Custom error types for `GeoProc` operations.
//!
//! This module provides structured error handling using `thiserror`. Errors
//! fall into two families: per-feature [`TransformError`]s, which a run may
//! skip under [`FailurePolicy::Skip`](crate::failure::FailurePolicy), and
//! everything else, which always ends the run.

use std::path::PathBuf;

use format_shared::SpatialFormatError;
use thiserror::Error;

/// Main error type for `GeoProc` operations.
///
/// This is the root error type that encompasses all domain-specific errors.
/// It uses `#[error(transparent)]` to delegate display formatting to the
/// underlying error variants.
#[derive(Debug, Error)]
pub enum GeoProcError {
    /// Stage protocol violations (missing metadata, calls in the wrong state)
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Invalid options, detected before any feature is processed
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A per-feature transform failed
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Driver-related errors (not found, unsupported operations, etc.)
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// I/O errors (file read/write, path issues, permissions)
    #[error(transparent)]
    Io(#[from] IoError),

    /// Format parsing and validation errors
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Generic errors from dependencies
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Violations of the meta-then-features stage protocol.
///
/// These indicate a broken pipeline (a chain without a source, or a stage
/// driven out of order) and are never skipped.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The upstream of a stage produced no metadata
    #[error("Stage '{stage}' received no metadata from upstream; the pipeline needs a source stage")]
    MissingMeta {
        /// The stage that expected metadata
        stage: String,
    },

    /// A stage was asked to do something its current state does not allow
    #[error("Stage '{stage}' cannot {operation} while {state}")]
    IllegalState {
        /// The stage name
        stage: String,
        /// The state the stage was in (e.g. "not started", "finished")
        state: &'static str,
        /// The rejected operation (e.g. "init", "produce a feature")
        operation: &'static str,
    },
}

/// Option validation errors.
///
/// These errors occur when options or expressions are invalid.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Invalid option value
    #[error("Invalid {option} option: {message}")]
    InvalidOption {
        /// The option name
        option: String,
        /// Why it's invalid
        message: String,
    },

    /// Required option is missing
    #[error("Missing required option: {option}")]
    MissingRequired {
        /// The missing option name
        option: String,
    },

    /// A filter expression failed to compile
    #[error("Invalid expression '{expression}': {message}")]
    InvalidExpression {
        /// The expression text
        expression: String,
        /// What is wrong with it
        message: String,
    },
}

/// Per-feature transform failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransformError {
    /// A geometric operation got a feature without geometry
    #[error("{operation} requires a geometry, but the feature has none")]
    MissingGeometry {
        /// The operation name
        operation: &'static str,
    },

    /// A geometric operation could not produce a result
    #[error("{operation} failed: {message}")]
    Geometry {
        /// The operation name
        operation: &'static str,
        /// Description of the failure
        message: String,
    },

    /// Reprojection failed
    #[error("Reprojection failed: {message}")]
    Crs {
        /// Description of the failure
        message: String,
    },

    /// A filter expression could not be evaluated against the feature
    #[error("Expression evaluation failed: {message}")]
    Predicate {
        /// Description of the failure
        message: String,
    },

    /// A geometry routine panicked
    #[error("Transform panicked: {message}")]
    Panicked {
        /// The panic payload, when it was a string
        message: String,
    },
}

/// Driver-related errors.
///
/// These errors occur when a driver is not found or does not support
/// an operation.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Driver was not found in the registry
    #[error("Driver '{name}' not found. Available drivers: {available}")]
    NotFound {
        /// The requested driver name
        name: String,
        /// Comma-separated list of available drivers
        available: String,
    },

    /// Driver does not support the requested operation
    #[error("Driver '{driver}' does not support {operation}")]
    OperationNotSupported {
        /// The driver name
        driver: String,
        /// The operation that's not supported (e.g., "reading", "writing")
        operation: String,
    },

    /// Driver is not registered in the factory registry
    #[error("Driver '{driver}' is not registered in the registry")]
    NotRegistered {
        /// The driver name
        driver: String,
    },
}

/// I/O related errors.
///
/// These errors occur during file or stream operations, including
/// reading, writing, and path validation.
#[derive(Debug, Error)]
pub enum IoError {
    /// Failed to read from a file
    #[error("Failed to read {format} file '{path}': {source}")]
    Read {
        /// The format being read (e.g., "`GeoJSON`")
        format: String,
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Failed to write to a file
    #[error("Failed to write {format} file '{path}': {source}")]
    Write {
        /// The format being written
        format: String,
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Path is invalid
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath {
        /// The invalid path
        path: PathBuf,
        /// Why the path is invalid
        reason: String,
    },

    /// File was not found
    #[error("File not found: '{path}'")]
    FileNotFound {
        /// The missing file path
        path: PathBuf,
    },

    /// Permission was denied
    #[error("Permission denied for '{path}'")]
    PermissionDenied {
        /// The path with permission issues
        path: PathBuf,
    },
}

/// Format parsing and validation errors.
///
/// These errors occur when parsing or encoding geospatial data formats.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Failed to parse a format
    #[error("Failed to parse {format} at line {line}: {message}", line = line.map(|l| l.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    Parse {
        /// The format being parsed
        format: String,
        /// The line number where parsing failed (if available)
        line: Option<u64>,
        /// Description of the parse error
        message: String,
    },

    /// Schema inference failed
    #[error("Schema inference failed for {format}: {reason}")]
    SchemaInference {
        /// The format
        format: String,
        /// Why schema inference failed
        reason: String,
    },

    /// A feature could not be encoded for output
    #[error("Failed to encode {format}: {message}")]
    Encode {
        /// The format
        format: String,
        /// Description of the failure
        message: String,
    },
}

/// Type alias for Results using `GeoProcError`.
pub type Result<T> = std::result::Result<T, GeoProcError>;

impl GeoProcError {
    /// Get a user-friendly error message with suggestions.
    ///
    /// This formats the error in a way that's helpful for end users,
    /// including context and actionable information.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Protocol(e) => format!("Pipeline error: {e}"),
            Self::Validation(e) => format!("Invalid options: {e}"),
            Self::Transform(e) => format!("Feature processing failed: {e}"),
            Self::Driver(e) => e.user_message(),
            Self::Io(e) => e.user_message(),
            Self::Format(e) => e.user_message(),
            Self::Other(e) => format!("Error: {e}"),
        }
    }

    /// Get recovery suggestions if available.
    ///
    /// Returns helpful suggestions on how to fix or work around the error.
    #[must_use]
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::Protocol(ProtocolError::MissingMeta { .. }) => {
                Some("Start the pipeline with a 'cat' stage.".to_string())
            },
            Self::Transform(_) => Some(
                "Pass --skip-failures to drop features that cannot be processed.".to_string(),
            ),
            Self::Driver(e) => e.recovery_suggestion(),
            Self::Io(e) => e.recovery_suggestion(),
            Self::Format(e) => e.recovery_suggestion(),
            _ => None,
        }
    }
}

impl DriverError {
    fn user_message(&self) -> String {
        match self {
            Self::NotFound { name, available } => {
                format!(
                    "Driver '{name}' not found.\n\nAvailable drivers:\n{}",
                    available
                        .split(", ")
                        .map(|d| format!("  - {d}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                )
            },
            Self::OperationNotSupported { driver, operation } => {
                format!("The '{driver}' driver does not support {operation} operation.")
            },
            Self::NotRegistered { .. } => self.to_string(),
        }
    }

    fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::NotFound { .. } => {
                Some("Run 'geoproc drivers' to see all available drivers.".to_string())
            },
            Self::OperationNotSupported { .. } => {
                Some("Try using a different driver that supports this operation.".to_string())
            },
            Self::NotRegistered { .. } => {
                Some("This driver is planned but not yet implemented.".to_string())
            },
        }
    }
}

impl IoError {
    fn user_message(&self) -> String {
        match self {
            Self::Read { format, path, .. } => {
                format!("Failed to read {} file: {}", format, path.display())
            },
            Self::Write { format, path, .. } => {
                format!("Failed to write {} file: {}", format, path.display())
            },
            Self::FileNotFound { path } => {
                format!("File not found: {}", path.display())
            },
            _ => self.to_string(),
        }
    }

    fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::FileNotFound { .. } => {
                Some("Check that the file path is correct and the file exists.".to_string())
            },
            Self::PermissionDenied { .. } => {
                Some("Check file permissions and ensure you have access.".to_string())
            },
            Self::InvalidPath { .. } => Some(
                "Use a known file extension, or pass --sequence for GeoJSON text sequences."
                    .to_string(),
            ),
            _ => None,
        }
    }
}

impl FormatError {
    fn user_message(&self) -> String {
        match self {
            Self::Parse {
                format,
                line,
                message,
            } => {
                if let Some(line_num) = line {
                    format!("Parse error in {format} at line {line_num}: {message}")
                } else {
                    format!("Parse error in {format}: {message}")
                }
            },
            Self::SchemaInference { .. } | Self::Encode { .. } => self.to_string(),
        }
    }

    fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::Parse { .. } => Some("Check the file format and ensure it's valid.".to_string()),
            Self::SchemaInference { .. } => Some(
                "Make sure the first feature of the dataset has a geometry.".to_string(),
            ),
            Self::Encode { .. } => None,
        }
    }
}

/// Which side of a format a failure happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// Classifies an error raised by a format crate.
///
/// Format crates report [`SpatialFormatError`]s through `anyhow`; this maps
/// them onto the I/O, format and driver families so the CLI can give a
/// specific message. Anything else is wrapped as an I/O failure on `path`.
#[must_use]
pub fn classify_format_error(
    err: anyhow::Error,
    format: &str,
    path: &str,
    access: Access,
) -> GeoProcError {
    let err = match err.downcast::<SpatialFormatError>() {
        Ok(err) => err,
        Err(other) => return io_failure(other.into(), format, path, access),
    };

    match err {
        SpatialFormatError::Io { source, .. } => match source.kind() {
            std::io::ErrorKind::NotFound => IoError::FileNotFound { path: path.into() }.into(),
            std::io::ErrorKind::PermissionDenied => {
                IoError::PermissionDenied { path: path.into() }.into()
            },
            _ => io_failure(Box::new(source), format, path, access),
        },
        SpatialFormatError::Parse {
            message, position, ..
        } => {
            let record = position
                .as_ref()
                .and_then(|p| p.record)
                .map(|r| format!(" (record {r})"))
                .unwrap_or_default();
            FormatError::Parse {
                format: format.to_string(),
                line: position.and_then(|p| p.line),
                message: format!("{message}{record} in '{path}'"),
            }
            .into()
        },
        SpatialFormatError::SchemaInference { message, .. } => FormatError::SchemaInference {
            format: format.to_string(),
            reason: format!("{message} in '{path}'"),
        }
        .into(),
        SpatialFormatError::Encode { message } => FormatError::Encode {
            format: format.to_string(),
            message,
        }
        .into(),
        SpatialFormatError::Unsupported { format, operation } => {
            DriverError::OperationNotSupported {
                driver: format,
                operation,
            }
            .into()
        },
    }
}

fn io_failure(
    source: Box<dyn std::error::Error + Send + Sync>,
    format: &str,
    path: &str,
    access: Access,
) -> GeoProcError {
    let format = format.to_string();
    let path = PathBuf::from(path);
    match access {
        Access::Read => IoError::Read {
            format,
            path,
            source,
        },
        Access::Write => IoError::Write {
            format,
            path,
            source,
        },
    }
    .into()
}

/// Helper to create `DriverError::NotFound` with available drivers.
#[must_use]
pub fn driver_not_found(name: &str) -> DriverError {
    use crate::drivers::get_driver_names;

    let available = get_driver_names().join(", ");
    DriverError::NotFound {
        name: name.to_string(),
        available,
    }
}
