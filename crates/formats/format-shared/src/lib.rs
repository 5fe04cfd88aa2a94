//! Error and position types shared by `GeoProc` format crates.

use std::error::Error as StdError;
use std::fmt;

/// A position within a text source, such as a line of a feature sequence.
///
/// All indices are 1-based where possible to align with human expectations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePosition {
    /// Line number in the source (1-based)
    pub line: Option<u64>,
    /// Logical record number (1-based), counting only non-blank records
    pub record: Option<u64>,
}

impl SourcePosition {
    /// Position of a record that starts on `line`.
    #[must_use]
    pub fn at(line: u64, record: u64) -> Self {
        Self {
            line: Some(line),
            record: Some(record),
        }
    }

    /// Returns true when the position does not contain any location metadata.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.line.is_none() && self.record.is_none()
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(line) = self.line {
            parts.push(format!("line {line}"));
        }
        if let Some(record) = self.record {
            parts.push(format!("record {record}"));
        }

        if parts.is_empty() {
            write!(f, "unknown position")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Errors raised while reading or writing a vector format.
#[derive(Debug)]
pub enum SpatialFormatError {
    /// An underlying I/O failure occurred.
    Io {
        /// The originating error.
        source: std::io::Error,
        /// Optional context describing what was being accessed.
        context: Option<String>,
    },
    /// A record could not be parsed.
    Parse {
        /// Human readable description of the failure.
        message: String,
        /// Optional position describing where the failure occurred.
        position: Option<SourcePosition>,
        /// Optional context describing what was being read.
        context: Option<String>,
    },
    /// The stream's schema could not be inferred from its first record.
    SchemaInference {
        /// Human readable description of the failure.
        message: String,
        /// Optional context describing what was being read.
        context: Option<String>,
    },
    /// A feature could not be encoded for output.
    Encode {
        /// Human readable description of the failure.
        message: String,
    },
    /// The format does not implement the requested operation.
    Unsupported {
        /// Format short name.
        format: String,
        /// Operation that was requested (e.g. "append").
        operation: String,
    },
}

impl SpatialFormatError {
    fn fmt_context(context: Option<&str>) -> String {
        context
            .map(|c| format!(" while accessing {c}"))
            .unwrap_or_default()
    }

    fn fmt_position(position: Option<&SourcePosition>) -> String {
        position.map(|pos| format!(" at {pos}")).unwrap_or_default()
    }

    /// Wraps an I/O error with the path or stream it happened on.
    #[must_use]
    pub fn io(source: std::io::Error, context: impl Into<String>) -> Self {
        SpatialFormatError::Io {
            source,
            context: Some(context.into()),
        }
    }

    /// Attach additional context to the error, returning the updated error.
    #[must_use]
    pub fn with_additional_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        match &mut self {
            SpatialFormatError::Io {
                context: existing, ..
            }
            | SpatialFormatError::Parse {
                context: existing, ..
            }
            | SpatialFormatError::SchemaInference {
                context: existing, ..
            } => match existing {
                Some(existing) if !existing.is_empty() => {
                    existing.push_str("; ");
                    existing.push_str(&context);
                },
                _ => *existing = Some(context),
            },
            SpatialFormatError::Encode { message } => {
                message.push_str(" (");
                message.push_str(&context);
                message.push(')');
            },
            SpatialFormatError::Unsupported { .. } => {},
        }
        self
    }
}

impl fmt::Display for SpatialFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpatialFormatError::Io { source, context } => {
                write!(
                    f,
                    "I/O error{}: {source}",
                    Self::fmt_context(context.as_deref())
                )
            },
            SpatialFormatError::Parse {
                message,
                position,
                context,
            } => write!(
                f,
                "Parse error{}{}: {message}",
                Self::fmt_context(context.as_deref()),
                Self::fmt_position(position.as_ref())
            ),
            SpatialFormatError::SchemaInference { message, context } => write!(
                f,
                "Schema inference error{}: {message}",
                Self::fmt_context(context.as_deref())
            ),
            SpatialFormatError::Encode { message } => write!(f, "Encode error: {message}"),
            SpatialFormatError::Unsupported { format, operation } => {
                write!(f, "{format} does not support {operation}")
            },
        }
    }
}

impl StdError for SpatialFormatError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            SpatialFormatError::Io { source, .. } => Some(source),
            SpatialFormatError::Parse { .. }
            | SpatialFormatError::SchemaInference { .. }
            | SpatialFormatError::Encode { .. }
            | SpatialFormatError::Unsupported { .. } => None,
        }
    }
}

/// Result type alias that uses [`SpatialFormatError`].
pub type SpatialFormatResult<T> = Result<T, SpatialFormatError>;
