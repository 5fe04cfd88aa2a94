//! What a run does when a single feature cannot be transformed.

use std::fmt;

/// Per-run policy for [`TransformError`](crate::error::TransformError)s.
///
/// I/O, format, validation and protocol errors always end the run; only
/// per-feature transform failures are subject to this policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log the failure and end the run with an error.
    #[default]
    Propagate,
    /// Log the failure, drop the feature and keep going.
    Skip,
}

impl FailurePolicy {
    /// Policy selected by the `--skip-failures` flag.
    #[must_use]
    pub fn from_skip_flag(skip: bool) -> Self {
        if skip { Self::Skip } else { Self::Propagate }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Propagate => "propagate",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
