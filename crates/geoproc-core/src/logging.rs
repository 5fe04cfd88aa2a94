//! Run-scoped logging context.
//!
//! A [`RunLogger`] is created once per pipeline run and handed explicitly to
//! every stage and worker. It owns the run's `tracing` span, so every event
//! logged through it is attributed to the run and stage it came from, and it
//! counts per-feature failures so the run can end with a summary.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::Span;

use crate::error::TransformError;
use crate::failure::FailurePolicy;

#[derive(Debug, Default)]
struct Counters {
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

/// Logging context shared by the stages and workers of one run.
///
/// Cloning is cheap; clones share the failure counters.
#[derive(Debug, Clone)]
pub struct RunLogger {
    span: Span,
    counters: Arc<Counters>,
}

impl RunLogger {
    /// Creates the context of a run described by `pipeline` (e.g. `"cat | buffer | load"`).
    #[must_use]
    pub fn new(pipeline: &str) -> Self {
        Self {
            span: tracing::info_span!("run", pipeline = %pipeline),
            counters: Arc::default(),
        }
    }

    /// The span events of this context are recorded under.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Context for one stage, nested in the run span.
    #[must_use]
    pub fn stage(&self, name: &str) -> Self {
        Self {
            span: tracing::info_span!(parent: &self.span, "stage", name = %name),
            counters: Arc::clone(&self.counters),
        }
    }

    /// Records a failed feature together with the policy applied to it.
    pub fn feature_failed(&self, feature_id: &str, error: &TransformError, policy: FailurePolicy) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        match policy {
            FailurePolicy::Skip => {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                tracing::error!(parent: &self.span, feature = %feature_id, "Skipping feature: {error}");
            },
            FailurePolicy::Propagate => {
                tracing::error!(parent: &self.span, feature = %feature_id, "Failed to process feature: {error}");
            },
        }
    }

    /// Number of features that failed so far.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.counters.failed.load(Ordering::Relaxed)
    }

    /// Number of features that were dropped under [`FailurePolicy::Skip`].
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.counters.skipped.load(Ordering::Relaxed)
    }

    /// Logs the end-of-run summary.
    pub fn finish(&self, written: u64) {
        let skipped = self.skipped();
        if skipped > 0 {
            tracing::warn!(parent: &self.span, "Skipped {skipped} feature(s) that could not be processed");
        }
        tracing::info!(parent: &self.span, written, failures = self.failures(), "Pipeline finished");
    }
}
