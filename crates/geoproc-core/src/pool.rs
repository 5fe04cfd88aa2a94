//! Worker-pool dispatcher for per-feature transforms.
//!
//! With one job every task runs inline, in input order. With more, tasks are
//! spawned on a dedicated `rayon` pool and results come back over a
//! `crossbeam-channel`, so output order follows completion order. At most
//! `2 × jobs` tasks are in flight at any time.

use std::num::NonZeroUsize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use geoproc_core_common::Feature;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{GeoProcError, Result, TransformError, ValidationError};
use crate::failure::FailurePolicy;
use crate::logging::RunLogger;

/// A per-feature operation, shared by every worker of a stage.
pub trait FeatureTransform: Send + Sync {
    /// Transforms one feature. `Ok(None)` drops it without counting a failure.
    ///
    /// # Errors
    ///
    /// Returns a [`TransformError`] when the feature cannot be processed.
    fn apply(&self, feature: Feature) -> std::result::Result<Option<Feature>, TransformError>;
}

/// One feature together with everything a worker needs to process it.
pub struct TaskUnit {
    pub feature: Feature,
    pub transform: Arc<dyn FeatureTransform>,
    pub on_failure: FailurePolicy,
}

/// What a worker hands back for a task.
#[derive(Debug)]
pub enum TaskOutcome {
    /// The transformed feature.
    Emit(Feature),
    /// Filtered out, or failed under [`FailurePolicy::Skip`].
    Dropped,
    /// Failed under [`FailurePolicy::Propagate`].
    Failed(TransformError),
}

impl TaskUnit {
    /// Runs the transform, applying the failure policy to any error or panic.
    pub fn run(self, logger: &RunLogger) -> TaskOutcome {
        let Self {
            feature,
            transform,
            on_failure,
        } = self;
        let id = feature.id_label();

        let result = catch_unwind(AssertUnwindSafe(|| transform.apply(feature)))
            .unwrap_or_else(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(TransformError::Panicked { message })
            });

        match result {
            Ok(Some(feature)) => TaskOutcome::Emit(feature),
            Ok(None) => TaskOutcome::Dropped,
            Err(error) => {
                logger.feature_failed(&id, &error, on_failure);
                match on_failure {
                    FailurePolicy::Skip => TaskOutcome::Dropped,
                    FailurePolicy::Propagate => TaskOutcome::Failed(error),
                }
            },
        }
    }
}

/// Checks a `--jobs` value against the number of available CPUs.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidOption`] outside `1..=available_parallelism`.
pub fn validate_jobs(jobs: usize) -> std::result::Result<usize, ValidationError> {
    let max = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
    if (1..=max).contains(&jobs) {
        Ok(jobs)
    } else {
        Err(ValidationError::InvalidOption {
            option: "--jobs".to_string(),
            message: format!("must be between 1 and {max}, got {jobs}"),
        })
    }
}

struct Workers {
    pool: ThreadPool,
    sender: Sender<TaskOutcome>,
    receiver: Receiver<TaskOutcome>,
    in_flight: usize,
    window: usize,
}

/// Applies a [`FeatureTransform`] to a stream of features.
pub struct Dispatcher {
    transform: Arc<dyn FeatureTransform>,
    policy: FailurePolicy,
    logger: RunLogger,
    workers: Option<Workers>,
    upstream_done: bool,
}

impl Dispatcher {
    /// Creates a dispatcher running `jobs` workers.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for an out-of-range `jobs`, or an error if
    /// the thread pool cannot be started.
    pub fn new(
        transform: Arc<dyn FeatureTransform>,
        policy: FailurePolicy,
        jobs: usize,
        logger: RunLogger,
    ) -> Result<Self> {
        let jobs = validate_jobs(jobs)?;
        Self::with_workers(transform, policy, jobs, logger)
    }

    // `jobs` is not checked against the CPU count here.
    fn with_workers(
        transform: Arc<dyn FeatureTransform>,
        policy: FailurePolicy,
        jobs: usize,
        logger: RunLogger,
    ) -> Result<Self> {
        let workers = if jobs > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(jobs)
                .thread_name(|i| format!("geoproc-worker-{i}"))
                .build()
                .map_err(|e| GeoProcError::Other(anyhow::anyhow!("failed to start worker pool: {e}")))?;
            let (sender, receiver) = unbounded();
            tracing::debug!(parent: logger.span(), jobs, "Started worker pool");
            Some(Workers {
                pool,
                sender,
                receiver,
                in_flight: 0,
                window: jobs * 2,
            })
        } else {
            None
        };

        Ok(Self {
            transform,
            policy,
            logger,
            workers,
            upstream_done: false,
        })
    }

    fn task(&self, feature: Feature) -> TaskUnit {
        TaskUnit {
            feature,
            transform: Arc::clone(&self.transform),
            on_failure: self.policy,
        }
    }

    /// Returns the next transformed feature, pulling from `upstream` as needed.
    ///
    /// `Ok(None)` means the upstream is exhausted and every task has finished.
    ///
    /// # Errors
    ///
    /// Returns the first [`TransformError`] under [`FailurePolicy::Propagate`],
    /// after in-flight tasks have been drained, or any upstream error.
    pub fn next<F>(&mut self, upstream: &mut F) -> Result<Option<Feature>>
    where
        F: FnMut() -> Result<Option<Feature>>,
    {
        if self.workers.is_none() {
            return self.next_inline(upstream);
        }

        loop {
            if let Err(e) = self.fill(upstream) {
                self.drain();
                return Err(e);
            }

            let Some(workers) = self.workers.as_mut() else {
                return Ok(None);
            };
            if workers.in_flight == 0 {
                return Ok(None);
            }
            let outcome = workers.receiver.recv().map_err(|e| {
                GeoProcError::Other(anyhow::anyhow!("worker channel closed: {e}"))
            })?;
            workers.in_flight -= 1;

            match outcome {
                TaskOutcome::Emit(feature) => return Ok(Some(feature)),
                TaskOutcome::Dropped => {},
                TaskOutcome::Failed(error) => {
                    self.upstream_done = true;
                    self.drain();
                    return Err(error.into());
                },
            }
        }
    }

    fn next_inline<F>(&mut self, upstream: &mut F) -> Result<Option<Feature>>
    where
        F: FnMut() -> Result<Option<Feature>>,
    {
        while !self.upstream_done {
            let Some(feature) = upstream()? else {
                self.upstream_done = true;
                break;
            };
            match self.task(feature).run(&self.logger) {
                TaskOutcome::Emit(feature) => return Ok(Some(feature)),
                TaskOutcome::Dropped => {},
                TaskOutcome::Failed(error) => {
                    self.upstream_done = true;
                    return Err(error.into());
                },
            }
        }
        Ok(None)
    }

    // Tops the window up with new tasks.
    fn fill<F>(&mut self, upstream: &mut F) -> Result<()>
    where
        F: FnMut() -> Result<Option<Feature>>,
    {
        loop {
            let Some(workers) = self.workers.as_ref() else {
                return Ok(());
            };
            if self.upstream_done || workers.in_flight >= workers.window {
                return Ok(());
            }
            let Some(feature) = upstream()? else {
                self.upstream_done = true;
                return Ok(());
            };

            let task = self.task(feature);
            let logger = self.logger.clone();
            if let Some(workers) = self.workers.as_mut() {
                let sender = workers.sender.clone();
                workers.pool.spawn(move || {
                    // The receiver is gone only if the run was abandoned.
                    let _ = sender.send(task.run(&logger));
                });
                workers.in_flight += 1;
            }
        }
    }

    // Waits for in-flight tasks and discards their results.
    fn drain(&mut self) {
        if let Some(workers) = self.workers.as_mut() {
            let discarded = workers.in_flight;
            while workers.in_flight > 0 {
                if workers.receiver.recv().is_err() {
                    break;
                }
                workers.in_flight -= 1;
            }
            workers.in_flight = 0;
            if discarded > 0 {
                tracing::debug!(parent: self.logger.span(), discarded, "Drained in-flight tasks");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Point;
    use std::collections::VecDeque;

    struct Double;

    impl FeatureTransform for Double {
        fn apply(&self, mut feature: Feature) -> std::result::Result<Option<Feature>, TransformError> {
            let value = feature
                .property("n")
                .and_then(serde_json::Value::as_i64)
                .ok_or(TransformError::Geometry {
                    operation: "double",
                    message: "no n".to_string(),
                })?;
            if value < 0 {
                panic!("negative input");
            }
            feature.properties.insert("n".to_string(), (value * 2).into());
            Ok(Some(feature))
        }
    }

    fn features(values: &[Option<i64>]) -> VecDeque<Feature> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let f = Feature::new(Point::new(0.0, 0.0)).with_id(i as i64);
                match v {
                    Some(n) => f.with_property("n", *n),
                    None => f,
                }
            })
            .collect()
    }

    fn dispatcher(policy: FailurePolicy, jobs: usize) -> Dispatcher {
        Dispatcher::with_workers(Arc::new(Double), policy, jobs, RunLogger::new("test")).unwrap()
    }

    fn drive(
        dispatcher: &mut Dispatcher,
        input: VecDeque<Feature>,
    ) -> (Vec<i64>, Option<GeoProcError>, usize) {
        let mut input = input;
        let mut pulled = 0;
        let mut upstream = || -> Result<Option<Feature>> {
            let next = input.pop_front();
            if next.is_some() {
                pulled += 1;
            }
            Ok(next)
        };
        let mut out = Vec::new();
        let mut error = None;
        loop {
            match dispatcher.next(&mut upstream) {
                Ok(Some(f)) => out.push(f.property("n").and_then(serde_json::Value::as_i64).unwrap()),
                Ok(None) => break,
                Err(e) => {
                    error = Some(e);
                    break;
                },
            }
        }
        drop(upstream);
        (out, error, pulled)
    }

    fn run_all(
        input: VecDeque<Feature>,
        policy: FailurePolicy,
        jobs: usize,
    ) -> (Vec<i64>, Option<GeoProcError>, usize) {
        drive(&mut dispatcher(policy, jobs), input)
    }

    fn in_flight(dispatcher: &Dispatcher) -> usize {
        dispatcher.workers.as_ref().map_or(0, |w| w.in_flight)
    }

    #[test]
    fn inline_preserves_order() {
        let (out, error, _) = run_all(features(&[Some(1), Some(2), Some(3)]), FailurePolicy::Propagate, 1);
        assert!(error.is_none());
        assert_eq!(out, vec![2, 4, 6]);
    }

    #[test]
    fn skip_drops_failed_feature() {
        let (out, error, _) = run_all(features(&[Some(1), None, Some(3)]), FailurePolicy::Skip, 1);
        assert!(error.is_none());
        assert_eq!(out, vec![2, 6]);
    }

    #[test]
    fn propagate_stops_before_later_features() {
        let (out, error, pulled) =
            run_all(features(&[Some(1), None, Some(3)]), FailurePolicy::Propagate, 1);
        assert_eq!(out, vec![2]);
        assert!(matches!(error, Some(GeoProcError::Transform(_))));
        assert_eq!(pulled, 2);
    }

    #[test]
    fn panics_become_transform_errors() {
        let (out, error, _) = run_all(features(&[Some(-1)]), FailurePolicy::Propagate, 1);
        assert!(out.is_empty());
        assert!(matches!(
            error,
            Some(GeoProcError::Transform(TransformError::Panicked { .. }))
        ));
    }

    #[test]
    fn pooled_output_matches_inline_as_a_set() {
        let values: Vec<Option<i64>> = (0..50).map(Some).collect();
        let (inline, _, _) = run_all(features(&values), FailurePolicy::Propagate, 1);
        for jobs in 2..=4 {
            let (mut pooled, error, _) = run_all(features(&values), FailurePolicy::Propagate, jobs);
            assert!(error.is_none());
            pooled.sort_unstable();
            assert_eq!(pooled, inline, "jobs = {jobs}");
        }
    }

    #[test]
    fn pooled_skip_drops_failures() {
        let (mut out, error, _) =
            run_all(features(&[Some(1), None, Some(3), Some(-5)]), FailurePolicy::Skip, 3);
        assert!(error.is_none());
        out.sort_unstable();
        assert_eq!(out, vec![2, 6]);
    }

    #[test]
    fn pooled_propagate_surfaces_the_error_and_drains() {
        let mut pool = dispatcher(FailurePolicy::Propagate, 4);
        let (out, error, _) = drive(&mut pool, features(&[Some(1), None, Some(3)]));

        assert!(matches!(
            error,
            Some(GeoProcError::Transform(TransformError::Geometry { .. }))
        ));
        // Features finished before the failure may still come out.
        assert!(out.iter().all(|n| [2, 6].contains(n)), "{out:?}");
        assert_eq!(in_flight(&pool), 0);
        assert!(pool.next(&mut || Ok(None)).unwrap().is_none());
    }

    #[test]
    fn pooled_panics_become_transform_errors() {
        let mut pool = dispatcher(FailurePolicy::Propagate, 2);
        let (out, error, _) = drive(&mut pool, features(&[Some(-1)]));
        assert!(out.is_empty());
        assert!(matches!(
            error,
            Some(GeoProcError::Transform(TransformError::Panicked { .. }))
        ));
        assert_eq!(in_flight(&pool), 0);
    }

    #[test]
    fn pooled_window_bounds_in_flight_tasks() {
        let mut pool = dispatcher(FailurePolicy::Propagate, 2);
        let mut input = features(&(0..20).map(Some).collect::<Vec<_>>());
        let first = pool.next(&mut || Ok(input.pop_front())).unwrap();
        assert!(first.is_some());
        // One result was taken from a full window of 2 x 2 tasks.
        assert_eq!(in_flight(&pool), 3);
        assert_eq!(input.len(), 16);
    }

    #[test]
    fn new_checks_jobs_against_the_cpu_count() {
        assert!(Dispatcher::new(Arc::new(Double), FailurePolicy::Skip, 0, RunLogger::new("test")).is_err());
    }

    #[test]
    fn jobs_out_of_range_is_rejected() {
        assert!(validate_jobs(0).is_err());
        assert!(validate_jobs(usize::MAX).is_err());
        assert_eq!(validate_jobs(1).unwrap(), 1);
    }
}
