//! Pipeline stages.
//!
//! A stage is a pull-based iterator over one [`Meta`] followed by features:
//! [`Stage::init`] returns the stream's descriptor, then [`Stage::next`]
//! returns features until `Ok(None)`. Transform stages wrap their upstream
//! and hand every feature to a [`Dispatcher`]; the `load` stage is a
//! [`Sink`] that consumes the stream instead of producing one.

use std::sync::Arc;

use geoproc_core_common::{Feature, Meta};

use crate::error::{ProtocolError, Result};
use crate::logging::RunLogger;
use crate::pipeline::RunContext;
use crate::pool::{Dispatcher, FeatureTransform};

pub mod buffer;
pub mod cat;
pub mod centroid;
pub mod filter;
pub mod load;
pub mod reproject;
pub mod simplify;

pub use buffer::{BufferSpec, Distance};
pub use cat::{CatSpec, CatStage};
pub use centroid::CentroidSpec;
pub use filter::FilterSpec;
pub use load::{LoadSink, LoadSpec};
pub use reproject::ReprojectSpec;
pub use simplify::SimplifySpec;

/// One step of a pipeline that produces a stream.
pub trait Stage {
    /// Name used in logs and errors (e.g. `"buffer"`).
    fn name(&self) -> &str;

    /// Produces the stream's [`Meta`], pulling the upstream one if any.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingMeta`] if there is no upstream Meta,
    /// or any error raised while opening resources.
    fn init(&mut self) -> Result<Meta>;

    /// Produces the next feature, or `None` at the end of the stream.
    ///
    /// # Errors
    ///
    /// Returns any error raised while reading or transforming features.
    fn next(&mut self) -> Result<Option<Feature>>;
}

/// Terminal consumer of a stream.
pub trait Sink {
    fn name(&self) -> &str;

    /// Resolves the output Meta from the stream's Meta and opens the output.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot be opened.
    fn open(&mut self, meta: Meta) -> Result<Meta>;

    /// Writes one feature.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::IllegalState`] outside `open`..`close`, or
    /// any write error.
    fn write(&mut self, feature: Feature) -> Result<()>;

    /// Flushes and closes the output.
    ///
    /// # Errors
    ///
    /// Returns an error if buffered output cannot be written.
    fn close(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageState {
    Start,
    Streaming,
    End,
}

impl StageState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Start => "not initialized",
            Self::Streaming => "streaming",
            Self::End => "finished",
        }
    }
}

/// Enforces the `Start -> Streaming -> End` protocol around a stage.
pub struct Checked {
    inner: Box<dyn Stage>,
    state: StageState,
}

impl Checked {
    #[must_use]
    pub fn new(inner: Box<dyn Stage>) -> Self {
        Self {
            inner,
            state: StageState::Start,
        }
    }

    fn illegal(&self, operation: &'static str) -> ProtocolError {
        ProtocolError::IllegalState {
            stage: self.inner.name().to_string(),
            state: self.state.as_str(),
            operation,
        }
    }
}

impl Stage for Checked {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn init(&mut self) -> Result<Meta> {
        if self.state != StageState::Start {
            return Err(self.illegal("init").into());
        }
        let meta = self.inner.init()?;
        self.state = StageState::Streaming;
        Ok(meta)
    }

    fn next(&mut self) -> Result<Option<Feature>> {
        if self.state != StageState::Streaming {
            return Err(self.illegal("read features").into());
        }
        let feature = self.inner.next()?;
        if feature.is_none() {
            self.state = StageState::End;
        }
        Ok(feature)
    }
}

/// Upstream of a chain that does not start with a source.
pub struct EmptyInput {
    downstream: String,
}

impl EmptyInput {
    #[must_use]
    pub fn new(downstream: impl Into<String>) -> Self {
        Self {
            downstream: downstream.into(),
        }
    }
}

impl Stage for EmptyInput {
    fn name(&self) -> &str {
        "input"
    }

    fn init(&mut self) -> Result<Meta> {
        Err(ProtocolError::MissingMeta {
            stage: self.downstream.clone(),
        }
        .into())
    }

    fn next(&mut self) -> Result<Option<Feature>> {
        Ok(None)
    }
}

/// The per-stage part of a transform: rewrites Meta once, then yields the
/// per-feature transform the workers run.
pub trait Operation {
    fn name(&self) -> &'static str;

    /// Number of workers to run the transform on.
    fn jobs(&self) -> usize;

    /// Rewrites `meta` for this operation's output and prepares the transform.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the operation cannot run on this stream.
    fn prepare(&self, meta: &mut Meta, logger: &RunLogger) -> Result<Arc<dyn FeatureTransform>>;
}

/// A stage applying an [`Operation`] to every upstream feature.
pub struct TransformStage {
    upstream: Box<dyn Stage>,
    operation: Box<dyn Operation>,
    context: RunContext,
    dispatcher: Option<Dispatcher>,
}

impl TransformStage {
    #[must_use]
    pub fn new(upstream: Box<dyn Stage>, operation: Box<dyn Operation>, context: &RunContext) -> Self {
        let context = context.for_stage(operation.name());
        Self {
            upstream,
            operation,
            context,
            dispatcher: None,
        }
    }
}

impl Stage for TransformStage {
    fn name(&self) -> &str {
        self.operation.name()
    }

    fn init(&mut self) -> Result<Meta> {
        let mut meta = self.upstream.init()?;
        let transform = self.operation.prepare(&mut meta, &self.context.logger)?;
        let jobs = self.operation.jobs();
        self.dispatcher = Some(Dispatcher::new(
            transform,
            self.context.policy,
            jobs,
            self.context.logger.clone(),
        )?);
        tracing::debug!(
            parent: self.context.logger.span(),
            jobs,
            geometry = %meta.schema.geometry,
            crs = meta.crs.as_ref().map_or("unknown", |c| c.as_str()),
            "Stage initialized"
        );
        Ok(meta)
    }

    fn next(&mut self) -> Result<Option<Feature>> {
        let Some(dispatcher) = self.dispatcher.as_mut() else {
            return Err(ProtocolError::IllegalState {
                stage: self.operation.name().to_string(),
                state: "not initialized",
                operation: "read features",
            }
            .into());
        };
        let upstream = &mut self.upstream;
        dispatcher.next(&mut || upstream.next())
    }
}

/// Takes the geometry out of a feature, or reports it missing.
pub(crate) fn take_geometry(
    feature: &mut Feature,
    operation: &'static str,
) -> std::result::Result<geo_types::Geometry<f64>, crate::error::TransformError> {
    feature
        .geometry
        .take()
        .ok_or(crate::error::TransformError::MissingGeometry { operation })
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory stages for tests.

    use std::collections::VecDeque;

    use geoproc_core_common::{Crs, GeometryType, Schema};

    use super::*;

    /// Source yielding a fixed Meta and features.
    pub struct VecSource {
        meta: Option<Meta>,
        features: VecDeque<Feature>,
    }

    impl VecSource {
        pub fn new(geometry: GeometryType, features: Vec<Feature>) -> Self {
            Self {
                meta: Some(Meta::new(
                    "GeoJSONSeq",
                    Some(Crs::wgs84()),
                    Schema::new(geometry),
                )),
                features: features.into(),
            }
        }

        pub fn boxed(geometry: GeometryType, features: Vec<Feature>) -> Box<dyn Stage> {
            Box::new(Checked::new(Box::new(Self::new(geometry, features))))
        }
    }

    impl Stage for VecSource {
        fn name(&self) -> &str {
            "vec"
        }

        fn init(&mut self) -> Result<Meta> {
            self.meta.take().ok_or_else(|| {
                ProtocolError::MissingMeta {
                    stage: "vec".to_string(),
                }
                .into()
            })
        }

        fn next(&mut self) -> Result<Option<Feature>> {
            Ok(self.features.pop_front())
        }
    }

    /// Drains a stage into its Meta and features.
    pub fn collect(stage: &mut dyn Stage) -> Result<(Meta, Vec<Feature>)> {
        let meta = stage.init()?;
        let mut features = Vec::new();
        while let Some(feature) = stage.next()? {
            features.push(feature);
        }
        Ok((meta, features))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{VecSource, collect};
    use super::*;
    use crate::error::GeoProcError;
    use geo_types::Point;
    use geoproc_core_common::GeometryType;

    fn source() -> Checked {
        Checked::new(Box::new(VecSource::new(
            GeometryType::Point,
            vec![Feature::new(Point::new(1.0, 2.0))],
        )))
    }

    fn is_illegal_state(result: Result<impl std::fmt::Debug>) -> bool {
        matches!(
            result,
            Err(GeoProcError::Protocol(ProtocolError::IllegalState { .. }))
        )
    }

    #[test]
    fn next_before_init_is_illegal() {
        let mut stage = source();
        assert!(is_illegal_state(stage.next()));
    }

    #[test]
    fn double_init_is_illegal() {
        let mut stage = source();
        stage.init().unwrap();
        assert!(is_illegal_state(stage.init()));
    }

    #[test]
    fn next_after_end_is_illegal() {
        let mut stage = source();
        let (_, features) = collect(&mut stage).unwrap();
        assert_eq!(features.len(), 1);
        assert!(is_illegal_state(stage.next()));
    }

    #[test]
    fn chain_without_source_misses_meta() {
        let mut stage = Checked::new(Box::new(EmptyInput::new("centroid")));
        assert!(matches!(
            stage.init(),
            Err(GeoProcError::Protocol(ProtocolError::MissingMeta { stage })) if stage == "centroid"
        ));
    }

    #[test]
    fn illegal_state_message_names_stage() {
        let mut stage = source();
        let err = stage.next().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Stage 'vec' cannot read features while not initialized"
        );
    }
}
