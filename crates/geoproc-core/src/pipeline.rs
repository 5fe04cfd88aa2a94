//! Builds a chain of stages from their specs and drives it to the sink.

use geoproc_core_common::Meta;

use crate::error::{Result, ValidationError};
use crate::failure::FailurePolicy;
use crate::logging::RunLogger;
use crate::stages::filter::FilterOperation;
use crate::stages::{
    BufferSpec, CatSpec, CatStage, CentroidSpec, Checked, EmptyInput, FilterSpec, LoadSink,
    LoadSpec, Operation, ReprojectSpec, SimplifySpec, Sink, Stage, TransformStage,
};

/// What every stage of a run shares.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub policy: FailurePolicy,
    pub logger: RunLogger,
}

impl RunContext {
    /// Context of a run described by `pipeline` (e.g. `"cat | buffer | load"`).
    #[must_use]
    pub fn new(policy: FailurePolicy, pipeline: &str) -> Self {
        Self {
            policy,
            logger: RunLogger::new(pipeline),
        }
    }

    /// The same context, logging under the stage `name`.
    #[must_use]
    pub fn for_stage(&self, name: &str) -> Self {
        Self {
            policy: self.policy,
            logger: self.logger.stage(name),
        }
    }
}

/// One stage as given on the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum StageSpec {
    Cat(CatSpec),
    Buffer(BufferSpec),
    Centroid(CentroidSpec),
    Simplify(SimplifySpec),
    Reproject(ReprojectSpec),
    Filter(FilterSpec),
    Load(LoadSpec),
}

impl StageSpec {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cat(_) => "cat",
            Self::Buffer(_) => "buffer",
            Self::Centroid(_) => "centroid",
            Self::Simplify(_) => "simplify",
            Self::Reproject(_) => "reproject",
            Self::Filter(_) => "filter",
            Self::Load(_) => "load",
        }
    }
}

/// Joins stage names the way a pipeline is written, e.g. `cat | centroid | load`.
#[must_use]
pub fn describe(specs: &[StageSpec]) -> String {
    specs
        .iter()
        .map(StageSpec::name)
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Meta of the stream as it reached the end of the chain.
    pub meta: Meta,
    /// Features that left the chain.
    pub features: u64,
    /// Features written by `load`; zero when the pipeline has no `load`.
    pub written: u64,
    pub failures: usize,
    pub skipped: usize,
}

fn check_positions(specs: &[StageSpec]) -> std::result::Result<(), ValidationError> {
    if specs.is_empty() {
        return Err(ValidationError::MissingRequired {
            option: "stage".to_string(),
        });
    }
    let last = specs.len() - 1;
    for (i, spec) in specs.iter().enumerate() {
        match spec {
            StageSpec::Cat(_) if i != 0 => {
                return Err(ValidationError::InvalidOption {
                    option: "cat".to_string(),
                    message: format!("must be the first stage, found at position {}", i + 1),
                });
            },
            StageSpec::Load(_) if i != last => {
                return Err(ValidationError::InvalidOption {
                    option: "load".to_string(),
                    message: format!("must be the last stage, found at position {}", i + 1),
                });
            },
            _ => {},
        }
    }
    Ok(())
}

fn checked(stage: impl Stage + 'static) -> Box<dyn Stage> {
    Box::new(Checked::new(Box::new(stage)))
}

/// A chain ready to run: every option validated, nothing opened yet.
pub struct Pipeline {
    head: Box<dyn Stage>,
    sink: Option<LoadSink>,
    context: RunContext,
}

impl Pipeline {
    /// Validates `specs` and wires them into a chain.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for misplaced `cat`/`load` stages or
    /// invalid stage options. Nothing is read or written.
    pub fn build(specs: Vec<StageSpec>, context: &RunContext) -> Result<Self> {
        check_positions(&specs)?;

        let mut head: Option<Box<dyn Stage>> = None;
        let mut sink = None;
        for spec in specs {
            let name = spec.name();
            let operation: Box<dyn Operation> = match spec {
                StageSpec::Cat(cat) => {
                    cat.validate()?;
                    head = Some(checked(CatStage::new(cat, context)));
                    continue;
                },
                StageSpec::Load(load) => {
                    sink = Some(LoadSink::new(load, context));
                    continue;
                },
                StageSpec::Buffer(spec) => {
                    spec.validate()?;
                    Box::new(spec)
                },
                StageSpec::Centroid(spec) => {
                    spec.validate()?;
                    Box::new(spec)
                },
                StageSpec::Simplify(spec) => {
                    spec.validate()?;
                    Box::new(spec)
                },
                StageSpec::Reproject(spec) => {
                    spec.validate()?;
                    Box::new(spec)
                },
                StageSpec::Filter(spec) => Box::new(FilterOperation::new(&spec)?),
            };
            let upstream = head.take().unwrap_or_else(|| checked(EmptyInput::new(name)));
            head = Some(checked(TransformStage::new(upstream, operation, context)));
        }

        let head = match head {
            Some(head) => head,
            None => checked(EmptyInput::new("load")),
        };
        Ok(Self {
            head,
            sink,
            context: context.clone(),
        })
    }

    /// Pulls every feature through the chain into the sink.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error: a protocol, I/O, format or driver
    /// error, or a transform error under [`FailurePolicy::Propagate`].
    pub fn run(mut self) -> Result<RunReport> {
        let logger = &self.context.logger;
        let mut meta = self.head.init()?;
        let mut features = 0_u64;

        let written = match self.sink.as_mut() {
            Some(sink) => {
                meta = sink.open(meta)?;
                while let Some(feature) = self.head.next()? {
                    sink.write(feature)?;
                    features += 1;
                }
                sink.close()?;
                sink.written()
            },
            None => {
                while self.head.next()?.is_some() {
                    features += 1;
                }
                tracing::debug!(parent: logger.span(), features, "Discarded output of a pipeline without load");
                0
            },
        };

        logger.finish(written);
        Ok(RunReport {
            meta,
            features,
            written,
            failures: logger.failures(),
            skipped: logger.skipped(),
        })
    }
}

/// Builds and runs a pipeline.
///
/// # Errors
///
/// See [`Pipeline::build`] and [`Pipeline::run`].
pub fn run(specs: Vec<StageSpec>, context: &RunContext) -> Result<RunReport> {
    Pipeline::build(specs, context)?.run()
}
