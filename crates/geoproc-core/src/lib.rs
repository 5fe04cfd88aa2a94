//! `geoproc-core` is the core library of `GeoProc`, a streaming processor for
//! vector features.
//!
//! A pipeline is a chain of stages pulled one feature at a time:
//! - **Stages** ([`stages`]): `cat` reads a dataset, transforms (`buffer`,
//!   `centroid`, `simplify`, `reproject`, `filter`) rewrite features, and
//!   `load` writes them out.
//! - **Worker pool** ([`pool`]): transforms can run on several threads while
//!   the stream stays lazy and bounded.
//! - **Failure policy** ([`failure`]): a feature that cannot be transformed
//!   either ends the run or is skipped.
//! - **Driver registry** ([`drivers`]): formats known to the tool and their
//!   capabilities.

pub mod crs;
pub mod drivers;
pub mod error;
pub mod failure;
pub mod geometry;
pub mod logging;
pub mod operations;
pub mod pipeline;
pub mod pool;
pub mod predicate;
pub mod stages;
pub mod types;

pub use error::{GeoProcError, Result};
pub use failure::FailurePolicy;
pub use geoproc_core_common::{Crs, Feature, FeatureId, GeometryType, Meta, Schema};
pub use pipeline::{RunContext, RunReport, StageSpec};
