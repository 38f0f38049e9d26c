//! Incrementally cached factor graphs for SampleRank-style training.
//!
//! A [`State`] is a scored candidate hypothesis over a read-only instance.
//! Each [`Template`] turns a state into a set of [`FactorPattern`]s and
//! computes a sparse feature [`Vector`] per pattern. Computed factors live in
//! the state's [`FactorGraph`] and are shared (not copied) with every state
//! derived from it, so re-scoring after a local edit only computes the
//! patterns that edit introduced.
//!
//! # Key types
//!
//! - [`Vector`]: sparse named feature vector with functional and in-place arithmetic
//! - [`FactorPattern`] / [`Variable`]: cache key: template id + variable tuple
//! - [`Factor`] / [`FactorGraph`]: computed factors and the per-state slot table
//! - [`Template`] / [`Weights`]: feature family and its shared weight vector
//! - [`Model`]: ordered template registry with weight persistence
//! - [`Scorer`]: weighted feature sums, incremental or from scratch
//! - [`WorkerPool`]: bounded rayon pool used above a batch-size threshold

pub mod error;
pub mod factor;
pub mod graph;
pub mod io;
pub mod model;
pub mod pattern;
pub mod pool;
pub mod scorer;
pub mod state;
pub mod template;
pub mod vector;

pub use error::ModelError;
pub use factor::Factor;
pub use graph::{FactorGraph, FactorId};
pub use model::{Model, WeightsSnapshot};
pub use pattern::{FactorPattern, TemplateId, Variable};
pub use pool::{WorkerPool, DEFAULT_PARALLEL_THRESHOLD};
pub use scorer::Scorer;
pub use state::{ScoreAnomaly, State, StateId};
pub use template::{apply_to, Template, Weights};
pub use vector::Vector;
