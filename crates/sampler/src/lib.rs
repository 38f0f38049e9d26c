//! Local-search exploration over factor-graph states.
//!
//! A chain starts from an initial state and repeatedly proposes local edits,
//! scores them with the model (and the objective, when gold is known), picks
//! one with a [`SamplingStrategy`], commits or repeats with an
//! [`AcceptStrategy`], optionally lets a [`Learner`] update the weights, and
//! ends when a [`StoppingCriterion`] fires.
//!
//! # Key types
//!
//! - [`Sampler`]: the single-chain driver; [`BeamSampler`] keeps the top-k states instead
//! - [`SamplerConfig`]: configuration loaded from TOML, including named policies
//! - [`Chain`]: the states visited plus accept/reject/update counts
//! - [`Explorer`] / [`Initializer`]: traits for candidate generation and chain seeding
//! - [`ObjectiveFunction`] / [`Score`]: gold-derived precision / recall / F1
//! - [`Learner`]: trait the trainer implements to update weights per step

pub mod accept;
pub mod beam;
pub mod chain;
pub mod config;
pub mod engine;
pub mod explorer;
pub mod mocks;
pub mod objective;
pub mod stopping;
pub mod strategy;

pub use accept::{AcceptKind, AcceptStrategy, Always, StrictImprovement};
pub use beam::{Beam, BeamSampler};
pub use chain::{Chain, ScoredState};
pub use config::{PolicyConfig, SamplerConfig};
pub use engine::{Learner, Policies, Sampler, SamplerError};
pub use explorer::{Explorer, Initializer};
pub use objective::{apply_objective, ObjectiveFunction, Score, PERFECT_SCORE};
pub use stopping::{MaxSteps, NoModelChange, ObjectiveOrMaxSteps, StoppingCriterion, StoppingKind};
pub use strategy::{
    Greedy, Normalization, Proportional, SamplingKind, SamplingStrategy, ScoreKind, StateScores, TopKUniform,
};
