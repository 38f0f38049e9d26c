//! SampleRank training for factor-graph models.
//!
//! # Key types
//!
//! - [`Trainer`]: epochs of training chains over a labeled corpus, plus `predict` / `test`
//! - [`SampleRank`]: the [`sampler::Learner`] that updates weights on ranking disagreements
//! - [`Optimizer`]: [`Sgd`] (momentum, Nesterov, decay) and [`Adam`]
//! - [`L2`]: gradient shrinkage applied before the optimizer step
//! - [`RunToml`]: `[sampler]` + `[trainer]` run configuration loaded from TOML
//! - [`EpochMetrics`]: per-epoch summary with health checks

pub mod checkpoint;
pub mod config;
pub mod metrics;
pub mod optimizer;
pub mod regularizer;
pub mod samplerank;
pub mod trainer;

pub use checkpoint::{load_checkpoint, save_checkpoint, CheckpointMeta};
pub use config::{load_run_toml, RunToml, TrainerConfig};
pub use metrics::EpochMetrics;
pub use optimizer::{Adam, Optimizer, OptimizerConfig, Sgd};
pub use regularizer::{RegularizerConfig, L2};
pub use samplerank::{Disagreement, SampleRank, UpdateError};
pub use trainer::{train, TestReport, Trainer, TrainerListener};
