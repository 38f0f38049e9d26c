//! TOML config loading for training runs.
//!
//! A run file has a `[sampler]` section (see [`SamplerConfig`]) and a
//! `[trainer]` section (see [`TrainerConfig`]); both may be omitted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use sampler::SamplerConfig;

use crate::optimizer::OptimizerConfig;
use crate::regularizer::RegularizerConfig;

/// Training loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Passes over the training documents.
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Reshuffle document order every epoch.
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,

    /// Seed for the shuffle.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Show a progress bar over documents.
    #[serde(default)]
    pub show_progress: bool,

    /// Write a checkpoint after every epoch when set.
    #[serde(default)]
    pub checkpoint_dir: Option<PathBuf>,

    #[serde(default)]
    pub optimizer: OptimizerConfig,

    #[serde(default)]
    pub regularizer: RegularizerConfig,
}

fn default_epochs() -> usize {
    10
}
fn default_shuffle() -> bool {
    true
}
fn default_seed() -> u64 {
    42
}

impl TrainerConfig {
    /// Log warnings for settings that make training a no-op or unstable.
    pub fn validate(&self) {
        if self.epochs == 0 {
            tracing::warn!("epochs = 0; training will not change any weight");
        }
        self.optimizer.validate();
        self.regularizer.validate();
    }
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            shuffle: default_shuffle(),
            seed: default_seed(),
            show_progress: false,
            checkpoint_dir: None,
            optimizer: OptimizerConfig::default(),
            regularizer: RegularizerConfig::default(),
        }
    }
}

/// Top-level structure of a run file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunToml {
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub trainer: TrainerConfig,
}

/// Load and deserialize a `RunToml` from a TOML file.
pub fn load_run_toml(path: &Path) -> anyhow::Result<RunToml> {
    let contents = std::fs::read_to_string(path)?;
    let config: RunToml = toml::from_str(&contents)?;
    tracing::info!(path = %path.display(), "Loaded run config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_values() {
        let cfg = TrainerConfig::default();
        assert_eq!(cfg.epochs, 10);
        assert!(cfg.shuffle);
        assert_eq!(cfg.seed, 42);
        assert!(!cfg.show_progress);
        assert!(cfg.checkpoint_dir.is_none());
        assert_eq!(cfg.optimizer, OptimizerConfig::default());
        assert_eq!(cfg.regularizer.l2, None);
    }

    #[test]
    fn test_empty_run_file_is_all_defaults() {
        let cfg: RunToml = toml::from_str("").unwrap();
        assert_eq!(cfg.trainer, TrainerConfig::default());
        assert_eq!(cfg.sampler.max_steps, SamplerConfig::default().max_steps);
    }

    #[test]
    fn test_full_run_file() {
        let toml_str = r#"
            [sampler]
            max_steps = 25
            num_explorers = 8

            [sampler.training]
            sampling = "softmax-model"
            accept = "strict-objective"
            stopping = "objective-or-max-steps"

            [trainer]
            epochs = 3
            shuffle = false
            checkpoint_dir = "ckpt"

            [trainer.optimizer]
            type = "sgd"
            lr = 0.1
            momentum = 0.9

            [trainer.regularizer]
            l2 = 0.001
        "#;
        let cfg: RunToml = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.sampler.max_steps, 25);
        assert_eq!(cfg.sampler.num_explorers, 8);
        assert_eq!(cfg.sampler.training.sampling, sampler::SamplingKind::SoftmaxModel);
        assert_eq!(cfg.trainer.epochs, 3);
        assert!(!cfg.trainer.shuffle);
        assert_eq!(cfg.trainer.checkpoint_dir, Some(PathBuf::from("ckpt")));
        assert_eq!(
            cfg.trainer.optimizer,
            OptimizerConfig::Sgd {
                lr: 0.1,
                momentum: 0.9,
                decay: 0.0,
                nesterov: false
            }
        );
        assert_eq!(cfg.trainer.regularizer.l2, Some(0.001));
    }

    #[test]
    fn test_load_run_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[trainer]\nepochs = 2").unwrap();
        let cfg = load_run_toml(file.path()).unwrap();
        assert_eq!(cfg.trainer.epochs, 2);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(load_run_toml(Path::new("/nonexistent/run.toml")).is_err());
    }
}
