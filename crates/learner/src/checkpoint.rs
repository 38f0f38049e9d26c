//! Checkpoints: one weights file per template plus `meta.json`.

use std::path::Path;

use anyhow::Context;

use factor_graph::Model;

/// File holding [`CheckpointMeta`] inside a checkpoint directory.
pub const META_FILE: &str = "meta.json";

/// Metadata saved alongside the weights for resuming training.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CheckpointMeta {
    /// Epochs completed when the checkpoint was written.
    pub epoch: usize,
    pub total_updates: u64,
    /// Template names in registration order.
    pub templates: Vec<String>,
}

/// Write every template's weights and the metadata into `dir`.
pub fn save_checkpoint<I, C>(model: &Model<I, C>, dir: &Path, epoch: usize, total_updates: u64) -> anyhow::Result<CheckpointMeta> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let written = model.save_weights(dir)?;

    let meta = CheckpointMeta {
        epoch,
        total_updates,
        templates: model.templates().iter().map(|t| t.id().to_string()).collect(),
    };
    let meta_path = dir.join(META_FILE);
    serde_json::to_writer_pretty(
        std::fs::File::create(&meta_path).with_context(|| format!("Failed to create {}", meta_path.display()))?,
        &meta,
    )?;

    tracing::info!(dir = %dir.display(), epoch, total_updates, templates = written, "Checkpoint saved");
    Ok(meta)
}

/// Restore weights from `dir` into the templates registered on `model`.
pub fn load_checkpoint<I, C>(model: &Model<I, C>, dir: &Path) -> anyhow::Result<CheckpointMeta> {
    let meta_path = dir.join(META_FILE);
    let meta: CheckpointMeta = serde_json::from_reader(
        std::fs::File::open(&meta_path).with_context(|| format!("Failed to open {}", meta_path.display()))?,
    )
    .with_context(|| format!("Failed to parse {}", meta_path.display()))?;

    let registered: Vec<String> = model.templates().iter().map(|t| t.id().to_string()).collect();
    if registered != meta.templates {
        tracing::warn!(
            saved = ?meta.templates,
            registered = ?registered,
            "Checkpoint template list differs from the model"
        );
    }

    let loaded = model.load_weights(dir)?;
    tracing::info!(
        dir = %dir.display(),
        epoch = meta.epoch,
        total_updates = meta.total_updates,
        templates = loaded,
        "Checkpoint loaded"
    );
    Ok(meta)
}
