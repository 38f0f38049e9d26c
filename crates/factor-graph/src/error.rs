use std::path::PathBuf;

use crate::pattern::FactorPattern;

/// Errors raised by the factor graph, template registry and weight I/O.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A pattern was scored but its factor was never computed into the graph.
    ///
    /// Treating the factor as zero would silently corrupt the training signal,
    /// so this always propagates to the caller.
    #[error("missing factor for pattern {0}")]
    MissingFactor(FactorPattern),

    /// No template with this name is registered in the model.
    #[error("unknown template: {0}")]
    UnknownTemplate(String),

    /// A template with this name is already registered.
    #[error("duplicate template: {0}")]
    DuplicateTemplate(String),

    /// Feature names are written one per line, tab-separated from the weight.
    #[error("feature name {0:?} contains a tab or newline")]
    InvalidFeatureName(String),

    /// A weights file line could not be parsed.
    #[error("malformed weights at {}:{line}: {reason}", path.display())]
    MalformedWeights {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// The worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// IO error while reading or writing weights.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
