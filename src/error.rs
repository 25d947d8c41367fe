use {
    std::path::PathBuf,
    thiserror::Error,
};

/// Everything that can go wrong inside the training core.
///
/// Callers match on the variant to decide between recovery and abort:
/// [`TrainError::InsufficientData`] is expected early in training and the
/// learning step is simply skipped, while the checkpoint and shape errors
/// indicate a broken session or a programming error and should surface.
#[derive(Error, Debug)]
pub enum TrainError {
    #[error("replay buffer holds {have} transitions but a batch needs {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("environment unavailable after {attempts} attempts, last error: {last}")]
    EnvironmentUnavailable { attempts: usize, last: String },

    #[error("{context}: expected dimension {expected}, got {got}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("no checkpoint for episode {episode} at {path}")]
    SessionNotFound { path: PathBuf, episode: usize },

    #[error("corrupt checkpoint at {path}: {reason}")]
    CorruptCheckpoint { path: PathBuf, reason: String },

    #[error(transparent)]
    Backend(#[from] candle_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
