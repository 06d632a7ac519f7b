use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] herd_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CliError {
    /// Conditions that should stop a daemon instead of being retried on
    /// the next tick.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::Core(
                    herd_core::Error::CorruptState(_)
                        | herd_core::Error::DuplicateMapping { .. }
                        | herd_core::Error::Unauthorized(_)
                )
        )
    }
}
