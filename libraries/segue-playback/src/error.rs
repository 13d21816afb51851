//! Error types for playback control

use thiserror::Error;

/// Errors returned directly from the control surface
///
/// Media failures (network, codec, missing segment) are not returned here;
/// they are reported through [`crate::PlaybackListener::on_error`].
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Sequential source without any segments
    #[error("Source has no segments")]
    EmptySource,

    /// Source failed validation
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    /// Operation requires an attached source
    #[error("No source attached")]
    NoSource,

    /// Operation not valid in the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
