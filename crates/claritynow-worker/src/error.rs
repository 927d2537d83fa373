use claritynow_platform::PlatformError;
use thiserror::Error;

/// Errors raised by lifecycle operations
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// Caller-recoverable: reported through the task envelope
    #[error("{0}")]
    Validation(String),

    /// The instance was deployed but post-provision configuration failed
    #[error("Instance deployed but unusable: {0}")]
    Configuration(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
