use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("No {kind} named {name} found")]
    NotFound { kind: &'static str, name: String },

    #[error("Platform request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid platform URL {0}")]
    InvalidUrl(String),

    #[error("Platform returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Platform task failed: {0}")]
    TaskFailed(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Invalid OVA {path}: {reason}")]
    InvalidOva { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PlatformError>;
