use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Task {name} expects {expected} arguments, got {actual}")]
    TaskArity {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
