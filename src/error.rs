// error.rs - Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("module not registered: {0}")]
    ModuleNotFound(&'static str),

    #[error("module already registered: {0}")]
    ModuleAlreadyRegistered(&'static str),

    #[error("no worker registered with id {0}")]
    UnknownWorker(u8),

    #[error("thread pool is stopped")]
    PoolStopped,

    #[error("loader not registered for asset type: {0}")]
    LoaderNotFound(&'static str),

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
