use thiserror::Error;

use crate::config::ConfigError;
use watchpage_streams::StreamsError;

pub type Result<T> = std::result::Result<T, WatchError>;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Streams(#[from] StreamsError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
