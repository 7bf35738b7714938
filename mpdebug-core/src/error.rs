//! Error types for mpdebug

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MpError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Invalid bucket name: {0}")]
    InvalidBucketName(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Invalid part number: {0}")]
    InvalidPartNumber(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MpError {
    /// Whether this error came from malformed caller input rather than the environment
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            MpError::Input(_)
                | MpError::InvalidBucketName(_)
                | MpError::InvalidKey(_)
                | MpError::InvalidPartNumber(_)
        )
    }
}
