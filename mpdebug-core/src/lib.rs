//! Core data models and types for mpdebug

pub mod config;
pub mod error;
pub mod types;

pub use config::*;
pub use error::*;
pub use types::*;

/// Result type alias for mpdebug operations
pub type Result<T> = std::result::Result<T, MpError>;
