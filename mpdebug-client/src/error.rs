//! Client error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The service or the transport refused the request
    #[error("{operation} failed{}: {message}", code_suffix(.code))]
    Remote {
        operation: &'static str,
        code: Option<String>,
        message: String,
    },

    #[error("Invalid response to {operation}: {message}")]
    InvalidResponse {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },

    #[error("Core error: {0}")]
    Core(#[from] mpdebug_core::MpError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub(crate) fn remote(
        operation: &'static str,
        code: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        ClientError::Remote {
            operation,
            code: code.map(str::to_owned),
            message: message.into(),
        }
    }

    /// Service error code, when the service sent one
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Remote { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ClientError::Remote { .. } | ClientError::InvalidResponse { .. })
    }

    /// Whether the caller supplied something malformed
    pub fn is_input(&self) -> bool {
        matches!(self, ClientError::Core(e) if e.is_input())
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(" ({})", c))
        .unwrap_or_default()
}
