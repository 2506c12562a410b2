use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    Upstream,
    Timeout,
    Internal,
}

/// Client-visible failure payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code:?}: {message}")]
pub struct RelayError {
    pub code: ErrorCode,
    pub upstream_status: Option<u16>,
    pub message: String,
}

impl RelayError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Validation,
            upstream_status: None,
            message: message.into(),
        }
    }

    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Upstream,
            upstream_status: Some(status),
            message: message.into(),
        }
    }

    pub fn timeout() -> Self {
        Self {
            code: ErrorCode::Timeout,
            upstream_status: None,
            message: "Inference service timed out".into(),
        }
    }

    /// Details stay in the server log; the client only sees the generic message.
    pub fn internal() -> Self {
        Self {
            code: ErrorCode::Internal,
            upstream_status: None,
            message: INTERNAL_ERROR_MESSAGE.into(),
        }
    }

    pub fn http_status(&self) -> u16 {
        match self.code {
            ErrorCode::Validation => 400,
            ErrorCode::Upstream => self.upstream_status.unwrap_or(500),
            ErrorCode::Timeout => 504,
            ErrorCode::Internal => 500,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody::new(self.message.clone())
    }
}

impl From<RelayError> for ErrorBody {
    fn from(value: RelayError) -> Self {
        Self {
            error: value.message,
        }
    }
}
