use std::time::Duration;

use thiserror::Error;

use crate::host::HostError;

/// Stable discriminant for [`WidgetError`], independent of the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidConfig,
    ContainerNotFound,
    MountFailed,
    Timeout,
    Cancelled,
}

#[derive(Error, Debug)]
pub enum WidgetError {
    /// Bad constructor input. Raised synchronously, before anything is mounted.
    #[error("Invalid widget configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Mount target not found: {target}")]
    ContainerNotFound { target: String },

    /// Unexpected failure while creating the frame or wiring its listener.
    #[error("Failed to mount widget: {message}")]
    MountFailed {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Timed out waiting for {operation} after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The wait was ended by `destroy()`, a newer `mount()` or removal of its handler.
    #[error("{operation} was cancelled")]
    Cancelled { operation: String },
}

pub type WidgetResult<T> = Result<T, WidgetError>;

impl WidgetError {
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        WidgetError::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn timeout<S: Into<String>>(operation: S, timeout: Duration) -> Self {
        WidgetError::Timeout {
            operation: operation.into(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn cancelled<S: Into<String>>(operation: S) -> Self {
        WidgetError::Cancelled {
            operation: operation.into(),
        }
    }

    pub fn mount_failed<S: Into<String>>(message: S, source: HostError) -> Self {
        WidgetError::MountFailed {
            message: message.into(),
            source: Box::new(source),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            WidgetError::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            WidgetError::ContainerNotFound { .. } => ErrorCode::ContainerNotFound,
            WidgetError::MountFailed { .. } => ErrorCode::MountFailed,
            WidgetError::Timeout { .. } => ErrorCode::Timeout,
            WidgetError::Cancelled { .. } => ErrorCode::Cancelled,
        }
    }
}
