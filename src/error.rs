//! Backend error shapes and the classification every component relies on.

use serde::Serialize;
use thiserror::Error;

/// Status code reported by an event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorCode {
    Unauthenticated,
    PermissionDenied,
    Unavailable,
    ConnectionLost,
    NotFound,
    InvalidArgument,
    Internal,
    Unknown,
}

impl BackendErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendErrorCode::Unauthenticated => "unauthenticated",
            BackendErrorCode::PermissionDenied => "permission_denied",
            BackendErrorCode::Unavailable => "unavailable",
            BackendErrorCode::ConnectionLost => "connection_lost",
            BackendErrorCode::NotFound => "not_found",
            BackendErrorCode::InvalidArgument => "invalid_argument",
            BackendErrorCode::Internal => "internal",
            BackendErrorCode::Unknown => "unknown",
        }
    }
}

/// Raw error returned by an [`EventSource`](crate::source::EventSource).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {message}", .code.as_str())]
pub struct BackendError {
    pub code: BackendErrorCode,
    pub message: String,
}

impl BackendError {
    pub fn new(code: BackendErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::Unavailable, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::PermissionDenied, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::NotFound, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::InvalidArgument, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::Internal, message)
    }
}

impl From<rusqlite::Error> for BackendError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        let code = match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                BackendErrorCode::Unavailable
            }
            Some(ErrorCode::ReadOnly)
            | Some(ErrorCode::PermissionDenied)
            | Some(ErrorCode::AuthorizationForStatementDenied) => BackendErrorCode::PermissionDenied,
            Some(ErrorCode::CannotOpen) => BackendErrorCode::Unavailable,
            _ => BackendErrorCode::Internal,
        };
        BackendError::new(code, err.to_string())
    }
}

/// Coarse category of a failure, driving retry and presentation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthenticated,
    PermissionDenied,
    Transient,
    InvalidInput,
    Opaque,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::Transient => "transient",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Opaque => "opaque",
        }
    }
}

/// Classify a raw backend error. Never yields `InvalidInput`, which is only
/// raised by caller-side validation.
pub fn classify(err: &BackendError) -> ErrorKind {
    match err.code {
        BackendErrorCode::Unauthenticated => ErrorKind::Unauthenticated,
        BackendErrorCode::PermissionDenied => ErrorKind::PermissionDenied,
        BackendErrorCode::Unavailable | BackendErrorCode::ConnectionLost => ErrorKind::Transient,
        _ => ErrorKind::Opaque,
    }
}

/// Errors surfaced by the notification engine.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum NotificationError {
    #[error("No authenticated user")]
    Unauthenticated,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Service temporarily unavailable: {0}")]
    Transient(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Opaque(String),
}

impl NotificationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NotificationError::Unauthenticated => ErrorKind::Unauthenticated,
            NotificationError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            NotificationError::Transient(_) => ErrorKind::Transient,
            NotificationError::InvalidInput(_) => ErrorKind::InvalidInput,
            NotificationError::Opaque(_) => ErrorKind::Opaque,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<BackendError> for NotificationError {
    fn from(err: BackendError) -> Self {
        match classify(&err) {
            ErrorKind::Unauthenticated => NotificationError::Unauthenticated,
            ErrorKind::PermissionDenied => NotificationError::PermissionDenied(err.message),
            ErrorKind::Transient => NotificationError::Transient(err.message),
            // Opaque errors pass through verbatim.
            ErrorKind::InvalidInput | ErrorKind::Opaque => NotificationError::Opaque(err.to_string()),
        }
    }
}

/// Failure of a chunked bulk operation.
///
/// `succeeded` items from the front of the input were applied before `error`
/// stopped the run. They are not rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error} ({succeeded} applied before the failure)")]
pub struct BatchError {
    pub succeeded: usize,
    pub error: NotificationError,
}

impl BatchError {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// A failure before any chunk ran.
impl From<NotificationError> for BatchError {
    fn from(error: NotificationError) -> Self {
        Self {
            succeeded: 0,
            error,
        }
    }
}
