use thiserror::Error;

/// Why a store call failed in a way that may succeed if repeated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    Throttled,
    Unavailable,
    Internal,
}

/// Why a store call failed in a way that repeating cannot fix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermanentKind {
    Validation,
    NotFound,
    AccessDenied,
}

impl std::fmt::Display for TransientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransientKind::Throttled => write!(f, "throttled"),
            TransientKind::Unavailable => write!(f, "unavailable"),
            TransientKind::Internal => write!(f, "internal error"),
        }
    }
}

impl std::fmt::Display for PermanentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermanentKind::Validation => write!(f, "validation failed"),
            PermanentKind::NotFound => write!(f, "not found"),
            PermanentKind::AccessDenied => write!(f, "access denied"),
        }
    }
}

/// Classified record store failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("store {kind}: {message}")]
    Transient { kind: TransientKind, message: String },

    #[error("store {kind}: {message}")]
    Permanent { kind: PermanentKind, message: String },

    #[error("project '{0}' not found")]
    NotFound(String),

    /// A conditional write observed a different version than expected
    #[error("project '{id}' was modified concurrently (expected version {expected}, found {actual:?})")]
    Conflict { id: String, expected: u64, actual: Option<u64> },

    /// Failure outside the store itself (encoding, decoding)
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub fn transient(kind: TransientKind, message: impl Into<String>) -> Self {
        StoreError::Transient { kind, message: message.into() }
    }

    pub fn permanent(kind: PermanentKind, message: impl Into<String>) -> Self {
        StoreError::Permanent { kind, message: message.into() }
    }

    /// Only transient failures are worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        let message = err.to_string();
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                StoreError::transient(TransientKind::Throttled, message)
            }
            Some(ErrorCode::SystemIoFailure)
            | Some(ErrorCode::CannotOpen)
            | Some(ErrorCode::FileLockingProtocolFailed) => {
                StoreError::transient(TransientKind::Unavailable, message)
            }
            Some(ErrorCode::InternalMalfunction) | Some(ErrorCode::OutOfMemory) => {
                StoreError::transient(TransientKind::Internal, message)
            }
            Some(ErrorCode::ReadOnly) | Some(ErrorCode::PermissionDenied) | Some(ErrorCode::AuthorizationForStatementDenied) => {
                StoreError::permanent(PermanentKind::AccessDenied, message)
            }
            Some(ErrorCode::ConstraintViolation) | Some(ErrorCode::TypeMismatch) | Some(ErrorCode::TooBig) => {
                StoreError::permanent(PermanentKind::Validation, message)
            }
            Some(ErrorCode::NotFound) => StoreError::permanent(PermanentKind::NotFound, message),
            _ => StoreError::Other(message),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Other(format!("failed to encode record field: {}", err))
    }
}
