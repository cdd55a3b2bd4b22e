//! Error types for observable snapshot arrays
//!
//! Provides the error hierarchy shared by every array variant.
//!
//! # Design
//! Uses thiserror for ergonomic error definitions. Remote failures keep the
//! source's own error type ([`DatabaseError`], [`FirestoreError`]) wrapped in
//! [`RemoteError`], and everything converts into [`FirebaseUiError`] via `From`.

use thiserror::Error;

/// Top-level crate error type
///
/// Wraps the module-specific error types into a unified type.
///
/// # Example
/// ```
/// use firebase_ui_rust::{ArrayError, FirebaseUiError};
///
/// let err: FirebaseUiError = ArrayError::NotListening.into();
/// ```
#[derive(Debug, Error)]
pub enum FirebaseUiError {
    /// Snapshot array errors
    #[error("Array error: {0}")]
    Array(#[from] ArrayError),

    /// Realtime Database errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Firestore errors
    #[error("Firestore error: {0}")]
    Firestore(#[from] FirestoreError),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FirebaseUiError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(err) => err.is_retryable(),
            Self::Firestore(err) => err.is_retryable(),
            Self::Array(ArrayError::SourceCancelled(remote)) => remote.is_retryable(),
            _ => false,
        }
    }
}

/// Errors reported by an observable snapshot array
///
/// `SourceCancelled` and `KeyResolution` reach listeners through
/// [`ChangeEventListener::on_error`](crate::common::ChangeEventListener::on_error);
/// the rest are returned at the call site.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ArrayError {
    /// The remote listener was cancelled (permission or connectivity failure).
    /// Fatal for the array until it is stopped and started again.
    #[error("Remote source cancelled: {0}")]
    SourceCancelled(RemoteError),

    /// A single indexed key could not be resolved against the data source
    #[error("Failed to resolve key '{key}' after {attempts} attempt(s): {source}")]
    KeyResolution {
        /// Index key whose payload could not be fetched
        key: String,
        /// Number of fetch attempts made
        attempts: u32,
        /// Last error returned by the data source
        source: DatabaseError,
    },

    /// A remote event referenced a key the local list does not hold
    #[error("Received {event} event for unknown key '{key}'")]
    UnknownKey {
        /// Key carried by the event
        key: String,
        /// Event kind ("changed", "removed", "moved")
        event: &'static str,
    },

    /// `start()` called on an array that is already listening
    #[error("Array is already listening")]
    AlreadyListening,

    /// Operation requires a listening array
    #[error("Array is not listening")]
    NotListening,

    /// `get()` called with an index past the end of the list
    #[error("Index {index} out of range for array of length {len}")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Current length
        len: usize,
    },

    /// A snapshot could not be converted into a model object
    #[error("Failed to parse snapshot '{key}': {message}")]
    Parse {
        /// Key of the snapshot
        key: String,
        /// Parser error message
        message: String,
    },

    /// `start()` called outside of a Tokio runtime
    #[error("Arrays must be started from within a Tokio runtime")]
    NoRuntime,
}

impl ArrayError {
    /// Create a parse error for the given snapshot key
    pub fn parse(key: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Check if this error is fatal for the array that reported it
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SourceCancelled(_))
    }
}

/// Error reported by a remote source when cancelling a listener
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Realtime Database listener cancelled
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Firestore snapshot listener failed
    #[error(transparent)]
    Firestore(#[from] FirestoreError),
}

impl RemoteError {
    /// Check if reconnecting may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(err) => err.is_retryable(),
            Self::Firestore(err) => err.is_retryable(),
        }
    }
}

/// Realtime Database errors
///
/// Maps the Realtime Database error codes to Rust enum variants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    /// Data is stale and the operation should be retried
    #[error("Data stale")]
    DataStale,

    /// The server indicated the operation failed
    #[error("Operation failed")]
    OperationFailed,

    /// Client lacks permission for the location
    #[error("Permission denied")]
    PermissionDenied,

    /// Operation aborted by a network disconnect
    #[error("Disconnected")]
    Disconnected,

    /// The supplied auth token has expired
    #[error("Expired token")]
    ExpiredToken,

    /// The supplied auth token was invalid
    #[error("Invalid token")]
    InvalidToken,

    /// A transaction retried too many times
    #[error("Max retries exceeded")]
    MaxRetries,

    /// A transaction was overridden by a subsequent set
    #[error("Overridden by set")]
    OverriddenBySet,

    /// The service is currently unavailable
    #[error("Service unavailable")]
    Unavailable,

    /// An exception occurred in user code
    #[error("User code exception: {0}")]
    UserCodeException(String),

    /// The operation could not be performed due to a network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The write was cancelled by the user
    #[error("Write cancelled")]
    WriteCanceled,

    /// Unknown error with code
    #[error("Unknown database error: code {0}")]
    Unknown(i32),
}

impl DatabaseError {
    /// Create from a Realtime Database error code
    pub fn from_code(code: i32) -> Self {
        match code {
            -1 => Self::DataStale,
            -2 => Self::OperationFailed,
            -3 => Self::PermissionDenied,
            -4 => Self::Disconnected,
            -6 => Self::ExpiredToken,
            -7 => Self::InvalidToken,
            -8 => Self::MaxRetries,
            -9 => Self::OverriddenBySet,
            -10 => Self::Unavailable,
            -11 => Self::UserCodeException(String::new()),
            -24 => Self::NetworkError(String::new()),
            -25 => Self::WriteCanceled,
            _ => Self::Unknown(code),
        }
    }

    /// Realtime Database error code for this error
    pub fn code(&self) -> i32 {
        match self {
            Self::DataStale => -1,
            Self::OperationFailed => -2,
            Self::PermissionDenied => -3,
            Self::Disconnected => -4,
            Self::ExpiredToken => -6,
            Self::InvalidToken => -7,
            Self::MaxRetries => -8,
            Self::OverriddenBySet => -9,
            Self::Unavailable => -10,
            Self::UserCodeException(_) => -11,
            Self::NetworkError(_) => -24,
            Self::WriteCanceled => -25,
            Self::Unknown(code) => *code,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DataStale
                | Self::Disconnected
                | Self::Unavailable
                | Self::NetworkError(_)
                | Self::OperationFailed
        )
    }
}

/// Firestore errors
///
/// Maps Firestore error codes to Rust enum variants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FirestoreError {
    /// Document not found
    #[error("Document not found")]
    NotFound,

    /// Permission denied
    #[error("Permission denied")]
    PermissionDenied,

    /// Resource exhausted (e.g., quota exceeded)
    #[error("Resource exhausted")]
    ResourceExhausted,

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Deadline exceeded
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Operation was aborted
    #[error("Operation aborted")]
    Aborted,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Service unavailable
    #[error("Service unavailable")]
    Unavailable,

    /// Unauthenticated
    #[error("Unauthenticated")]
    Unauthenticated,

    /// Unknown error with code
    #[error("Unknown Firestore error: code {0}")]
    Unknown(i32),
}

impl FirestoreError {
    /// Create from gRPC error code
    pub fn from_grpc_code(code: i32) -> Self {
        match code {
            3 => Self::InvalidArgument(String::new()),
            4 => Self::DeadlineExceeded,
            5 => Self::NotFound,
            7 => Self::PermissionDenied,
            8 => Self::ResourceExhausted,
            10 => Self::Aborted,
            13 => Self::Internal(String::new()),
            14 => Self::Unavailable,
            16 => Self::Unauthenticated,
            _ => Self::Unknown(code),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable | Self::DeadlineExceeded | Self::ResourceExhausted | Self::Aborted
        )
    }
}
