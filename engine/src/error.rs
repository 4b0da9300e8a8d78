//! Error types for the Nimbus engine.

use thiserror::Error;

/// Numeric error codes shared with the backend.
///
/// Local failures map onto the same table so callers can branch on
/// [`Error::code`] regardless of where a failure originated.
pub mod codes {
    pub const OTHER_CAUSE: i64 = -1;
    pub const INTERNAL_SERVER_ERROR: i64 = 1;
    pub const CONNECTION_FAILED: i64 = 100;
    pub const OBJECT_NOT_FOUND: i64 = 101;
    pub const INVALID_QUERY: i64 = 102;
    pub const INVALID_CLASS_NAME: i64 = 103;
    pub const MISSING_OBJECT_ID: i64 = 104;
    pub const INVALID_KEY_NAME: i64 = 105;
    pub const INVALID_POINTER: i64 = 106;
    pub const INVALID_JSON: i64 = 107;
    pub const COMMAND_UNAVAILABLE: i64 = 108;
    pub const NOT_INITIALIZED: i64 = 109;
    pub const INCORRECT_TYPE: i64 = 111;
    pub const OBJECT_TOO_LARGE: i64 = 116;
    pub const OPERATION_FORBIDDEN: i64 = 119;
    pub const TIMEOUT: i64 = 124;
    pub const DUPLICATE_VALUE: i64 = 137;
    pub const TOO_MANY_COMMANDS_IN_BATCH_REQUEST: i64 = 154;
}

/// All possible errors from the Nimbus engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Caller mistakes
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("{0}")]
    OperationForbidden(String),

    #[error("object has no objectId: {0}")]
    MissingObjectId(String),

    // Wire errors
    #[error("could not encode request: {0}")]
    EncodingFailure(String),

    #[error("{0}")]
    InvalidJson(String),

    #[error("{0}")]
    ConnectionFailed(String),

    /// Failure reported by the backend, carrying its own code.
    #[error("server error {code}: {message}")]
    Server { code: i64, message: String },
}

impl Error {
    /// Build a backend-reported error.
    pub fn server(code: i64, message: impl Into<String>) -> Self {
        Error::Server {
            code,
            message: message.into(),
        }
    }

    /// Numeric code for this error (see [`codes`]).
    pub fn code(&self) -> i64 {
        match self {
            Error::InvalidArgument(_) | Error::IllegalState(_) => codes::OTHER_CAUSE,
            Error::InvalidOperation(_) => codes::INCORRECT_TYPE,
            Error::OperationForbidden(_) => codes::OPERATION_FORBIDDEN,
            Error::MissingObjectId(_) => codes::MISSING_OBJECT_ID,
            Error::EncodingFailure(_) | Error::InvalidJson(_) => codes::INVALID_JSON,
            Error::ConnectionFailed(_) => codes::CONNECTION_FAILED,
            Error::Server { code, .. } => *code,
        }
    }

    /// Human-readable message without the kind prefix.
    pub fn message(&self) -> String {
        match self {
            Error::InvalidArgument(msg)
            | Error::InvalidOperation(msg)
            | Error::IllegalState(msg)
            | Error::OperationForbidden(msg)
            | Error::MissingObjectId(msg)
            | Error::EncodingFailure(msg)
            | Error::InvalidJson(msg)
            | Error::ConnectionFailed(msg) => msg.clone(),
            Error::Server { message, .. } => message.clone(),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
