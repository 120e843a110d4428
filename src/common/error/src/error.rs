//! Core error types for hyperlens.

use thiserror::Error;

/// Result type alias using `LensError`.
pub type LensResult<T> = std::result::Result<T, LensError>;

/// Generic boxed error for external error sources.
pub type GenericError = Box<dyn std::error::Error + Send + Sync>;

/// Number of lines of an upstream message kept in an execution diagnostic.
pub const DEFAULT_DIAGNOSTIC_LINES: usize = 3;

/// Core error type for hyperlens operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LensError {
    /// A component was constructed from the wrong kind of metadata node.
    #[error("ConstructionError: {0}")]
    Construction(String),

    /// Malformed builder invocation: bad projection token, missing operands,
    /// unknown mode, or a filtered-only operator outside filtered state.
    #[error("OperationError: {0}")]
    Operation(String),

    /// The entity set is not in a state that allows the transition.
    #[error("StateError: {0}")]
    State(String),

    /// The external store rejected or failed a generated query.
    #[error("ExecutionError[{query_id}]: {diagnostic}")]
    Execution {
        /// Label of the query or statement that failed.
        query_id: String,
        /// First lines of the upstream message.
        diagnostic: String,
    },

    /// Unknown data model, entity, attribute or alias.
    #[error("MetadataError: {0}")]
    Metadata(String),

    /// Feature not supported.
    #[error("NotImplemented: {0}")]
    NotImplemented(String),

    /// Invalid parameter provided.
    #[error("InvalidParameter: {0}")]
    InvalidParameter(String),

    /// Internal error (bug in hyperlens).
    #[error("InternalError: {0}")]
    Internal(String),

    /// IO error.
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error.
    #[error("ArrowError: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    /// JSON serialization error.
    #[error("SerdeJsonError: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// External error from third-party libraries.
    #[error("ExternalError: {0}")]
    External(GenericError),
}

impl LensError {
    /// Create a new `Construction` error.
    pub fn construction<S: Into<String>>(msg: S) -> Self {
        Self::Construction(msg.into())
    }

    /// Create a new `Operation` error.
    pub fn operation<S: Into<String>>(msg: S) -> Self {
        Self::Operation(msg.into())
    }

    /// Create a new `State` error.
    pub fn state<S: Into<String>>(msg: S) -> Self {
        Self::State(msg.into())
    }

    /// Create a new `Metadata` error.
    pub fn metadata<S: Into<String>>(msg: S) -> Self {
        Self::Metadata(msg.into())
    }

    /// Create a new `NotImplemented` error.
    pub fn not_implemented<S: Into<String>>(msg: S) -> Self {
        Self::NotImplemented(msg.into())
    }

    /// Create a new `InvalidParameter` error.
    pub fn invalid_parameter<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a new `Internal` error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an `Execution` error, keeping the first
    /// [`DEFAULT_DIAGNOSTIC_LINES`] lines of the upstream message.
    pub fn execution(query_id: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::execution_with_lines(query_id, message, DEFAULT_DIAGNOSTIC_LINES)
    }

    /// Create an `Execution` error keeping at most `lines` lines of the message.
    pub fn execution_with_lines(
        query_id: impl Into<String>,
        message: impl std::fmt::Display,
        lines: usize,
    ) -> Self {
        let message = message.to_string();
        let diagnostic = message
            .lines()
            .take(lines.max(1))
            .collect::<Vec<_>>()
            .join("\n");
        Self::Execution {
            query_id: query_id.into(),
            diagnostic,
        }
    }

    /// Wrap an error from a third-party library.
    pub fn external<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::External(Box::new(err))
    }

    /// Whether this error leaves a multi-statement transition half applied.
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution { .. })
    }
}

/// Ensure a condition holds, returning an `Operation` error if not.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $variant:ident: $($msg:tt)*) => {
        if !$cond {
            return Err($crate::LensError::$variant(format!($($msg)*)));
        }
    };
    ($cond:expr, $msg:expr) => {
        if !$cond {
            return Err($crate::LensError::Operation($msg.to_string()));
        }
    };
}

/// Return early with an `Operation` error.
#[macro_export]
macro_rules! operation_err {
    ($($arg:tt)*) => {
        return Err($crate::LensError::Operation(format!($($arg)*)))
    };
}

/// Return early with a `State` error.
#[macro_export]
macro_rules! state_err {
    ($($arg:tt)*) => {
        return Err($crate::LensError::State(format!($($arg)*)))
    };
}
