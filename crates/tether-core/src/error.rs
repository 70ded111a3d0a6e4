//! Error types shared by the script runtime and the native bridge

use std::fmt;

use crate::value::Value;

/// Result type for script operations
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Errors raised while evaluating script operations or crossing the
/// native boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScriptError {
    /// Script value is not convertible to the requested native shape
    #[error("cannot use {value} (type {value_type}) as type {shape}")]
    Conversion {
        /// Rendering of the offending value
        value: String,
        /// Script type name of the offending value
        value_type: String,
        /// Expected native shape
        shape: String,
    },

    /// Mapping key names a struct field that does not exist
    #[error("type {type_name} has no field {field}")]
    UnknownField {
        /// Requested field name
        field: String,
        /// Struct type name
        type_name: String,
    },

    /// Protocol operation is not supported by the value's kind
    #[error("type {type_name} does not support {operation}")]
    UnsupportedOperation {
        /// Type name of the receiver
        type_name: String,
        /// Operation that was attempted
        operation: String,
    },

    /// Value cannot be used as a mapping key or set member
    #[error("unhashable type: {type_name}")]
    Unhashable {
        /// Type name of the value
        type_name: String,
    },

    /// Index outside the bounds of a sequence
    #[error("index {index} out of range [0:{len}]")]
    IndexOutOfRange {
        /// Requested index
        index: i64,
        /// Sequence length
        len: usize,
    },

    /// Wrong number of arguments passed to a callable
    #[error("{name}: expected {expected} arguments, got {got}")]
    ArgumentCount {
        /// Callable name
        name: String,
        /// Human-readable expected count (e.g. "2" or "at least 1")
        expected: String,
        /// Number of arguments received
        got: usize,
    },

    /// Invalid argument (unexpected keyword, duplicate binding, ...)
    #[error("argument error: {0}")]
    Argument(String),

    /// Value is not callable
    #[error("{type_name} is not callable")]
    NotCallable {
        /// Type name of the value
        type_name: String,
    },

    /// Reentrant call depth exceeded the configured limit
    #[error("call depth limit of {limit} exceeded")]
    CallDepthExceeded {
        /// Configured limit
        limit: usize,
    },

    /// Failure reported by host code
    #[error("{0}")]
    Host(String),

    /// A script callback invoked from native code failed.
    ///
    /// This is the fatal signal of the bridge: the native call that invoked
    /// the callback cannot continue and is terminated non-locally.
    #[error("script callback {callee} aborted: {source}")]
    Aborted {
        /// Name of the script callable
        callee: String,
        /// Underlying failure
        source: Box<ScriptError>,
    },
}

impl ScriptError {
    /// Conversion failure for `value` into `shape`
    pub fn conversion(value: &Value, shape: impl fmt::Display) -> Self {
        ScriptError::Conversion {
            value: value.to_string(),
            value_type: value.type_name(),
            shape: shape.to_string(),
        }
    }

    /// Unsupported protocol operation
    pub fn unsupported(type_name: impl Into<String>, operation: impl Into<String>) -> Self {
        ScriptError::UnsupportedOperation {
            type_name: type_name.into(),
            operation: operation.into(),
        }
    }

    /// Wrap a failure as a fatal callback abort. An error that is already an
    /// abort is returned unchanged.
    pub fn abort(callee: impl Into<String>, source: ScriptError) -> Self {
        match source {
            abort @ ScriptError::Aborted { .. } => abort,
            source => ScriptError::Aborted {
                callee: callee.into(),
                source: Box::new(source),
            },
        }
    }

    /// Whether this error is the fatal callback abort
    pub fn is_abort(&self) -> bool {
        matches!(self, ScriptError::Aborted { .. })
    }
}

impl From<String> for ScriptError {
    fn from(s: String) -> Self {
        ScriptError::Host(s)
    }
}

impl From<&str> for ScriptError {
    fn from(s: &str) -> Self {
        ScriptError::Host(s.to_string())
    }
}
