//! Error taxonomy for the bridge
//!
//! `NullHandle` and `ConstructionFailed` surface to whoever asked for the
//! object. `UnregisteredType` and `CallbackSignature` raised while a native
//! signal is being dispatched are logged and the dispatch is dropped; the
//! same errors are returned normally through direct calls.

use crate::native::TypeTag;
use thiserror::Error;

/// Bridge errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// A native call returned null where an object was required
    #[error("native call returned an unexpected null pointer ({context})")]
    NullHandle { context: String },

    /// A native constructor failed; carries the runtime's diagnostic text verbatim
    #[error("{constructor} failed: {}", describe(.message))]
    ConstructionFailed {
        constructor: String,
        message: Option<String>,
    },

    /// No marshaler is registered for a native type tag
    #[error("missing marshaler for type {tag}{}", type_suffix(.type_name))]
    UnregisteredType {
        tag: TypeTag,
        type_name: Option<String>,
    },

    /// A callback method cannot accept the decoded arguments
    #[error("callback '{method}' rejected its arguments: {reason}")]
    CallbackSignature { method: String, reason: String },

    /// A host value did not have the expected shape
    #[error("type mismatch: expected {expected}, found {found}")]
    ValueMismatch { expected: String, found: String },

    /// `connect_all` was already performed for this container
    #[error("signals of container {container:#x} are already connected")]
    AlreadyConnected { container: usize },

    /// An explicit close/finish step reported a native error
    #[error("{operation} failed: {message}")]
    Teardown { operation: String, message: String },

    /// Reading or writing an object property failed
    #[error("property '{name}': {message}")]
    Property { name: String, message: String },
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// Build a `ValueMismatch`
    pub fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        BridgeError::ValueMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Build a `NullHandle`
    pub fn null_handle(context: impl Into<String>) -> Self {
        BridgeError::NullHandle {
            context: context.into(),
        }
    }
}

fn describe(message: &Option<String>) -> &str {
    message
        .as_deref()
        .unwrap_or("native runtime gave no diagnostic")
}

fn type_suffix(type_name: &Option<String>) -> String {
    match type_name {
        Some(name) => format!(" ({})", name),
        None => String::new(),
    }
}
