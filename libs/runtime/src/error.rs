//! Runtime error types
//!
//! [`RuntimeError`] covers lifecycle and registration failures,
//! [`CallError`] is the failure side of a remote function future, and
//! [`RoutingError`] explains why an inbound package was not delivered.
//! Routing errors are logged by the dispatch loop and never abort the
//! runtime.

use codec::CodecError;
use network::TransportError;
use thiserror::Error;
use types::{ExecutionStatus, TypeTag};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Module class '{class}' is not registered with the factory")]
    UnknownModuleClass { class: String },

    #[error("Module class '{class}' is already registered")]
    DuplicateModuleClass { class: String },

    #[error("Module id '{module_id}' appears more than once in the module list")]
    DuplicateModuleId { module_id: String },

    #[error("Remote function '{name}' is already registered for {owner}")]
    DuplicateFunction { name: String, owner: String },

    #[error("Module '{module_id}' already has a periodic function named '{name}'")]
    DuplicateTask { module_id: String, name: String },

    #[error("Module '{module_id}' called {operation} outside of initialize")]
    RegistrationClosed {
        module_id: String,
        operation: &'static str,
    },

    #[error(
        "Channel '{channel}' of module '{module_id}' carries '{declared}', cannot register it as '{requested}'"
    )]
    ChannelTypeConflict {
        module_id: String,
        channel: String,
        declared: TypeTag,
        requested: TypeTag,
    },

    #[error("Channel '{channel}' of module '{module_id}' was not published; it cannot be posted to")]
    ReadOnlyChannel { module_id: String, channel: String },

    #[error("Module '{module_id}' cannot map its own remote function '{function}'")]
    SelfMapping { module_id: String, function: String },

    #[error("Invalid schedule: {reason}")]
    InvalidSchedule { reason: String },

    #[error("Module '{module_id}' failed to initialize: {message}")]
    ModuleInitialization { module_id: String, message: String },

    #[error("Invalid runtime state: {message}")]
    InvalidState { message: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl RuntimeError {
    pub fn invalid_schedule(reason: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            reason: reason.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Errors that abort startup before any module runs
    pub fn is_startup_error(&self) -> bool {
        matches!(
            self,
            RuntimeError::UnknownModuleClass { .. }
                | RuntimeError::DuplicateModuleId { .. }
                | RuntimeError::ModuleInitialization { .. }
                | RuntimeError::Transport(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Failure outcome of a remote function call
#[derive(Debug, Error)]
pub enum CallError {
    #[error("Remote function {identifier} failed with status {status}")]
    Failed {
        identifier: String,
        status: ExecutionStatus,
    },

    #[error("Remote function call timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },

    #[error("Remote function call was abandoned before a response arrived")]
    Abandoned,

    #[error("Remote function {identifier} returned no value")]
    MissingReturnValue { identifier: String },

    #[error("Failed to decode remote function return value: {0}")]
    Decode(#[source] CodecError),
}

impl CallError {
    /// Execution status reported by the remote side, if it got that far
    pub fn status(&self) -> Option<ExecutionStatus> {
        match self {
            CallError::Failed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Why an inbound package was not delivered
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("No module '{module_id}' registered channel '{channel}'")]
    UnknownChannel { channel: String, module_id: String },

    #[error("Channel '{channel}' of module '{module_id}' expects '{expected}', package carries '{actual}'")]
    TypeMismatch {
        channel: String,
        module_id: String,
        expected: TypeTag,
        actual: TypeTag,
    },

    #[error("Module '{module_id}' does not subscribe to channel '{channel}'")]
    NotSubscribed { channel: String, module_id: String },

    #[error("Package {package_id} carries no payload")]
    MissingPayload { package_id: String },
}
