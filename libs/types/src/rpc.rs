//! Remote Function Identifiers
//!
//! Request and return records embedded in `rpc-request` / `rpc-response`
//! control values. The return payload travels inside the control value.

use crate::package::Payload;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a remote function lives: a specific module or a named runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionTarget {
    Module(String),
    Runtime(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteFunctionIdentifier {
    pub function_name: String,
    pub target: FunctionTarget,
}

impl RemoteFunctionIdentifier {
    pub fn module(module_id: impl Into<String>, function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            target: FunctionTarget::Module(module_id.into()),
        }
    }

    pub fn runtime(runtime: impl Into<String>, function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            target: FunctionTarget::Runtime(runtime.into()),
        }
    }
}

impl fmt::Display for RemoteFunctionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            FunctionTarget::Module(module) => write!(f, "module:{}/{}", module, self.function_name),
            FunctionTarget::Runtime(runtime) => {
                write!(f, "runtime:{}/{}", runtime, self.function_name)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFunctionRequest {
    pub identifier: RemoteFunctionIdentifier,
    pub future_id: String,
    pub parameters: Vec<Payload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFunctionReturn {
    pub identifier: RemoteFunctionIdentifier,
    pub future_id: String,
    pub status: ExecutionStatus,
    pub payload: Option<Payload>,
}

/// Outcome reported by the executing side of a remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Ok,
    FailedInvalidNumberOfParameters,
    FailedMismatchingParameters,
    FailedFunctionNotFoundOrFailedToExecute,
    RequestInvalid,
}

impl ExecutionStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ExecutionStatus::Ok)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionStatus::Ok => "STATUS_OK",
            ExecutionStatus::FailedInvalidNumberOfParameters => {
                "FAILED_INVALID_NUMBER_OF_PARAMETERS"
            }
            ExecutionStatus::FailedMismatchingParameters => "FAILED_MISMATCHING_PARAMETERS",
            ExecutionStatus::FailedFunctionNotFoundOrFailedToExecute => {
                "FAILED_FUNCTION_NOT_FOUND_OR_FAILED_TO_EXECUTE"
            }
            ExecutionStatus::RequestInvalid => "REQUEST_INVALID",
        };
        f.write_str(name)
    }
}
