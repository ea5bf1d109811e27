//! Control Values
//!
//! Tagged union carried by control packages. The reserved variants at the end
//! are part of the protocol but have no defined behaviour on this side; the
//! runtime logs them on receipt.

use crate::package::Package;
use crate::properties::PropertyMap;
use crate::rpc::{RemoteFunctionRequest, RemoteFunctionReturn};
use serde::{Deserialize, Serialize};

/// Module instance the middleware asks this runtime to host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub module_id: String,
    pub module_class: String,
    pub properties: PropertyMap,
}

/// Example packages advertising one module's channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleChannels {
    pub module_id: String,
    pub channel_packets: Vec<Package>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerProfileKind {
    Unspecified,
    Unrestricted,
    PowerSaving,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerProfile {
    pub kind: PowerProfileKind,
    pub frequency_hz: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlValue {
    Ping {
        runtime: String,
    },
    ModuleListRequest {
        runtime: String,
        supported_classes: Vec<String>,
    },
    ModuleListResponse {
        descriptors: Vec<ModuleDescriptor>,
    },
    InitRuntimeRequest {
        runtime: String,
        modules: Vec<ModuleChannels>,
    },
    ConnectedToRemoteServer,
    DisconnectedFromRemoteServer,
    RpcRequest(RemoteFunctionRequest),
    RpcResponse(RemoteFunctionReturn),

    // Reserved
    UnloadModules {
        module_ids: Vec<String>,
    },
    RestartRuntime {
        runtime: String,
    },
    PauseModule {
        module_id: String,
    },
    UnpauseModule {
        module_id: String,
    },
    AdjustPowerProfile {
        module_id: String,
        profile: PowerProfile,
    },
}

impl ControlValue {
    /// Stable name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            ControlValue::Ping { .. } => "ping",
            ControlValue::ModuleListRequest { .. } => "module-list-request",
            ControlValue::ModuleListResponse { .. } => "module-list-response",
            ControlValue::InitRuntimeRequest { .. } => "init-runtime-request",
            ControlValue::ConnectedToRemoteServer => "connected-to-remote-server",
            ControlValue::DisconnectedFromRemoteServer => "disconnected-from-remote-server",
            ControlValue::RpcRequest(_) => "rpc-request",
            ControlValue::RpcResponse(_) => "rpc-response",
            ControlValue::UnloadModules { .. } => "unload-modules",
            ControlValue::RestartRuntime { .. } => "restart-runtime",
            ControlValue::PauseModule { .. } => "pause-module",
            ControlValue::UnpauseModule { .. } => "unpause-module",
            ControlValue::AdjustPowerProfile { .. } => "adjust-power-profile",
        }
    }

    /// Accepted by the protocol but without defined behaviour
    pub fn is_reserved(&self) -> bool {
        matches!(
            self,
            ControlValue::UnloadModules { .. }
                | ControlValue::RestartRuntime { .. }
                | ControlValue::PauseModule { .. }
                | ControlValue::UnpauseModule { .. }
                | ControlValue::AdjustPowerProfile { .. }
        )
    }
}
