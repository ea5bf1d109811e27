//! Package Envelope
//!
//! The unit exchanged with the middleware over the stream. Addressing fields
//! are plain strings; an empty string means "unset".

use crate::control::ControlValue;
use crate::time::current_timestamp_ms;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Wire identifier of an encoded payload type, e.g. `int64` or `list<string>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeTag(String);

impl TypeTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for TypeTag {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

/// Typed wire envelope: a type tag plus the encoded value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub type_tag: TypeTag,
    pub bytes: Vec<u8>,
}

impl Payload {
    pub fn new(type_tag: TypeTag, bytes: Vec<u8>) -> Self {
        Self { type_tag, bytes }
    }
}

/// Exactly one of payload or control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PackageBody {
    Payload(Payload),
    Control(ControlValue),
}

/// Errors raised while framing a package body
#[derive(Debug, Error)]
pub enum WireError {
    #[error("failed to encode package: {0}")]
    Encode(#[source] bincode::Error),

    #[error("failed to decode package: {0}")]
    Decode(#[source] bincode::Error),
}

/// Wire-level envelope carrying either a typed payload or a control value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    pub channel: String,
    pub source_module: String,
    pub target_module: String,
    pub source_host: String,
    pub target_host: String,
    pub source_user_token: String,
    pub target_user_token: String,
    pub device_id: String,
    pub unix_timestamp_ms: u64,
    pub body: PackageBody,
}

impl Package {
    fn new(body: PackageBody) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel: String::new(),
            source_module: String::new(),
            target_module: String::new(),
            source_host: String::new(),
            target_host: String::new(),
            source_user_token: String::new(),
            target_user_token: String::new(),
            device_id: String::new(),
            unix_timestamp_ms: current_timestamp_ms(),
            body,
        }
    }

    /// New data package with a fresh id and the current timestamp
    pub fn with_payload(payload: Payload) -> Self {
        Self::new(PackageBody::Payload(payload))
    }

    /// New control package with a fresh id and the current timestamp
    pub fn with_control(control: ControlValue) -> Self {
        Self::new(PackageBody::Control(control))
    }

    pub fn on_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn from_module(mut self, module_id: impl Into<String>) -> Self {
        self.source_module = module_id.into();
        self
    }

    pub fn to_module(mut self, module_id: impl Into<String>) -> Self {
        self.target_module = module_id.into();
        self
    }

    pub fn from_host(mut self, host: impl Into<String>, user_token: impl Into<String>) -> Self {
        self.source_host = host.into();
        self.source_user_token = user_token.into();
        self
    }

    pub fn stamped_at(mut self, unix_timestamp_ms: u64) -> Self {
        self.unix_timestamp_ms = unix_timestamp_ms;
        self
    }

    pub fn payload(&self) -> Option<&Payload> {
        match &self.body {
            PackageBody::Payload(payload) => Some(payload),
            PackageBody::Control(_) => None,
        }
    }

    pub fn control(&self) -> Option<&ControlValue> {
        match &self.body {
            PackageBody::Control(control) => Some(control),
            PackageBody::Payload(_) => None,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self.body, PackageBody::Control(_))
    }

    /// Build a reply addressed back to the sender of `self`.
    ///
    /// Source and target module, host and user token are swapped; channel and
    /// device are carried over.
    pub fn reply(&self, body: PackageBody) -> Package {
        Package {
            id: Uuid::new_v4().to_string(),
            channel: self.channel.clone(),
            source_module: self.target_module.clone(),
            target_module: self.source_module.clone(),
            source_host: self.target_host.clone(),
            target_host: self.source_host.clone(),
            source_user_token: self.target_user_token.clone(),
            target_user_token: self.source_user_token.clone(),
            device_id: self.device_id.clone(),
            unix_timestamp_ms: current_timestamp_ms(),
            body,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        bincode::serialize(self).map_err(WireError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        bincode::deserialize(bytes).map_err(WireError::Decode)
    }
}
