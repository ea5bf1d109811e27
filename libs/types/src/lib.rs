//! # Module Runtime Wire Types
//!
//! Data model shared by every layer of the module runtime: the [`Package`]
//! envelope exchanged with the middleware, the [`ControlValue`] union carried
//! by control packages, and the identifiers used by remote function calls.
//!
//! ## Design Philosophy
//!
//! - **One of payload or control**: [`PackageBody`] is an enum, so a package
//!   can never carry both a typed payload and a control value.
//! - **Serde everywhere**: every type derives `Serialize`/`Deserialize` and is
//!   framed on the wire with bincode.
//! - **No behaviour**: routing, codecs and transport live in the crates above.
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → libs/codec → libs/network → libs/runtime
//!     ↑             ↓             ↓              ↓
//! Package      WireType     Handshake     Modules, channels,
//! Control      Registry     Framing       RPC, scheduler
//! ```

pub mod control;
pub mod package;
pub mod properties;
pub mod rpc;
pub mod time;

pub use control::{ControlValue, ModuleChannels, ModuleDescriptor, PowerProfile, PowerProfileKind};
pub use package::{Package, PackageBody, Payload, TypeTag, WireError};
pub use properties::{PropertyMap, PropertyValue};
pub use rpc::{
    ExecutionStatus, FunctionTarget, RemoteFunctionIdentifier, RemoteFunctionRequest,
    RemoteFunctionReturn,
};
pub use time::current_timestamp_ms;

/// Runtime name this implementation announces during the handshake
pub const DEFAULT_RUNTIME_NAME: &str = "RUNTIME_RUST";

/// Runtime name of the middleware core, target of middleware-level functions
pub const MIDDLEWARE_RUNTIME_NAME: &str = "MIDDLEWARE_CORE";
