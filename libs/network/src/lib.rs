//! Middleware Connection Infrastructure
//!
//! This crate owns the stream between a runtime and the middleware core:
//! address parsing, length-prefixed package framing, the mandatory
//! ping/pong handshake and the two concurrent lanes that move packages once
//! the handshake has completed.
//!
//! ```text
//!   modules ──enqueue──▶ OutboundQueue ──▶ outbound lane ──▶ stream
//!   runtime ◀──recv──── Connection ◀──── inbound lane ◀──── stream
//! ```

pub mod address;
pub mod dispatcher;
pub mod error;
pub mod framing;

// Re-export commonly used types
pub use address::StreamAddress;
pub use dispatcher::{
    outbound_queue, Connection, ConnectionSettings, Dispatcher, OutboundDrain, OutboundQueue,
    DEFAULT_DISCOVERY_TIMEOUT, DEFAULT_HANDSHAKE_TIMEOUT,
};
pub use error::{Result, TransportError};
pub use framing::{FrameReader, FrameWriter, DEFAULT_MAX_MESSAGE_SIZE};
