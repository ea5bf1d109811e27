//! # Module Runtime Codec
//!
//! ## Purpose
//!
//! Converts native Rust values to and from the typed [`Payload`] envelope
//! carried by data packages and remote function calls.
//!
//! ## Two Layers
//!
//! - **Static codecs**: every supported type implements [`WireType`], which
//!   gives it a wire [`TypeTag`] plus `encode`/`decode`. Channel handles and
//!   remote functions are generic over `WireType`, so their codec is chosen at
//!   compile time.
//! - **Keyed registry**: [`CodecRegistry`] maps a `TypeId` (and a wire tag) to
//!   a type-erased [`ErasedCodec`]. Built-in types are registered up front;
//!   user-defined structured messages must be registered before use, and a
//!   missing registration surfaces as [`CodecError::UnsupportedType`].
//!
//! ## Supported Categories
//!
//! | Category    | Rust types                                  | Tag example          |
//! |-------------|---------------------------------------------|----------------------|
//! | Integers    | `i8`..`i64`, `u8`..`u64`                    | `int64`              |
//! | Floats      | `f32`, `f64`                                | `float64`            |
//! | Boolean     | `bool`                                      | `bool`               |
//! | String      | `String`                                    | `string`             |
//! | Sequences   | `Vec<E>` for numeric or string `E`          | `list<int32>`        |
//! | Maps        | `HashMap<String, E>` for numeric or string  | `map<string,string>` |
//! | Structured  | any serde type declared with [`structured_message!`] | declared name |
//! | Void        | `()`                                        | `void`               |
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → libs/runtime
//!     ↑           ↓            ↓
//! Payload    WireType     Channels, RPC
//! TypeTag    Registry     parameter codecs
//! ```

pub mod error;
pub mod registry;
pub mod wire;

pub use error::{CodecError, Result};
pub use registry::{CodecRegistry, ErasedCodec};
pub use types::{Payload, TypeTag};
pub use wire::{decode_serde, encode_serde, SequenceElement, TypeCategory, WireType};
