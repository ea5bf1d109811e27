//! Codec errors
//!
//! Every failure of the type-to-wire mapping is a value of [`CodecError`];
//! nothing in this crate aborts the process.

use thiserror::Error;
use types::TypeTag;

#[derive(Debug, Error)]
pub enum CodecError {
    /// Type was never registered with the codec registry
    #[error("No codec registered for type {type_name}")]
    UnsupportedType { type_name: &'static str },

    /// Wire tag does not belong to any registered codec
    #[error("No codec registered for wire tag '{tag}'")]
    UnknownTag { tag: TypeTag },

    /// Payload tag (or erased value) does not match the codec
    #[error("Type mismatch: expected '{expected}', got '{actual}'")]
    TypeMismatch { expected: String, actual: String },

    #[error("Failed to encode '{type_tag}': {source}")]
    Encode {
        type_tag: TypeTag,
        source: bincode::Error,
    },

    #[error("Failed to decode '{type_tag}': {source}")]
    Decode {
        type_tag: TypeTag,
        source: bincode::Error,
    },

    /// Fewer codecs than values to encode
    #[error("No codec for parameter {position} of {arity}")]
    MissingCodec { position: usize, arity: usize },

    /// Two distinct Rust types claim the same wire tag
    #[error("Wire tag '{tag}' already registered for {existing}, cannot register {requested}")]
    TagConflict {
        tag: TypeTag,
        existing: &'static str,
        requested: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, CodecError>;

impl CodecError {
    pub fn type_mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// True for errors caused by the payload rather than by registration
    pub fn is_payload_error(&self) -> bool {
        matches!(
            self,
            CodecError::TypeMismatch { .. } | CodecError::Decode { .. } | CodecError::UnknownTag { .. }
        )
    }
}
