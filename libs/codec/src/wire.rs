//! Static per-type codecs
//!
//! [`WireType`] is implemented here for every built-in category. Structured
//! messages get their implementation from [`structured_message!`].

use crate::error::{CodecError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use types::{Payload, TypeTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCategory {
    Integer,
    Float,
    Boolean,
    String,
    Sequence,
    Map,
    Structured,
    Void,
}

/// A native type with a wire representation
pub trait WireType: Sized + Send + Sync + 'static {
    const CATEGORY: TypeCategory;

    fn type_tag() -> TypeTag;

    fn encode(&self) -> Result<Payload>;

    fn decode(payload: &Payload) -> Result<Self>;
}

/// Element types allowed inside sequences and map values
pub trait SequenceElement: WireType + Serialize + DeserializeOwned {}

/// Encode a serde value under `type_tag` with bincode
pub fn encode_serde<T: Serialize>(type_tag: TypeTag, value: &T) -> Result<Payload> {
    match bincode::serialize(value) {
        Ok(bytes) => Ok(Payload::new(type_tag, bytes)),
        Err(source) => Err(CodecError::Encode { type_tag, source }),
    }
}

/// Check the payload tag against `expected`, then decode with bincode
pub fn decode_serde<T: DeserializeOwned>(expected: &TypeTag, payload: &Payload) -> Result<T> {
    if &payload.type_tag != expected {
        return Err(CodecError::type_mismatch(expected, &payload.type_tag));
    }
    bincode::deserialize(&payload.bytes).map_err(|source| CodecError::Decode {
        type_tag: expected.clone(),
        source,
    })
}

macro_rules! impl_primitive {
    ($($ty:ty => $tag:literal, $category:ident);* $(;)?) => {
        $(
            impl WireType for $ty {
                const CATEGORY: TypeCategory = TypeCategory::$category;

                fn type_tag() -> TypeTag {
                    TypeTag::new($tag)
                }

                fn encode(&self) -> Result<Payload> {
                    encode_serde(Self::type_tag(), self)
                }

                fn decode(payload: &Payload) -> Result<Self> {
                    decode_serde(&Self::type_tag(), payload)
                }
            }
        )*
    };
}

impl_primitive! {
    i8 => "int8", Integer;
    i16 => "int16", Integer;
    i32 => "int32", Integer;
    i64 => "int64", Integer;
    u8 => "uint8", Integer;
    u16 => "uint16", Integer;
    u32 => "uint32", Integer;
    u64 => "uint64", Integer;
    f32 => "float32", Float;
    f64 => "float64", Float;
    bool => "bool", Boolean;
    String => "string", String;
}

macro_rules! impl_sequence_element {
    ($($ty:ty),* $(,)?) => {
        $(impl SequenceElement for $ty {})*
    };
}

impl_sequence_element!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String);

impl<E: SequenceElement> WireType for Vec<E> {
    const CATEGORY: TypeCategory = TypeCategory::Sequence;

    fn type_tag() -> TypeTag {
        TypeTag::new(format!("list<{}>", E::type_tag()))
    }

    fn encode(&self) -> Result<Payload> {
        encode_serde(Self::type_tag(), self)
    }

    fn decode(payload: &Payload) -> Result<Self> {
        decode_serde(&Self::type_tag(), payload)
    }
}

impl<E: SequenceElement> WireType for HashMap<String, E> {
    const CATEGORY: TypeCategory = TypeCategory::Map;

    fn type_tag() -> TypeTag {
        TypeTag::new(format!("map<string,{}>", E::type_tag()))
    }

    fn encode(&self) -> Result<Payload> {
        encode_serde(Self::type_tag(), self)
    }

    fn decode(payload: &Payload) -> Result<Self> {
        decode_serde(&Self::type_tag(), payload)
    }
}

impl WireType for () {
    const CATEGORY: TypeCategory = TypeCategory::Void;

    fn type_tag() -> TypeTag {
        TypeTag::new("void")
    }

    fn encode(&self) -> Result<Payload> {
        Ok(Payload::new(Self::type_tag(), Vec::new()))
    }

    fn decode(payload: &Payload) -> Result<Self> {
        if payload.type_tag != Self::type_tag() {
            return Err(CodecError::type_mismatch(Self::type_tag(), &payload.type_tag));
        }
        Ok(())
    }
}

/// Declare a serde type as a structured message with a fixed wire name.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Reading { celsius: f64 }
/// codec::structured_message!(Reading, "demo.Reading");
/// ```
///
/// The type still has to be registered with a [`crate::CodecRegistry`]
/// before channels or remote functions can use it.
#[macro_export]
macro_rules! structured_message {
    ($ty:ty, $name:literal) => {
        impl $crate::WireType for $ty {
            const CATEGORY: $crate::TypeCategory = $crate::TypeCategory::Structured;

            fn type_tag() -> $crate::TypeTag {
                $crate::TypeTag::new($name)
            }

            fn encode(&self) -> $crate::Result<$crate::Payload> {
                $crate::encode_serde(<Self as $crate::WireType>::type_tag(), self)
            }

            fn decode(payload: &$crate::Payload) -> $crate::Result<Self> {
                $crate::decode_serde(&<Self as $crate::WireType>::type_tag(), payload)
            }
        }
    };
}
