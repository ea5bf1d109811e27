//! Codec Registry
//!
//! Keyed lookup of type-erased codecs by `TypeId` and by wire tag. The
//! runtime resolves channel and remote-function codecs through here at
//! registration time, so an unregistered structured type is reported when a
//! module declares the channel rather than when the first value is sent.

use crate::error::{CodecError, Result};
use crate::wire::WireType;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;
use types::{Payload, TypeTag};

/// Object-safe view of a [`WireType`] codec
pub trait ErasedCodec: Send + Sync {
    fn type_tag(&self) -> &TypeTag;

    fn type_name(&self) -> &'static str;

    fn value_type_id(&self) -> TypeId;

    /// Encode a value whose concrete type must match this codec
    fn encode_any(&self, value: &dyn Any) -> Result<Payload>;

    fn decode_any(&self, payload: &Payload) -> Result<Box<dyn Any + Send>>;
}

struct TypedCodec<T> {
    tag: TypeTag,
    _marker: PhantomData<fn() -> T>,
}

impl<T: WireType> TypedCodec<T> {
    fn new() -> Self {
        Self {
            tag: T::type_tag(),
            _marker: PhantomData,
        }
    }
}

impl<T: WireType> ErasedCodec for TypedCodec<T> {
    fn type_tag(&self) -> &TypeTag {
        &self.tag
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn value_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn encode_any(&self, value: &dyn Any) -> Result<Payload> {
        match value.downcast_ref::<T>() {
            Some(value) => value.encode(),
            None => Err(CodecError::type_mismatch(self.type_name(), "foreign value")),
        }
    }

    fn decode_any(&self, payload: &Payload) -> Result<Box<dyn Any + Send>> {
        Ok(Box::new(T::decode(payload)?))
    }
}

#[derive(Default)]
struct RegistryState {
    by_type: HashMap<TypeId, Arc<dyn ErasedCodec>>,
    by_tag: HashMap<TypeTag, Arc<dyn ErasedCodec>>,
}

/// Registry of codecs keyed by Rust type and by wire tag
pub struct CodecRegistry {
    state: RwLock<RegistryState>,
}

impl CodecRegistry {
    /// Registry without any codecs, mostly useful in tests
    pub fn empty() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Registry preloaded with every built-in category
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        registry.register_builtins();
        registry
    }

    fn register_builtins(&self) {
        macro_rules! builtins {
            ($($ty:ty),* $(,)?) => {
                $(
                    self.insert(Arc::new(TypedCodec::<$ty>::new()));
                    self.insert(Arc::new(TypedCodec::<Vec<$ty>>::new()));
                    self.insert(Arc::new(TypedCodec::<HashMap<String, $ty>>::new()));
                )*
            };
        }

        builtins!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String);
        self.insert(Arc::new(TypedCodec::<bool>::new()));
        self.insert(Arc::new(TypedCodec::<()>::new()));
    }

    fn insert(&self, codec: Arc<dyn ErasedCodec>) {
        let mut state = self.state.write();
        state.by_tag.insert(codec.type_tag().clone(), codec.clone());
        state.by_type.insert(codec.value_type_id(), codec);
    }

    /// Register `T`, returning its wire tag.
    ///
    /// Registering the same type twice is a no-op. A different type claiming
    /// an already-used tag is rejected.
    pub fn register<T: WireType>(&self) -> Result<TypeTag> {
        let codec: Arc<dyn ErasedCodec> = Arc::new(TypedCodec::<T>::new());
        let tag = codec.type_tag().clone();

        let mut state = self.state.write();
        if let Some(existing) = state.by_tag.get(&tag) {
            if existing.value_type_id() == TypeId::of::<T>() {
                return Ok(tag);
            }
            return Err(CodecError::TagConflict {
                tag,
                existing: existing.type_name(),
                requested: std::any::type_name::<T>(),
            });
        }

        debug!(type_tag = %tag, type_name = std::any::type_name::<T>(), "Registered codec");
        state.by_tag.insert(tag.clone(), codec.clone());
        state.by_type.insert(TypeId::of::<T>(), codec);
        Ok(tag)
    }

    /// Codec for `T`, or [`CodecError::UnsupportedType`] if never registered
    pub fn codec<T: WireType>(&self) -> Result<Arc<dyn ErasedCodec>> {
        self.state
            .read()
            .by_type
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or(CodecError::UnsupportedType {
                type_name: std::any::type_name::<T>(),
            })
    }

    pub fn codec_for_tag(&self, tag: &TypeTag) -> Result<Arc<dyn ErasedCodec>> {
        self.state
            .read()
            .by_tag
            .get(tag)
            .cloned()
            .ok_or_else(|| CodecError::UnknownTag { tag: tag.clone() })
    }

    pub fn contains<T: WireType>(&self) -> bool {
        self.state.read().by_type.contains_key(&TypeId::of::<T>())
    }

    /// Encode through the registry, failing for unregistered types
    pub fn encode<T: WireType>(&self, value: &T) -> Result<Payload> {
        self.codec::<T>()?;
        value.encode()
    }

    pub fn decode<T: WireType>(&self, payload: &Payload) -> Result<T> {
        self.codec::<T>()?;
        T::decode(payload)
    }

    pub fn len(&self) -> usize {
        self.state.read().by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codecs", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Reading {
        sensor: String,
        celsius: f64,
    }
    crate::structured_message!(Reading, "test.Reading");

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Impostor {
        value: u8,
    }
    crate::structured_message!(Impostor, "test.Reading");

    #[test]
    fn test_builtins_are_preloaded() {
        let registry = CodecRegistry::with_builtins();
        assert!(registry.contains::<i64>());
        assert!(registry.contains::<Vec<String>>());
        assert!(registry.contains::<HashMap<String, u16>>());
        assert!(registry.contains::<()>());
        assert!(!registry.contains::<Reading>());
    }

    #[test]
    fn test_unregistered_structured_type_is_typed_error() {
        let registry = CodecRegistry::with_builtins();
        let err = registry
            .encode(&Reading {
                sensor: "a".into(),
                celsius: 1.5,
            })
            .unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedType { .. }));
    }

    #[test]
    fn test_register_structured_type() {
        let registry = CodecRegistry::with_builtins();
        let tag = registry.register::<Reading>().unwrap();
        assert_eq!(tag.as_str(), "test.Reading");
        // idempotent
        registry.register::<Reading>().unwrap();

        let value = Reading {
            sensor: "thermometer".into(),
            celsius: 21.25,
        };
        let payload = registry.encode(&value).unwrap();
        let decoded: Reading = registry.decode(&payload).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_tag_conflict_rejected() {
        let registry = CodecRegistry::with_builtins();
        registry.register::<Reading>().unwrap();
        let err = registry.register::<Impostor>().unwrap_err();
        assert!(matches!(err, CodecError::TagConflict { .. }));
    }

    #[test]
    fn test_erased_codec_roundtrip() {
        let registry = CodecRegistry::with_builtins();
        let codec = registry.codec_for_tag(&TypeTag::new("list<int64>")).unwrap();
        let payload = codec.encode_any(&vec![1i64, 2, 3]).unwrap();
        let decoded = codec.decode_any(&payload).unwrap();
        assert_eq!(decoded.downcast_ref::<Vec<i64>>(), Some(&vec![1, 2, 3]));

        assert!(codec.encode_any(&"wrong").is_err());
    }
}
