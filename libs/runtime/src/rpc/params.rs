//! Positional parameter lists for remote functions
//!
//! Implemented for tuples of up to six [`WireType`] values. `()` is the empty
//! parameter list.

use codec::{CodecRegistry, ErasedCodec, WireType};
use std::any::Any;
use std::sync::Arc;
use types::Payload;

pub trait ParameterList: Send + Sized + 'static {
    const ARITY: usize;

    /// One codec per position, resolved through `registry`
    fn codecs(registry: &CodecRegistry) -> codec::Result<Vec<Arc<dyn ErasedCodec>>>;

    /// Encode each value with the codec at its position
    fn encode(&self, codecs: &[Arc<dyn ErasedCodec>]) -> codec::Result<Vec<Payload>>;

    /// Rebuild the tuple from decoded values; `None` on arity or type mismatch
    fn from_values(values: Vec<Box<dyn Any + Send>>) -> Option<Self>;
}

macro_rules! impl_parameter_list {
    ($arity:expr; $($name:ident : $idx:tt),*) => {
        impl<$($name: WireType),*> ParameterList for ($($name,)*) {
            const ARITY: usize = $arity;

            #[allow(unused_variables)]
            fn codecs(registry: &CodecRegistry) -> codec::Result<Vec<Arc<dyn ErasedCodec>>> {
                Ok(vec![$(registry.codec::<$name>()?),*])
            }

            #[allow(unused_variables)]
            fn encode(&self, codecs: &[Arc<dyn ErasedCodec>]) -> codec::Result<Vec<Payload>> {
                let codec_at = |position: usize| {
                    codecs
                        .get(position)
                        .ok_or(codec::CodecError::MissingCodec { position, arity: $arity })
                };
                Ok(vec![$(codec_at($idx)?.encode_any(&self.$idx)?),*])
            }

            #[allow(unused_mut, unused_variables)]
            fn from_values(values: Vec<Box<dyn Any + Send>>) -> Option<Self> {
                if values.len() != $arity {
                    return None;
                }
                let mut values = values.into_iter();
                Some(($(*values.next()?.downcast::<$name>().ok()?,)*))
            }
        }
    };
}

impl_parameter_list!(0;);
impl_parameter_list!(1; A: 0);
impl_parameter_list!(2; A: 0, B: 1);
impl_parameter_list!(3; A: 0, B: 1, C: 2);
impl_parameter_list!(4; A: 0, B: 1, C: 2, D: 3);
impl_parameter_list!(5; A: 0, B: 1, C: 2, D: 3, E: 4);
impl_parameter_list!(6; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_and_rebuild_positionally() {
        let registry = CodecRegistry::with_builtins();
        let codecs = <(i32, String)>::codecs(&registry).unwrap();
        let payloads = (7i32, "seven".to_string()).encode(&codecs).unwrap();
        assert_eq!(payloads[0].type_tag.as_str(), "int32");
        assert_eq!(payloads[1].type_tag.as_str(), "string");

        let values = payloads
            .iter()
            .zip(&codecs)
            .map(|(payload, codec)| codec.decode_any(payload).unwrap())
            .collect();
        let rebuilt = <(i32, String)>::from_values(values).unwrap();
        assert_eq!(rebuilt, (7, "seven".to_string()));
    }

    #[test]
    fn test_short_codec_list_is_an_error() {
        let registry = CodecRegistry::with_builtins();
        let codecs = <(i32,)>::codecs(&registry).unwrap();
        let err = (1i32, 2i32).encode(&codecs).unwrap_err();
        assert!(matches!(err, codec::CodecError::MissingCodec { position: 1, arity: 2 }));
    }

    #[test]
    fn test_wrong_arity_or_type_rejected() {
        let values: Vec<Box<dyn Any + Send>> = vec![Box::new(1i32)];
        assert!(<(i32, i32)>::from_values(values).is_none());

        let values: Vec<Box<dyn Any + Send>> = vec![Box::new(1i64)];
        assert!(<(i32,)>::from_values(values).is_none());

        assert_eq!(<()>::ARITY, 0);
        assert!(<()>::from_values(Vec::new()).is_some());
    }
}
