//! Round-trip law for every built-in codec category:
//! `decode(encode(v)) == v`.

use codec::{CodecRegistry, WireType};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Sample {
    id: u32,
    label: String,
    values: Vec<f64>,
    tags: HashMap<String, String>,
}
codec::structured_message!(Sample, "test.Sample");

fn roundtrip<T: WireType + PartialEq + std::fmt::Debug>(value: T) -> Result<(), TestCaseError> {
    let payload = value.encode().map_err(|e| TestCaseError::fail(e.to_string()))?;
    prop_assert_eq!(&payload.type_tag, &T::type_tag());
    let decoded = T::decode(&payload).map_err(|e| TestCaseError::fail(e.to_string()))?;
    prop_assert_eq!(decoded, value);
    Ok(())
}

fn finite_f64() -> impl Strategy<Value = f64> {
    prop::num::f64::NORMAL | prop::num::f64::ZERO | prop::num::f64::SUBNORMAL
}

proptest! {
    #[test]
    fn integers_roundtrip(a in any::<i8>(), b in any::<i16>(), c in any::<i32>(), d in any::<i64>()) {
        roundtrip(a)?;
        roundtrip(b)?;
        roundtrip(c)?;
        roundtrip(d)?;
    }

    #[test]
    fn unsigned_roundtrip(a in any::<u8>(), b in any::<u16>(), c in any::<u32>(), d in any::<u64>()) {
        roundtrip(a)?;
        roundtrip(b)?;
        roundtrip(c)?;
        roundtrip(d)?;
    }

    #[test]
    fn floats_and_bools_roundtrip(x in finite_f64(), y in prop::num::f32::NORMAL, flag in any::<bool>()) {
        roundtrip(x)?;
        roundtrip(y)?;
        roundtrip(flag)?;
    }

    #[test]
    fn strings_roundtrip(s in ".*") {
        roundtrip(s)?;
    }

    #[test]
    fn sequences_roundtrip(
        ints in prop::collection::vec(any::<i64>(), 0..32),
        words in prop::collection::vec("[a-z]{0,12}", 0..16),
        floats in prop::collection::vec(finite_f64(), 0..16),
    ) {
        roundtrip(ints)?;
        roundtrip(words)?;
        roundtrip(floats)?;
    }

    #[test]
    fn maps_roundtrip(
        numbers in prop::collection::hash_map("[a-z]{1,8}", any::<u32>(), 0..16),
        strings in prop::collection::hash_map("[a-z]{1,8}", ".{0,16}", 0..16),
    ) {
        roundtrip(numbers)?;
        roundtrip(strings)?;
    }

    #[test]
    fn structured_roundtrip(
        id in any::<u32>(),
        label in "[ -~]{0,24}",
        values in prop::collection::vec(finite_f64(), 0..8),
        tags in prop::collection::hash_map("[a-z]{1,6}", "[a-z]{0,6}", 0..4),
    ) {
        let registry = CodecRegistry::with_builtins();
        registry.register::<Sample>().map_err(|e| TestCaseError::fail(e.to_string()))?;
        let sample = Sample { id, label, values, tags };
        let payload = registry.encode(&sample).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let decoded: Sample = registry.decode(&payload).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(decoded, sample);
    }

    #[test]
    fn erased_codecs_roundtrip_by_tag(value in any::<i32>()) {
        let registry = CodecRegistry::with_builtins();
        let codec = registry.codec_for_tag(&i32::type_tag()).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let payload = codec.encode_any(&value).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let decoded = codec.decode_any(&payload).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(decoded.downcast_ref::<i32>(), Some(&value));
    }
}
