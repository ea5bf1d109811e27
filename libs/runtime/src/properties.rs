//! Typed access to a module's startup properties.
//!
//! Keys that are asked for but missing (or not convertible) are remembered so
//! the runtime can report them after `initialize` returns.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use types::{PropertyMap, PropertyValue};

/// Numeric types a property can be read as
pub trait PropertyNumber: Sized {
    fn from_f64(value: f64) -> Option<Self>;
}

macro_rules! impl_property_integer {
    ($($ty:ty),* $(,)?) => {
        $(
            impl PropertyNumber for $ty {
                fn from_f64(value: f64) -> Option<Self> {
                    if value.fract() != 0.0 || value < <$ty>::MIN as f64 || value > <$ty>::MAX as f64 {
                        return None;
                    }
                    Some(value as $ty)
                }
            }
        )*
    };
}

impl_property_integer!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl PropertyNumber for f64 {
    fn from_f64(value: f64) -> Option<Self> {
        Some(value)
    }
}

impl PropertyNumber for f32 {
    fn from_f64(value: f64) -> Option<Self> {
        Some(value as f32)
    }
}

#[derive(Debug, Default)]
pub struct Properties {
    values: PropertyMap,
    unknown: Mutex<BTreeSet<String>>,
}

impl Properties {
    pub fn new(values: PropertyMap) -> Self {
        Self {
            values,
            unknown: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn raw(&self) -> &PropertyMap {
        &self.values
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        let value = self.values.get(key);
        if value.is_none() {
            self.mark_unknown(key);
        }
        value
    }

    /// String value; numbers and booleans are rendered as text
    pub fn string(&self, key: &str) -> Option<String> {
        let value = match self.get(key)? {
            PropertyValue::String(s) => Some(s.clone()),
            PropertyValue::Number(n) => Some(n.to_string()),
            PropertyValue::Bool(b) => Some(b.to_string()),
            _ => None,
        };
        self.track(key, value)
    }

    /// Numeric value; numeric strings are parsed
    pub fn number<T: PropertyNumber>(&self, key: &str) -> Option<T> {
        let value = match self.get(key)? {
            PropertyValue::Number(n) => T::from_f64(*n),
            PropertyValue::String(s) => s.trim().parse::<f64>().ok().and_then(T::from_f64),
            _ => None,
        };
        self.track(key, value)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        let value = match self.get(key)? {
            PropertyValue::Bool(b) => Some(*b),
            PropertyValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        };
        self.track(key, value)
    }

    pub fn string_or(&self, key: &str, default: &str) -> String {
        self.string(key).unwrap_or_else(|| default.to_string())
    }

    pub fn number_or<T: PropertyNumber>(&self, key: &str, default: T) -> T {
        self.number(key).unwrap_or(default)
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.bool(key).unwrap_or(default)
    }

    pub fn was_any_property_unknown(&self) -> bool {
        !self.unknown.lock().is_empty()
    }

    /// Keys requested but missing or unconvertible, sorted
    pub fn unknown_properties(&self) -> Vec<String> {
        self.unknown.lock().iter().cloned().collect()
    }

    fn track<T>(&self, key: &str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.mark_unknown(key);
        }
        value
    }

    fn mark_unknown(&self, key: &str) {
        self.unknown.lock().insert(key.to_string());
    }
}
