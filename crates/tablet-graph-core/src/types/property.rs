//! Typed property values.
//!
//! Every vertex identifier and every element property is a [`PropertyValue`].
//! The schema decides which variant a given position carries; the store's
//! serialisers reject mismatches rather than coercing.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, EnumAccess, SeqAccess, VariantAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Ordered mapping from property name to value.
///
/// `BTreeMap` keeps iteration deterministic, which the codec relies on when
/// laying properties out in schema-declared order.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A single typed value in the property graph.
///
/// Serde representation is format-dependent: human-readable formats (the
/// operation JSON surface) see plain scalars, while compact binary formats
/// (iterator configuration payloads) see an ordinary tagged enum, which
/// non-self-describing codecs can decode.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

const VARIANTS: &[&str] = &["Bool", "Int", "Float", "Str", "Bytes"];

impl Serialize for PropertyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            match self {
                PropertyValue::Bool(v) => serializer.serialize_bool(*v),
                PropertyValue::Int(v) => serializer.serialize_i64(*v),
                PropertyValue::Float(v) => serializer.serialize_f64(*v),
                PropertyValue::Str(v) => serializer.serialize_str(v),
                PropertyValue::Bytes(v) => v.serialize(serializer),
            }
        } else {
            match self {
                PropertyValue::Bool(v) => {
                    serializer.serialize_newtype_variant("PropertyValue", 0, "Bool", v)
                }
                PropertyValue::Int(v) => {
                    serializer.serialize_newtype_variant("PropertyValue", 1, "Int", v)
                }
                PropertyValue::Float(v) => {
                    serializer.serialize_newtype_variant("PropertyValue", 2, "Float", v)
                }
                PropertyValue::Str(v) => {
                    serializer.serialize_newtype_variant("PropertyValue", 3, "Str", v)
                }
                PropertyValue::Bytes(v) => {
                    serializer.serialize_newtype_variant("PropertyValue", 4, "Bytes", v)
                }
            }
        }
    }
}

struct ScalarVisitor;

impl<'de> Visitor<'de> for ScalarVisitor {
    type Value = PropertyValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a bool, number, string or byte array")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(PropertyValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(PropertyValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        i64::try_from(v)
            .map(PropertyValue::Int)
            .map_err(|_| E::custom("integer out of range"))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(PropertyValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(PropertyValue::Str(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(PropertyValue::Str(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Ok(PropertyValue::Bytes(v.to_vec()))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut bytes = Vec::new();
        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.push(byte);
        }
        Ok(PropertyValue::Bytes(bytes))
    }
}

struct TaggedVisitor;

impl<'de> Visitor<'de> for TaggedVisitor {
    type Value = PropertyValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a PropertyValue variant")
    }

    fn visit_enum<A: EnumAccess<'de>>(self, access: A) -> Result<Self::Value, A::Error> {
        #[derive(Deserialize)]
        enum Tag {
            Bool,
            Int,
            Float,
            Str,
            Bytes,
        }
        let (tag, variant) = access.variant::<Tag>()?;
        match tag {
            Tag::Bool => variant.newtype_variant().map(PropertyValue::Bool),
            Tag::Int => variant.newtype_variant().map(PropertyValue::Int),
            Tag::Float => variant.newtype_variant().map(PropertyValue::Float),
            Tag::Str => variant.newtype_variant().map(PropertyValue::Str),
            Tag::Bytes => variant.newtype_variant().map(PropertyValue::Bytes),
        }
    }
}

impl<'de> Deserialize<'de> for PropertyValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(ScalarVisitor)
        } else {
            deserializer.deserialize_enum("PropertyValue", VARIANTS, TaggedVisitor)
        }
    }
}

impl PropertyValue {
    /// Human-readable variant name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Int(_) => "int",
            PropertyValue::Float(_) => "float",
            PropertyValue::Str(_) => "string",
            PropertyValue::Bytes(_) => "bytes",
        }
    }

    /// Compares two values of the same variant.
    ///
    /// Returns `None` when the variants differ (or a float comparison is
    /// undefined); predicates treat that as "does not match" rather than
    /// inventing a cross-type ordering.
    pub fn compare(&self, other: &PropertyValue) -> Option<Ordering> {
        match (self, other) {
            (PropertyValue::Bool(a), PropertyValue::Bool(b)) => Some(a.cmp(b)),
            (PropertyValue::Int(a), PropertyValue::Int(b)) => Some(a.cmp(b)),
            (PropertyValue::Float(a), PropertyValue::Float(b)) => a.partial_cmp(b),
            (PropertyValue::Str(a), PropertyValue::Str(b)) => Some(a.cmp(b)),
            (PropertyValue::Bytes(a), PropertyValue::Bytes(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Str(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Str(v)
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(v: Vec<u8>) -> Self {
        PropertyValue::Bytes(v)
    }
}
