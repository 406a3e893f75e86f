//! Order-preserving typed serialisers.
//!
//! Vertex identifiers and group-by properties end up inside row and column
//! byte strings, where lexicographic order on the bytes must follow the
//! logical order of the values. Each serialiser here documents whether it
//! preserves order; the fixed-width integer and float codecs use the usual
//! offset-binary / sign-flip tricks so that signed values sort correctly as
//! unsigned big-endian bytes.
//!
//! Serialisers never emit a delimiter guarantee themselves; keeping rows free
//! of the reserved delimiter byte is the key package's job (byte escaping in
//! the storage crate).

use serde::{Deserialize, Serialize};

use crate::error::SerialisationError;
use crate::types::PropertyValue;

const SIGN_BIT: u64 = 1 << 63;

/// Explicit registry of value codecs, selected per position by the schema.
///
/// A closed enum rather than a trait object: the set of codecs is part of the
/// on-disk format, and serialising a schema into iterator configuration needs
/// the choice to be a plain tag.
///
/// # Example
/// ```rust
/// use tablet_graph_core::serialisation::TypeSerialiser;
/// use tablet_graph_core::types::PropertyValue;
///
/// let codec = TypeSerialiser::OrderedInt;
/// let negative = codec.serialise(&PropertyValue::Int(-5)).unwrap();
/// let positive = codec.serialise(&PropertyValue::Int(3)).unwrap();
///
/// // Byte order follows value order, signs included.
/// assert!(negative < positive);
/// assert_eq!(codec.deserialise(&negative).unwrap(), PropertyValue::Int(-5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TypeSerialiser {
    /// Single byte, `0x00` / `0x01`.
    Boolean,
    /// Big-endian offset-binary `i64`; order-preserving.
    OrderedInt,
    /// Big-endian sign-flipped IEEE-754 `f64`; order-preserving.
    OrderedFloat,
    /// Raw UTF-8 bytes; order-preserving byte-wise.
    Utf8String,
    /// Raw bytes, passed through untouched.
    RawBytes,
}

impl TypeSerialiser {
    pub fn name(&self) -> &'static str {
        match self {
            TypeSerialiser::Boolean => "boolean",
            TypeSerialiser::OrderedInt => "ordered-int",
            TypeSerialiser::OrderedFloat => "ordered-float",
            TypeSerialiser::Utf8String => "utf8-string",
            TypeSerialiser::RawBytes => "raw-bytes",
        }
    }

    /// True when byte order follows value order. Every current codec
    /// preserves order; the method exists so schema validation can insist on
    /// it for vertex positions if a non-ordered codec is ever added.
    pub fn is_order_preserving(&self) -> bool {
        true
    }

    pub fn serialise(&self, value: &PropertyValue) -> Result<Vec<u8>, SerialisationError> {
        match (self, value) {
            (TypeSerialiser::Boolean, PropertyValue::Bool(b)) => Ok(vec![u8::from(*b)]),
            (TypeSerialiser::OrderedInt, PropertyValue::Int(v)) => {
                Ok(((*v as u64) ^ SIGN_BIT).to_be_bytes().to_vec())
            }
            (TypeSerialiser::OrderedFloat, PropertyValue::Float(v)) => {
                let bits = v.to_bits();
                let ordered = if bits & SIGN_BIT != 0 {
                    !bits
                } else {
                    bits | SIGN_BIT
                };
                Ok(ordered.to_be_bytes().to_vec())
            }
            (TypeSerialiser::Utf8String, PropertyValue::Str(s)) => Ok(s.as_bytes().to_vec()),
            (TypeSerialiser::RawBytes, PropertyValue::Bytes(b)) => Ok(b.clone()),
            (serialiser, value) => Err(SerialisationError::WrongType {
                serialiser: serialiser.name(),
                actual: value.type_name(),
            }),
        }
    }

    pub fn deserialise(&self, bytes: &[u8]) -> Result<PropertyValue, SerialisationError> {
        match self {
            TypeSerialiser::Boolean => match bytes {
                [0] => Ok(PropertyValue::Bool(false)),
                [1] => Ok(PropertyValue::Bool(true)),
                _ => Err(SerialisationError::Malformed {
                    serialiser: self.name(),
                    detail: format!("{} bytes, expected a single 0x00/0x01", bytes.len()),
                }),
            },
            TypeSerialiser::OrderedInt => {
                let raw = self.fixed_width::<8>(bytes)?;
                Ok(PropertyValue::Int(
                    (u64::from_be_bytes(raw) ^ SIGN_BIT) as i64,
                ))
            }
            TypeSerialiser::OrderedFloat => {
                let raw = self.fixed_width::<8>(bytes)?;
                let ordered = u64::from_be_bytes(raw);
                let bits = if ordered & SIGN_BIT != 0 {
                    ordered & !SIGN_BIT
                } else {
                    !ordered
                };
                Ok(PropertyValue::Float(f64::from_bits(bits)))
            }
            TypeSerialiser::Utf8String => match std::str::from_utf8(bytes) {
                Ok(s) => Ok(PropertyValue::Str(s.to_string())),
                Err(e) => Err(SerialisationError::Malformed {
                    serialiser: self.name(),
                    detail: e.to_string(),
                }),
            },
            TypeSerialiser::RawBytes => Ok(PropertyValue::Bytes(bytes.to_vec())),
        }
    }

    fn fixed_width<const N: usize>(&self, bytes: &[u8]) -> Result<[u8; N], SerialisationError> {
        bytes
            .try_into()
            .map_err(|_| SerialisationError::WrongLength {
                serialiser: self.name(),
                expected: N,
                actual: bytes.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(serialiser: TypeSerialiser, value: PropertyValue) {
        let bytes = serialiser.serialise(&value).unwrap();
        assert_eq!(serialiser.deserialise(&bytes).unwrap(), value);
    }

    #[test]
    fn round_trips() {
        round_trip(TypeSerialiser::Boolean, PropertyValue::Bool(true));
        round_trip(TypeSerialiser::OrderedInt, PropertyValue::Int(-42));
        round_trip(TypeSerialiser::OrderedInt, PropertyValue::Int(i64::MAX));
        round_trip(TypeSerialiser::OrderedFloat, PropertyValue::Float(-1.5));
        round_trip(TypeSerialiser::OrderedFloat, PropertyValue::Float(0.0));
        round_trip(TypeSerialiser::Utf8String, PropertyValue::Str("seed".into()));
        round_trip(TypeSerialiser::RawBytes, PropertyValue::Bytes(vec![0, 1, 255]));
    }

    #[test]
    fn ordered_int_sorts_like_values() {
        let values = [i64::MIN, -100, -1, 0, 1, 100, i64::MAX];
        let mut encoded: Vec<Vec<u8>> = values
            .iter()
            .map(|v| {
                TypeSerialiser::OrderedInt
                    .serialise(&PropertyValue::Int(*v))
                    .unwrap()
            })
            .collect();
        let sorted = encoded.clone();
        encoded.sort();
        assert_eq!(encoded, sorted);
    }

    #[test]
    fn ordered_float_sorts_like_values() {
        let values = [f64::NEG_INFINITY, -2.5, -0.0, 0.0, 1.0e-9, 3.5, f64::INFINITY];
        let encoded: Vec<Vec<u8>> = values
            .iter()
            .map(|v| {
                TypeSerialiser::OrderedFloat
                    .serialise(&PropertyValue::Float(*v))
                    .unwrap()
            })
            .collect();
        for pair in encoded.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn wrong_type_is_rejected() {
        let err = TypeSerialiser::OrderedInt
            .serialise(&PropertyValue::Str("nope".into()))
            .unwrap_err();
        assert!(matches!(err, SerialisationError::WrongType { .. }));
    }

    #[test]
    fn truncated_int_is_rejected() {
        let err = TypeSerialiser::OrderedInt.deserialise(&[1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            SerialisationError::WrongLength {
                expected: 8,
                actual: 3,
                ..
            }
        ));
    }
}
