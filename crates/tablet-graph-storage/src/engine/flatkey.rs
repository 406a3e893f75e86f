//! Flat encoding of tablet keys for the RocksDB backend.
//!
//! RocksDB orders a single byte-string key, so the four key fields are
//! flattened with an order-preserving escape: `0x00` inside a field becomes
//! `0x00 0xFF` and each field ends with the terminator `0x00 0x01`. The
//! terminator compares below every escaped byte, which keeps the flat
//! ordering identical to field-wise ordering. The timestamp is appended
//! bit-inverted big-endian so newer entries sort first within an
//! aggregation key.

use crate::error::{CodecError, StoreResult};

use super::{KeyRange, TabletKey};

const ESCAPED_ZERO: [u8; 2] = [0x00, 0xFF];
const TERMINATOR: [u8; 2] = [0x00, 0x01];

fn push_field(out: &mut Vec<u8>, field: &[u8]) {
    for &byte in field {
        if byte == 0x00 {
            out.extend_from_slice(&ESCAPED_ZERO);
        } else {
            out.push(byte);
        }
    }
    out.extend_from_slice(&TERMINATOR);
}

/// Flattens a tablet key into one RocksDB key.
pub fn encode_flat_key(key: &TabletKey) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        key.row.len()
            + key.column_family.len()
            + key.column_qualifier.len()
            + key.column_visibility.len()
            + 16,
    );
    push_field(&mut out, &key.row);
    push_field(&mut out, &key.column_family);
    push_field(&mut out, &key.column_qualifier);
    push_field(&mut out, &key.column_visibility);
    out.extend_from_slice(&(!key.timestamp).to_be_bytes());
    out
}

fn read_field(bytes: &[u8], pos: &mut usize) -> Result<Vec<u8>, CodecError> {
    let mut field = Vec::new();
    loop {
        match bytes.get(*pos) {
            Some(0x00) => match bytes.get(*pos + 1) {
                Some(0xFF) => {
                    field.push(0x00);
                    *pos += 2;
                }
                Some(0x01) => {
                    *pos += 2;
                    return Ok(field);
                }
                other => {
                    return Err(CodecError::malformed_key(format!(
                        "invalid escape pair 0x00 {other:02x?} at offset {}",
                        *pos
                    )))
                }
            },
            Some(&byte) => {
                field.push(byte);
                *pos += 1;
            }
            None => return Err(CodecError::malformed_key("unterminated field")),
        }
    }
}

/// Parses a flat RocksDB key back into a tablet key.
pub fn decode_flat_key(bytes: &[u8]) -> StoreResult<TabletKey> {
    let mut pos = 0;
    let row = read_field(bytes, &mut pos)?;
    let column_family = read_field(bytes, &mut pos)?;
    let column_qualifier = read_field(bytes, &mut pos)?;
    let column_visibility = read_field(bytes, &mut pos)?;
    let rest = &bytes[pos..];
    let raw: [u8; 8] = rest
        .try_into()
        .map_err(|_| CodecError::malformed_key(format!("{} trailing timestamp bytes", rest.len())))?;
    Ok(TabletKey {
        row,
        column_family,
        column_qualifier,
        column_visibility,
        timestamp: !u64::from_be_bytes(raw),
    })
}

/// Flat scan bounds for a row range. Every flat key whose row falls in
/// `[range.start, range.end)` lies in `[lower, upper)`; an empty upper bound
/// means scan to the end.
pub fn flat_range_bounds(range: &KeyRange) -> (Vec<u8>, Vec<u8>) {
    let mut lower = Vec::with_capacity(range.start.len() + 2);
    push_field(&mut lower, &range.start);
    let upper = if range.end.is_empty() {
        Vec::new()
    } else {
        let mut upper = Vec::with_capacity(range.end.len() + 2);
        push_field(&mut upper, &range.end);
        upper
    };
    (lower, upper)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(row: &[u8], cf: &[u8], cq: &[u8], cv: &[u8], ts: u64) -> TabletKey {
        TabletKey::new(row.to_vec(), cf.to_vec(), cq.to_vec(), cv.to_vec(), ts)
    }

    #[test]
    fn round_trip_with_embedded_zeros() {
        let original = key(b"a\x00b", b"group\x00", b"\x00", b"", 42);
        let flat = encode_flat_key(&original);
        assert_eq!(decode_flat_key(&flat).unwrap(), original);
    }

    #[test]
    fn flat_order_matches_key_order() {
        let keys = [
            key(b"a", b"", b"", b"", 5),
            key(b"a", b"", b"", b"", 1),
            key(b"a", b"g", b"", b"", u64::MAX),
            key(b"a\x00", b"", b"", b"", 0),
            key(b"a\x00\x01", b"", b"", b"", 0),
            key(b"b", b"", b"", b"", 0),
        ];
        let mut by_key = keys.to_vec();
        by_key.sort();
        let mut by_flat = keys.to_vec();
        by_flat.sort_by_key(encode_flat_key);
        assert_eq!(by_key, by_flat);
    }

    #[test]
    fn newer_timestamp_sorts_first() {
        let newer = encode_flat_key(&key(b"r", b"g", b"q", b"", 200));
        let older = encode_flat_key(&key(b"r", b"g", b"q", b"", 100));
        assert!(newer < older);
    }

    #[test]
    fn range_bounds_cover_exactly_the_row_range() {
        let range = KeyRange::new(b"b".to_vec(), b"c".to_vec());
        let (lower, upper) = flat_range_bounds(&range);

        let inside = encode_flat_key(&key(b"b", b"g", b"q", b"", 7));
        let inside_high = encode_flat_key(&key(b"b\xFF", b"g", b"q", b"", 7));
        let below = encode_flat_key(&key(b"a\xFF", b"g", b"q", b"", 7));
        let at_end = encode_flat_key(&key(b"c", b"", b"", b"", 7));

        assert!(inside >= lower && inside < upper);
        assert!(inside_high >= lower && inside_high < upper);
        assert!(below < lower);
        assert!(at_end >= upper);
    }

    #[test]
    fn truncated_key_is_rejected() {
        let flat = encode_flat_key(&key(b"row", b"g", b"q", b"", 1));
        assert!(decode_flat_key(&flat[..flat.len() - 3]).is_err());
    }
}
