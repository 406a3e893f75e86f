//! Delimiter-safe byte escaping for row parts.
//!
//! Rows join their parts with the reserved delimiter `0x00`, so serialised
//! vertex bytes must never contain it. `0x00` becomes `0x01 0x01` and the
//! escape byte itself becomes `0x01 0x02`, which keeps the escaped form
//! lexicographically ordered like the raw bytes (`0x00`'s replacement still
//! compares below `0x01`'s).

use crate::error::CodecError;

pub const DELIMITER: u8 = 0x00;
const ESCAPE: u8 = 0x01;
const ESCAPED_DELIMITER: u8 = 0x01;
const ESCAPED_ESCAPE: u8 = 0x02;

/// Escapes raw bytes so the result contains no bare delimiter.
pub fn escape(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    for &byte in raw {
        match byte {
            DELIMITER => out.extend_from_slice(&[ESCAPE, ESCAPED_DELIMITER]),
            ESCAPE => out.extend_from_slice(&[ESCAPE, ESCAPED_ESCAPE]),
            other => out.push(other),
        }
    }
    out
}

/// Reverses [`escape`].
pub fn unescape(escaped: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(escaped.len());
    let mut iter = escaped.iter();
    while let Some(&byte) = iter.next() {
        match byte {
            DELIMITER => {
                return Err(CodecError::malformed_key(
                    "bare delimiter inside an escaped row part",
                ))
            }
            ESCAPE => match iter.next() {
                Some(&ESCAPED_DELIMITER) => out.push(DELIMITER),
                Some(&ESCAPED_ESCAPE) => out.push(ESCAPE),
                other => {
                    return Err(CodecError::malformed_key(format!(
                        "invalid escape sequence 0x01 {other:02x?}"
                    )))
                }
            },
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Splits a row on bare delimiters. Escaped content never contains one, so
/// every `0x00` in a row is structural.
pub fn split_on_delimiter(row: &[u8]) -> Vec<&[u8]> {
    row.split(|&b| b == DELIMITER).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_round_trip() {
        let raw = [0x00, 0x01, 0x02, 0xFF, 0x00];
        assert_eq!(unescape(&escape(&raw)).unwrap(), raw);
    }

    #[test]
    fn escaped_bytes_contain_no_delimiter() {
        let escaped = escape(&[0x00, 0x00, 0x05]);
        assert!(!escaped.contains(&DELIMITER));
    }

    #[test]
    fn escaping_preserves_order() {
        let values: [&[u8]; 6] = [b"", b"\x00", b"\x00\xFF", b"\x01", b"\x01\x00", b"\x02"];
        let escaped: Vec<Vec<u8>> = values.iter().map(|v| escape(v)).collect();
        for pair in escaped.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn bare_delimiter_is_rejected() {
        assert!(unescape(&[0x05, 0x00]).is_err());
    }

    #[test]
    fn dangling_escape_is_rejected() {
        assert!(unescape(&[0x01]).is_err());
        assert!(unescape(&[0x01, 0x07]).is_err());
    }

    #[test]
    fn split_finds_structural_delimiters() {
        let mut row = escape(b"a\x00b");
        row.push(DELIMITER);
        row.extend_from_slice(&escape(b"c"));
        let parts = split_on_delimiter(&row);
        assert_eq!(parts.len(), 2);
        assert_eq!(unescape(parts[0]).unwrap(), b"a\x00b");
        assert_eq!(unescape(parts[1]).unwrap(), b"c");
    }
}
