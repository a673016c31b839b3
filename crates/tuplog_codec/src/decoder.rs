//! Field decoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Field;

/// Maximum element count for one array.
const MAX_ARRAY_ELEMENTS: u64 = 1 << 20;

/// Maximum byte/text length.
const MAX_BYTES_LENGTH: u64 = 64 * 1024 * 1024;

/// Maximum array nesting depth.
const MAX_DEPTH: u64 = 64;

/// Decodes one field from the start of `data`.
///
/// Returns the field and the number of bytes it occupied.
pub fn decode_field(data: &[u8]) -> CodecResult<(Field, usize)> {
    let mut decoder = Decoder::new(data);
    let field = decoder.decode()?;
    Ok((field, decoder.position()))
}

/// A strict decoder for the canonical CBOR subset.
///
/// Running out of input always yields [`CodecError::UnexpectedEof`], never
/// a structural error, so callers can tell a short buffer from a bad one.
#[derive(Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns true if every byte has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Decodes the next field.
    pub fn decode(&mut self) -> CodecResult<Field> {
        self.decode_at_depth(0)
    }

    /// Decodes an array header and returns its element count.
    pub fn decode_array_len(&mut self) -> CodecResult<usize> {
        let initial = self.read_byte()?;
        if initial >> 5 != 4 {
            return Err(CodecError::invalid_structure(format!(
                "expected array, found major type {}",
                initial >> 5
            )));
        }
        let len = self.read_argument(initial & 0x1f)?;
        Self::check_limit(len, MAX_ARRAY_ELEMENTS)?;
        Ok(len as usize)
    }

    fn decode_at_depth(&mut self, depth: u64) -> CodecResult<Field> {
        let initial = self.read_byte()?;
        let info = initial & 0x1f;

        match initial >> 5 {
            0 => {
                let n = self.read_argument(info)?;
                i64::try_from(n)
                    .map(Field::Integer)
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            1 => {
                let n = self.read_argument(info)?;
                i64::try_from(n)
                    .map(|n| Field::Integer(-1 - n))
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            2 => {
                let len = self.read_argument(info)?;
                Self::check_limit(len, MAX_BYTES_LENGTH)?;
                Ok(Field::Bytes(self.read_bytes(len as usize)?.to_vec()))
            }
            3 => {
                let len = self.read_argument(info)?;
                Self::check_limit(len, MAX_BYTES_LENGTH)?;
                let bytes = self.read_bytes(len as usize)?;
                let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
                Ok(Field::Text(text.to_string()))
            }
            4 => {
                if depth >= MAX_DEPTH {
                    return Err(CodecError::SizeLimitExceeded {
                        claimed: depth + 1,
                        max_allowed: MAX_DEPTH,
                    });
                }
                let len = self.read_argument(info)?;
                Self::check_limit(len, MAX_ARRAY_ELEMENTS)?;
                // Each element takes at least one byte.
                let mut items = Vec::with_capacity((len as usize).min(self.data.len() - self.pos));
                for _ in 0..len {
                    items.push(self.decode_at_depth(depth + 1)?);
                }
                Ok(Field::Array(items))
            }
            5 => Err(CodecError::Unsupported { what: "map" }),
            6 => Err(CodecError::Unsupported { what: "tag" }),
            _ => match info {
                20 => Ok(Field::Bool(false)),
                21 => Ok(Field::Bool(true)),
                22 => Ok(Field::Null),
                25..=27 => Err(CodecError::Unsupported { what: "float" }),
                31 => Err(CodecError::Unsupported {
                    what: "indefinite-length item",
                }),
                _ => Err(CodecError::Unsupported {
                    what: "simple value",
                }),
            },
        }
    }

    fn check_limit(claimed: u64, max_allowed: u64) -> CodecResult<()> {
        if claimed > max_allowed {
            return Err(CodecError::SizeLimitExceeded {
                claimed,
                max_allowed,
            });
        }
        Ok(())
    }

    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        let bytes = self.data.get(self.pos..end).ok_or(CodecError::UnexpectedEof)?;
        self.pos = end;
        Ok(bytes)
    }

    fn read_argument(&mut self, info: u8) -> CodecResult<u64> {
        let (value, min) = match info {
            0..=23 => return Ok(u64::from(info)),
            24 => (u64::from(self.read_byte()?), 24),
            25 => {
                let b = self.read_bytes(2)?;
                (u64::from(u16::from_be_bytes([b[0], b[1]])), 0x100)
            }
            26 => {
                let b = self.read_bytes(4)?;
                (
                    u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]])),
                    0x1_0000,
                )
            }
            27 => {
                let b = self.read_bytes(8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(b);
                (u64::from_be_bytes(buf), 0x1_0000_0000)
            }
            31 => {
                return Err(CodecError::Unsupported {
                    what: "indefinite-length item",
                })
            }
            _ => return Err(CodecError::invalid_structure("reserved additional info")),
        };
        if value < min {
            return Err(CodecError::invalid_structure(
                "non-canonical: value could be encoded in fewer bytes",
            ));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode_field;
    use proptest::prelude::*;

    #[test]
    fn reports_consumed_length() {
        let mut bytes = encode_field(&Field::from("abc"));
        bytes.extend_from_slice(&[0xff, 0xff]);
        let (field, used) = decode_field(&bytes).unwrap();
        assert_eq!(field, Field::from("abc"));
        assert_eq!(used, 4);
    }

    #[test]
    fn short_input_is_eof() {
        let bytes = encode_field(&Field::Array(vec![Field::Integer(1000), Field::from("xyz")]));
        for cut in 0..bytes.len() {
            assert_eq!(
                decode_field(&bytes[..cut]).unwrap_err(),
                CodecError::UnexpectedEof,
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn rejects_non_canonical_integer() {
        assert!(matches!(
            decode_field(&[0x18, 0x05]),
            Err(CodecError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn rejects_unsupported_items() {
        assert_eq!(
            decode_field(&[0xa0]).unwrap_err(),
            CodecError::Unsupported { what: "map" }
        );
        assert_eq!(
            decode_field(&[0xf9, 0x3c, 0x00]).unwrap_err(),
            CodecError::Unsupported { what: "float" }
        );
        assert_eq!(decode_field(&[0x62, 0xff, 0xfe]).unwrap_err(), CodecError::InvalidUtf8);
    }

    #[test]
    fn rejects_unsigned_overflow() {
        let bytes = [0x1b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        assert_eq!(decode_field(&bytes).unwrap_err(), CodecError::IntegerOverflow);
    }

    #[test]
    fn rejects_deep_nesting() {
        let bytes = vec![0x81; 100];
        assert!(matches!(
            decode_field(&bytes),
            Err(CodecError::SizeLimitExceeded { .. })
        ));
    }

    fn field_strategy() -> impl Strategy<Value = Field> {
        let leaf = prop_oneof![
            Just(Field::Null),
            any::<bool>().prop_map(Field::Bool),
            any::<i64>().prop_map(Field::Integer),
            ".{0,20}".prop_map(Field::Text),
            prop::collection::vec(any::<u8>(), 0..20).prop_map(Field::Bytes),
        ];
        leaf.prop_recursive(3, 24, 6, |inner| {
            prop::collection::vec(inner, 0..6).prop_map(Field::Array)
        })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(field in field_strategy()) {
            let bytes = encode_field(&field);
            let (decoded, used) = decode_field(&bytes).unwrap();
            prop_assert_eq!(decoded, field);
            prop_assert_eq!(used, bytes.len());
        }

        #[test]
        fn decoding_garbage_never_panics(data in prop::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode_field(&data);
        }
    }
}
