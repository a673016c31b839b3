//! Tuples.

use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{CodecError, CodecResult};
use crate::value::Field;
use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::fmt;

/// An ordered sequence of fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tuple(Vec<Field>);

impl Tuple {
    /// Creates a tuple from its fields.
    #[must_use]
    pub fn new(fields: Vec<Field>) -> Self {
        Self(fields)
    }

    /// Returns all fields.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.0
    }

    /// Returns the field at `index`.
    #[must_use]
    pub fn field(&self, index: usize) -> Option<&Field> {
        self.0.get(index)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the tuple has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the tuple and returns its fields.
    #[must_use]
    pub fn into_fields(self) -> Vec<Field> {
        self.0
    }

    /// Encodes the tuple as a CBOR array.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::new();
        encoder.encode_array(&self.0);
        encoder.into_bytes()
    }

    /// Appends the encoded tuple to an existing encoder.
    pub fn encode_into(&self, encoder: &mut Encoder) {
        encoder.encode_array(&self.0);
    }

    /// Decodes a tuple that must occupy all of `data`.
    pub fn decode(data: &[u8]) -> CodecResult<Self> {
        let (tuple, used) = Self::decode_prefix(data)?;
        if used != data.len() {
            return Err(CodecError::TrailingBytes {
                count: data.len() - used,
            });
        }
        Ok(tuple)
    }

    /// Decodes a tuple from the start of `data`, returning the number of
    /// bytes consumed.
    pub fn decode_prefix(data: &[u8]) -> CodecResult<(Self, usize)> {
        let mut decoder = Decoder::new(data);
        let tuple = Self::decode_from(&mut decoder)?;
        Ok((tuple, decoder.position()))
    }

    /// Decodes a tuple from an existing decoder.
    pub fn decode_from(decoder: &mut Decoder<'_>) -> CodecResult<Self> {
        let len = decoder.decode_array_len()?;
        let mut fields = Vec::with_capacity(len.min(64));
        for _ in 0..len {
            fields.push(decoder.decode()?);
        }
        Ok(Self(fields))
    }
}

impl From<Vec<Field>> for Tuple {
    fn from(fields: Vec<Field>) -> Self {
        Self(fields)
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, field) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{field}")?;
        }
        write!(f, "]")
    }
}

impl Serialize for Tuple {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for field in &self.0 {
            seq.serialize_element(field)?;
        }
        seq.end()
    }
}
