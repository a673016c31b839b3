//! Field encoder.

use crate::value::Field;

/// Encodes a single field.
#[must_use]
pub fn encode_field(field: &Field) -> Vec<u8> {
    let mut encoder = Encoder::new();
    encoder.encode(field);
    encoder.into_bytes()
}

/// An append-only encoder producing the canonical CBOR subset.
#[derive(Debug, Default)]
pub struct Encoder {
    buffer: Vec<u8>,
}

impl Encoder {
    /// Creates a new encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes one field, appending to the buffer.
    pub fn encode(&mut self, field: &Field) {
        match field {
            Field::Null => self.buffer.push(0xf6),
            Field::Bool(false) => self.buffer.push(0xf4),
            Field::Bool(true) => self.buffer.push(0xf5),
            Field::Integer(n) => self.encode_integer(*n),
            Field::Bytes(b) => {
                self.encode_head(2, b.len() as u64);
                self.buffer.extend_from_slice(b);
            }
            Field::Text(s) => {
                self.encode_head(3, s.len() as u64);
                self.buffer.extend_from_slice(s.as_bytes());
            }
            Field::Array(items) => self.encode_array(items),
        }
    }

    /// Encodes a sequence of fields as one array.
    pub fn encode_array(&mut self, items: &[Field]) {
        self.encode_head(4, items.len() as u64);
        for item in items {
            self.encode(item);
        }
    }

    /// Consumes the encoder and returns the bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    #[allow(clippy::cast_sign_loss)]
    fn encode_integer(&mut self, n: i64) {
        if n >= 0 {
            self.encode_head(0, n as u64);
        } else {
            // -1 - n is non-negative for every negative i64.
            self.encode_head(1, (-1 - n) as u64);
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode_head(&mut self, major: u8, value: u64) {
        let mt = major << 5;
        if value < 24 {
            self.buffer.push(mt | value as u8);
        } else if value <= u64::from(u8::MAX) {
            self.buffer.push(mt | 24);
            self.buffer.push(value as u8);
        } else if value <= u64::from(u16::MAX) {
            self.buffer.push(mt | 25);
            self.buffer.extend_from_slice(&(value as u16).to_be_bytes());
        } else if value <= u64::from(u32::MAX) {
            self.buffer.push(mt | 26);
            self.buffer.extend_from_slice(&(value as u32).to_be_bytes());
        } else {
            self.buffer.push(mt | 27);
            self.buffer.extend_from_slice(&value.to_be_bytes());
        }
    }
}
