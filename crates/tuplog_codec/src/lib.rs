//! # tuplog codec
//!
//! Tuple field model and its binary encoding.
//!
//! A [`Tuple`] is an ordered sequence of typed [`Field`]s. Tuples are
//! stored in log records and snapshots as a CBOR array using a strict
//! subset of canonical CBOR:
//!
//! - integers use the shortest encoding
//! - no floats, maps, tags or indefinite-length items
//! - text must be UTF-8
//!
//! The encoding is self-delimiting, so decoders report how many bytes a
//! value occupied, and a short buffer is always reported as
//! [`CodecError::UnexpectedEof`] rather than as a structural error.
//!
//! ## Usage
//!
//! ```
//! use tuplog_codec::{tuple, Tuple};
//!
//! let t = tuple![1, "first tuple"];
//! let bytes = t.encode();
//! assert_eq!(Tuple::decode(&bytes).unwrap(), t);
//! assert_eq!(t.to_string(), "[1, 'first tuple']");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod tuple;
mod value;

pub use decoder::{decode_field, Decoder};
pub use encoder::{encode_field, Encoder};
pub use error::{CodecError, CodecResult};
pub use tuple::Tuple;
pub use value::Field;

/// Builds a [`Tuple`] from a list of values convertible into [`Field`].
///
/// ```
/// use tuplog_codec::{tuple, Field};
///
/// let t = tuple![4, "fourth tuple", true];
/// assert_eq!(t.field(0), Some(&Field::Integer(4)));
/// ```
#[macro_export]
macro_rules! tuple {
    ($($field:expr),* $(,)?) => {
        $crate::Tuple::new(vec![$($crate::Field::from($field)),*])
    };
}
