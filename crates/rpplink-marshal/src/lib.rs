//! Compact type-tagged binary value codec.
//!
//! This is the object serialization format the PyMite target understands:
//! every value is a tag byte followed by a tag-specific payload, and code
//! objects nest names, constants and cell variables as ordinary values.
//! A `.pmm` module image is exactly one marshalled [`CodeObject`].
//!
//! ```
//! use rpplink_marshal::{decode, encode, Value};
//!
//! let wire = encode(&Value::Int(500)).unwrap();
//! assert_eq!(wire.as_ref(), b"H\xF4\x01");
//! assert_eq!(decode(&wire).unwrap(), (Value::Int(500), 3));
//! ```

pub mod codec;
pub mod error;
pub mod value;

pub use codec::{decode, decode_all, encode, encode_into, MAX_DEPTH};
pub use error::{MarshalError, Result};
pub use value::{CodeObject, Value};
