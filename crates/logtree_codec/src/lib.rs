//! # logtree codec
//!
//! Wire format of the payload stored at one log position.
//!
//! Every committed revision of a logtree store is one [`IntentionRecord`]:
//! the nodes a transaction copied or created, in post-order, plus the read
//! and delete dependencies used to validate it. Records are CBOR.
//!
//! ## Child references
//!
//! A node never embeds its children. Each child is a [`ChildRef`]:
//! - `Nil` for the empty leaf
//! - `SelfRef { offset }` for a node earlier in the same record
//! - `Explicit { csn, offset }` for a node committed at another position
//!
//! Once a record is appended at position `pos`, `SelfRef { offset }` means
//! the same as `Explicit { csn: pos, offset }`.
//!
//! ## Usage
//!
//! ```
//! use logtree_codec::{ChildRef, Decode, Encode, IntentionRecord, NodeRecord};
//!
//! let mut record = IntentionRecord::new(None);
//! record.nodes.push(NodeRecord::leaf(b"k".to_vec(), b"v".to_vec()));
//!
//! let bytes = record.encode().unwrap();
//! let decoded = IntentionRecord::decode(&bytes).unwrap();
//! assert_eq!(record, decoded);
//! assert_eq!(decoded.nodes[0].left, ChildRef::Nil);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod record;

pub use error::{CodecError, CodecResult};
pub use record::{ChildRef, IntentionRecord, NodeRecord, ReadRecord, FORMAT_VERSION};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Trait for types that can be encoded to a log payload.
pub trait Encode {
    /// Encode this value to CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Trait for types that can be decoded from a log payload.
pub trait Decode: Sized {
    /// Decode this value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

/// Encodes any serde value as CBOR.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn to_cbor<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::ser::into_writer(value, &mut buffer)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buffer)
}

/// Decodes one CBOR item, rejecting trailing bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not a single valid item of type `T`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    let mut reader = bytes;
    let value = ciborium::de::from_reader(&mut reader)
        .map_err(|e| CodecError::decoding_failed(e.to_string()))?;
    if !reader.is_empty() {
        return Err(CodecError::TrailingBytes {
            count: reader.len(),
        });
    }
    Ok(value)
}

impl Encode for IntentionRecord {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_cbor(self)
    }
}

impl Decode for IntentionRecord {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let record: IntentionRecord = from_cbor(bytes)?;
        record.validate()?;
        Ok(record)
    }
}
