//! Key and value type encoding for the store engine.
//!
//! The store supports two key types:
//! - `String`: UTF-8 bytes, used for named singleton records
//! - `Vec<u8>`: arbitrary bytes, used for order-preserving composite keys
//!
//! Values are always bytes. Keys compare lexicographically on their encoded form.

/// Key type discriminant for compile-time table definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// UTF-8 string.
    Str,
    /// Arbitrary bytes.
    Bytes,
}

/// Trait for types that can be used as keys in store tables.
pub trait Key: Sized {
    /// The key type discriminant.
    const KEY_TYPE: KeyType;

    /// Encode the key into a byte buffer.
    fn encode(&self, buf: &mut Vec<u8>);

    /// Decode a key from a byte slice.
    fn decode(buf: &[u8]) -> Option<Self>;
}

/// Trait for types that can be used as values in store tables.
pub trait Value: Sized {
    /// Encode the value into a byte buffer.
    fn encode(&self, buf: &mut Vec<u8>);

    /// Decode a value from a byte slice.
    fn decode(buf: &[u8]) -> Option<Self>;
}

/// Encodes a key into a fresh buffer.
pub(crate) fn encode_key<K: Key>(key: &K) -> Vec<u8> {
    let mut buf = Vec::new();
    key.encode(&mut buf);
    buf
}

// ============================================================================
// String Key Implementation
// ============================================================================

impl Key for String {
    const KEY_TYPE: KeyType = KeyType::Str;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }

    fn decode(buf: &[u8]) -> Option<Self> {
        std::str::from_utf8(buf).ok().map(str::to_string)
    }
}

// ============================================================================
// Bytes Key Implementation
// ============================================================================

impl Key for Vec<u8> {
    const KEY_TYPE: KeyType = KeyType::Bytes;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self);
    }

    fn decode(buf: &[u8]) -> Option<Self> {
        Some(buf.to_vec())
    }
}

// ============================================================================
// Value Implementations
// ============================================================================

impl Value for Vec<u8> {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self);
    }

    fn decode(buf: &[u8]) -> Option<Self> {
        Some(buf.to_vec())
    }
}
