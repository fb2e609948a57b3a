// Fixed-size index keys.
//
// The hash table is polymorphic over a small key capability set: a fixed
// encoded width, byte-level encode/decode, equality, and a caller-supplied
// hash function whose low 32 bits address the directory.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use byteorder::{ByteOrder, LittleEndian};

use crate::index::hash::error::HashIndexError;
use crate::storage::table::tuple::{Tuple, Value};

/// Hash function over keys; the index uses the low 32 bits of the result.
pub type KeyHashFn<K> = fn(&K) -> u64;

pub trait HashKey: Clone + Copy + PartialEq + Eq + Send + Sync + 'static {
    /// Width of the serialized key in a bucket page.
    const ENCODED_SIZE: usize;

    fn encode(&self, buf: &mut [u8]);

    fn decode(buf: &[u8]) -> Self;

    /// Pack a key tuple's values into the fixed key width.
    fn from_tuple(tuple: &Tuple) -> Result<Self, HashIndexError>;
}

/// An opaque fixed-width byte key. Integer and float values are packed
/// little-endian (truncated to the available width, matching a raw memcpy of
/// the column bytes); text is copied verbatim; the tail is zero padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericKey<const N: usize> {
    data: [u8; N],
}

impl<const N: usize> GenericKey<N> {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = [0u8; N];
        let len = bytes.len().min(N);
        data[..len].copy_from_slice(&bytes[..len]);
        Self { data }
    }

    pub fn from_i64(value: i64) -> Self {
        let mut encoded = [0u8; 8];
        LittleEndian::write_i64(&mut encoded, value);
        Self::from_bytes(&encoded)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl<const N: usize> HashKey for GenericKey<N> {
    const ENCODED_SIZE: usize = N;

    fn encode(&self, buf: &mut [u8]) {
        buf[..N].copy_from_slice(&self.data);
    }

    fn decode(buf: &[u8]) -> Self {
        let mut data = [0u8; N];
        data.copy_from_slice(&buf[..N]);
        Self { data }
    }

    fn from_tuple(tuple: &Tuple) -> Result<Self, HashIndexError> {
        let mut data = [0u8; N];
        let mut offset = 0;

        for value in tuple.values() {
            let remaining = N - offset;
            match value {
                Value::Null => return Err(HashIndexError::NullKey),
                Value::Integer(i) => {
                    let mut encoded = [0u8; 8];
                    LittleEndian::write_i64(&mut encoded, *i);
                    let take = remaining.min(8);
                    data[offset..offset + take].copy_from_slice(&encoded[..take]);
                    offset += take;
                }
                Value::Float(f) => {
                    let mut encoded = [0u8; 8];
                    LittleEndian::write_f64(&mut encoded, *f);
                    let take = remaining.min(8);
                    data[offset..offset + take].copy_from_slice(&encoded[..take]);
                    offset += take;
                }
                Value::Boolean(b) => {
                    if remaining < 1 {
                        return Err(HashIndexError::KeyTooLarge(N));
                    }
                    data[offset] = *b as u8;
                    offset += 1;
                }
                Value::Text(s) => {
                    let bytes = s.as_bytes();
                    if bytes.len() > remaining {
                        return Err(HashIndexError::KeyTooLarge(N));
                    }
                    data[offset..offset + bytes.len()].copy_from_slice(bytes);
                    offset += bytes.len();
                }
            }
        }

        Ok(Self { data })
    }
}

/// Default key hash: SipHash over the encoded bytes. Deterministic because
/// `DefaultHasher::new` is seeded with fixed keys.
pub fn default_hash<K: HashKey>(key: &K) -> u64 {
    let mut buf = vec![0u8; K::ENCODED_SIZE];
    key.encode(&mut buf);
    let mut hasher = DefaultHasher::new();
    hasher.write(&buf);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_round_trip() {
        let key = GenericKey::<8>::from_i64(0x1122334455667788);
        let mut buf = [0u8; 8];
        key.encode(&mut buf);
        assert_eq!(GenericKey::<8>::decode(&buf), key);
    }

    #[test]
    fn test_from_tuple_packs_values() {
        let tuple = Tuple::new(vec![Value::Integer(7)]);
        let key = GenericKey::<8>::from_tuple(&tuple).unwrap();
        assert_eq!(key, GenericKey::<8>::from_i64(7));

        let wide = Tuple::new(vec![Value::Integer(1), Value::Integer(2)]);
        let key = GenericKey::<16>::from_tuple(&wide).unwrap();
        let mut expected = [0u8; 16];
        LittleEndian::write_i64(&mut expected[0..8], 1);
        LittleEndian::write_i64(&mut expected[8..16], 2);
        assert_eq!(key.as_bytes(), &expected);
    }

    #[test]
    fn test_from_tuple_rejects_oversized_text() {
        let tuple = Tuple::new(vec![Value::Text("longer than four".to_string())]);
        assert!(GenericKey::<4>::from_tuple(&tuple).is_err());
    }

    #[test]
    fn test_from_tuple_rejects_null() {
        let tuple = Tuple::new(vec![Value::Null]);
        assert!(GenericKey::<8>::from_tuple(&tuple).is_err());
    }

    #[test]
    fn test_default_hash_is_deterministic() {
        let a = GenericKey::<8>::from_i64(99);
        let b = GenericKey::<8>::from_i64(99);
        assert_eq!(default_hash(&a), default_hash(&b));
        assert_ne!(default_hash(&a), default_hash(&GenericKey::<8>::from_i64(100)));
    }
}
