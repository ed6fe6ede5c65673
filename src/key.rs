//! Keys and key ranges
//!
//! Keys are fixed-size opaque identifiers. The engine only ever compares
//! them; turning an application key into a `Key` is the job of the digest
//! function (BLAKE3 in extendable-output mode by default).

use std::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Size of a key in bytes
pub const KEY_SIZE: usize = 64;

/// Fixed-size record identifier, ordered by unsigned lexicographic bytes
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key([u8; KEY_SIZE]);

impl Key {
    /// Smallest possible key (all zero bytes)
    pub const MIN: Key = Key([0x00; KEY_SIZE]);

    /// Largest possible key (all 0xff bytes)
    pub const MAX: Key = Key([0xff; KEY_SIZE]);

    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Key(bytes)
    }

    /// Hash an application key into an engine key
    pub fn digest(app_key: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(app_key);
        let mut bytes = [0u8; KEY_SIZE];
        hasher.finalize_xof().fill(&mut bytes);
        Key(bytes)
    }

    /// Build a key from a slice of exactly `KEY_SIZE` bytes
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; KEY_SIZE] = slice.try_into().ok()?;
        Some(Key(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 bytes are plenty to tell keys apart in logs
        write!(f, "Key(")?;
        for byte in &self.0[..8] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "..)")
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

// serde only derives for arrays up to 32 elements
impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct KeyVisitor;

        impl<'de> Visitor<'de> for KeyVisitor {
            type Value = Key;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} key bytes", KEY_SIZE)
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<Key, E> {
                Key::from_slice(v).ok_or_else(|| E::invalid_length(v.len(), &self))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Key, A::Error> {
                let mut bytes = [0u8; KEY_SIZE];
                for (i, slot) in bytes.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(Key(bytes))
            }
        }

        deserializer.deserialize_bytes(KeyVisitor)
    }
}

/// Inclusive key range `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Key,
    pub end: Key,
}

impl KeyRange {
    pub fn new(start: Key, end: Key) -> Self {
        Self { start, end }
    }

    /// Range covering every possible key
    pub fn full() -> Self {
        Self {
            start: Key::MIN,
            end: Key::MAX,
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        *key >= self.start && *key <= self.end
    }

    /// True when `[lo, hi]` intersects this range
    pub fn overlaps(&self, lo: &Key, hi: &Key) -> bool {
        *lo <= self.end && *hi >= self.start
    }
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::full()
    }
}
