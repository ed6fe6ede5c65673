//! Bloom filter for sorted index blocks
//!
//! Each index block of a sorted base carries one filter built from the keys
//! it covers. A negative answer lets `Base::find` skip the block without a
//! binary search, and lets defrag rule out "older copy elsewhere" cheaply.

use serde::{Deserialize, Serialize};

/// Bit-vector bloom filter using double hashing `h1 + i * h2`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloomFilter {
    bits: Vec<u8>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomFilter {
    /// Size a filter for `expected_items` at the given false positive rate.
    /// Zero items still yields a minimal (8-bit) filter.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let rate = false_positive_rate.clamp(f64::MIN_POSITIVE, 0.999);

        // m = -n * ln(p) / ln(2)^2, k = m/n * ln(2)
        let m = (-n * rate.ln() / std::f64::consts::LN_2.powi(2)).ceil() as u64;
        let num_bits = m.max(8);
        let num_hashes = ((num_bits as f64 / n) * std::f64::consts::LN_2).ceil() as u32;

        Self {
            bits: vec![0u8; ((num_bits + 7) / 8) as usize],
            num_bits,
            num_hashes: num_hashes.max(1),
        }
    }

    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            let bit = self.bit_index(h1, h2, i);
            self.bits[(bit / 8) as usize] |= 1 << (bit % 8);
        }
    }

    /// `false` means the key is definitely absent
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_pair(key);
        (0..self.num_hashes).all(|i| {
            let bit = self.bit_index(h1, h2, i);
            self.bits[(bit / 8) as usize] & (1 << (bit % 8)) != 0
        })
    }

    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    fn bit_index(&self, h1: u64, h2: u64, i: u32) -> u64 {
        h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .finish()
    }
}

/// Two FNV-1a hashes with different bases
fn hash_pair(key: &[u8]) -> (u64, u64) {
    (
        fnv1a_64(key, 0xcbf2_9ce4_8422_2325),
        fnv1a_64(key, 0x517c_c1b7_2722_0a95) | 1,
    )
}

fn fnv1a_64(data: &[u8], basis: u64) -> u64 {
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    data.iter().fold(basis, |hash, &byte| {
        (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
    })
}
