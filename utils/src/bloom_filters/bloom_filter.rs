// Copyright (c) 2023 RBB S.r.l
// opensource@mintlayer.org
// SPDX-License-Identifier: MIT
// Licensed under the MIT License;
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://github.com/mintlayer/mintlayer-core/blob/master/LICENSE
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![allow(clippy::float_arithmetic)]

use super::murmur3::murmur3_32;

/// Filters larger than this are rejected by peers.
pub const MAX_FILTER_SIZE_BYTES: usize = 36_000;
pub const MAX_HASH_FUNCS: u32 = 50;

const HASH_SEED_MULTIPLIER: u32 = 0xFBA4C795;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BloomFilterError {
    #[error("Bloom filters of different shapes cannot be merged")]
    IncompatibleMerge,
    #[error("Bloom filter encoding is truncated")]
    Truncated,
    #[error("Bloom filter is too large: {0} bytes")]
    TooLarge(u64),
    #[error("Too many hash functions: {0}")]
    TooManyHashFuncs(u32),
    #[error("Unknown update flag: {0}")]
    UnknownUpdateFlag(u8),
}

/// How a remote peer updates the filter when it matches an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BloomUpdate {
    None,
    All,
    P2PubkeyOnly,
}

impl BloomUpdate {
    fn to_u8(self) -> u8 {
        match self {
            BloomUpdate::None => 0,
            BloomUpdate::All => 1,
            BloomUpdate::P2PubkeyOnly => 2,
        }
    }

    fn from_u8(value: u8) -> Result<Self, BloomFilterError> {
        match value {
            0 => Ok(BloomUpdate::None),
            1 => Ok(BloomUpdate::All),
            2 => Ok(BloomUpdate::P2PubkeyOnly),
            other => Err(BloomFilterError::UnknownUpdateFlag(other)),
        }
    }
}

/// A BIP37 Bloom filter.
///
/// The bit array is sized from the expected element count and the desired false positive rate,
/// and the hash functions are MurmurHash3 seeded with `i * 0xFBA4C795 + tweak`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    data: Vec<u8>,
    hash_funcs: u32,
    tweak: u32,
    flags: BloomUpdate,
}

impl BloomFilter {
    /// Constructs a filter able to hold `elements` items with the given false positive rate.
    ///
    /// Both values are clamped so the result respects the BIP37 limits.
    pub fn new(elements: usize, false_positive_rate: f64, tweak: u32, flags: BloomUpdate) -> Self {
        assert!(false_positive_rate > 0.0 && false_positive_rate < 1.0);
        let elements = elements.max(1) as f64;
        let ln2 = std::f64::consts::LN_2;

        let size_bits = (-1.0 / (ln2 * ln2) * elements * false_positive_rate.ln()) as usize;
        let size_bytes = (size_bits.min(MAX_FILTER_SIZE_BYTES * 8) / 8).max(1);

        let hash_funcs = ((size_bytes * 8) as f64 / elements * ln2) as u32;
        let hash_funcs = hash_funcs.clamp(1, MAX_HASH_FUNCS);

        Self {
            data: vec![0; size_bytes],
            hash_funcs,
            tweak,
            flags,
        }
    }

    pub fn hash_funcs(&self) -> u32 {
        self.hash_funcs
    }

    pub fn tweak(&self) -> u32 {
        self.tweak
    }

    pub fn flags(&self) -> BloomUpdate {
        self.flags
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn bit_index(&self, hash_num: u32, item: &[u8]) -> usize {
        let seed = hash_num.wrapping_mul(HASH_SEED_MULTIPLIER).wrapping_add(self.tweak);
        murmur3_32(seed, item) as usize % (self.data.len() * 8)
    }

    pub fn insert(&mut self, item: &[u8]) {
        for hash_num in 0..self.hash_funcs {
            let index = self.bit_index(hash_num, item);
            self.data[index >> 3] |= 1 << (index & 7);
        }
    }

    pub fn contains(&self, item: &[u8]) -> bool {
        (0..self.hash_funcs).all(|hash_num| {
            let index = self.bit_index(hash_num, item);
            self.data[index >> 3] & (1 << (index & 7)) != 0
        })
    }

    /// Returns true if every bit is set, i.e. the filter matches everything.
    pub fn matches_all(&self) -> bool {
        self.data.iter().all(|byte| *byte == 0xff)
    }

    /// OR the bits of `other` into this filter.
    pub fn merge(&mut self, other: &BloomFilter) -> Result<(), BloomFilterError> {
        if self.data.len() != other.data.len()
            || self.hash_funcs != other.hash_funcs
            || self.tweak != other.tweak
        {
            return Err(BloomFilterError::IncompatibleMerge);
        }
        self.data.iter_mut().zip(other.data.iter()).for_each(|(a, b)| *a |= b);
        Ok(())
    }

    /// The expected false positive rate once `elements` items have been inserted.
    pub fn false_positive_rate(&self, elements: usize) -> f64 {
        let bits = (self.data.len() * 8) as f64;
        let k = f64::from(self.hash_funcs);
        (1.0 - (-k * elements as f64 / bits).exp()).powf(k)
    }

    /// The `filterload` payload: compact-size length, bit array, hash count, tweak and flags.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() + 18);
        write_compact_size(&mut out, self.data.len() as u64);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&self.hash_funcs.to_le_bytes());
        out.extend_from_slice(&self.tweak.to_le_bytes());
        out.push(self.flags.to_u8());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BloomFilterError> {
        let (len, rest) = read_compact_size(bytes)?;
        if len > MAX_FILTER_SIZE_BYTES as u64 {
            return Err(BloomFilterError::TooLarge(len));
        }
        let len = len as usize;
        if rest.len() != len + 9 {
            return Err(BloomFilterError::Truncated);
        }
        let (data, rest) = rest.split_at(len);
        let hash_funcs = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
        if hash_funcs > MAX_HASH_FUNCS {
            return Err(BloomFilterError::TooManyHashFuncs(hash_funcs));
        }
        let tweak = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]);
        let flags = BloomUpdate::from_u8(rest[8])?;

        Ok(Self {
            data: data.to_vec(),
            hash_funcs,
            tweak,
            flags,
        })
    }
}

fn write_compact_size(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => out.push(value as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x10000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

fn read_compact_size(bytes: &[u8]) -> Result<(u64, &[u8]), BloomFilterError> {
    let (&prefix, rest) = bytes.split_first().ok_or(BloomFilterError::Truncated)?;
    let width = match prefix {
        0xfd => 2,
        0xfe => 4,
        0xff => 8,
        small => return Ok((u64::from(small), rest)),
    };
    if rest.len() < width {
        return Err(BloomFilterError::Truncated);
    }
    let (number, rest) = rest.split_at(width);
    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(number);
    Ok((u64::from_le_bytes(buf), rest))
}
