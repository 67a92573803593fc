// Copyright (c) 2022 RBB S.r.l
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

use parity_scale_codec::{Decode, Encode, Error, Input, Output};
use std::{
    fmt::{self, Formatter, Write},
    str::FromStr,
};

use super::{derivable::DerivationError, u31::U31};

const HARDENED_APOS: char = '\'';
const HARDENED_H: char = 'h';

/// One step of a BIP32 path: a 31-bit index plus the hardened flag.
///
/// Normal children sort before hardened ones, then by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub struct ChildNumber {
    hardened: bool,
    index: U31,
}

impl ChildNumber {
    pub const ZERO: Self = Self::from_normal(U31::ZERO);
    pub const ONE: Self = Self::from_normal(U31::ONE);
    pub const ZERO_HARDENED: Self = Self::from_hardened(U31::ZERO);
    pub const ONE_HARDENED: Self = Self::from_hardened(U31::ONE);

    pub const fn from_hardened(index: U31) -> Self {
        Self {
            hardened: true,
            index,
        }
    }

    pub const fn from_normal(index: U31) -> Self {
        Self {
            hardened: false,
            index,
        }
    }

    /// Interpret a raw BIP32 index, the top bit marking a hardened step
    pub const fn from_index_with_hardened_bit(raw: u32) -> Self {
        let (index, hardened) = U31::from_u32_with_msb(raw);
        Self { hardened, index }
    }

    /// The raw BIP32 index, top bit set for hardened steps
    pub const fn into_encoded_index(self) -> u32 {
        self.index.into_encoded_with_msb(self.hardened)
    }

    pub fn into_encoded_be_bytes(self) -> [u8; 4] {
        self.into_encoded_index().to_be_bytes()
    }

    pub const fn get_index(&self) -> U31 {
        self.index
    }

    pub const fn is_hardened(&self) -> bool {
        self.hardened
    }

    /// The next sibling, keeping the hardened flag
    pub fn plus_one(&self) -> Result<Self, DerivationError> {
        Ok(Self {
            hardened: self.hardened,
            index: self.index.plus_one()?,
        })
    }
}

impl Encode for ChildNumber {
    fn size_hint(&self) -> usize {
        4
    }

    fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
        dest.write(&self.into_encoded_be_bytes());
    }
}

impl Decode for ChildNumber {
    fn decode<I: Input>(input: &mut I) -> Result<Self, Error> {
        let mut raw = [0u8; 4];
        input.read(&mut raw)?;
        Ok(Self::from_index_with_hardened_bit(u32::from_be_bytes(raw)))
    }
}

impl FromStr for ChildNumber {
    type Err = DerivationError;

    /// Accepts `7`, `44'` and `44h`; leading zeros are rejected
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_suffix([HARDENED_APOS, HARDENED_H]);
        let hardened = digits.is_some();
        let digits = digits.unwrap_or(s);

        let well_formed = !digits.is_empty()
            && digits.bytes().all(|c| c.is_ascii_digit())
            && (digits.len() == 1 || !digits.starts_with('0'));
        if !well_formed {
            return Err(DerivationError::InvalidChildNumberFormat);
        }

        Ok(Self {
            hardened,
            index: U31::from_str(digits)?,
        })
    }
}

impl fmt::Display for ChildNumber {
    /// `{}` prints hardened steps as `44'`, `{:#}` as `44h`
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.index, f)?;
        if self.hardened {
            f.write_char(if f.alternate() { HARDENED_H } else { HARDENED_APOS })?;
        }
        Ok(())
    }
}
