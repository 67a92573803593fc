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

use std::{fmt, str::FromStr};

use super::derivable::DerivationError;

const MSB_BIT: u32 = 0x8000_0000;

/// An unsigned 31-bit integer, the index space of a single BIP32 derivation step
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct U31(u32);

impl U31 {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(1);
    pub const MAX: Self = Self(MSB_BIT - 1);

    /// Split a u32 into its lower 31 bits and the most significant bit
    pub const fn from_u32_with_msb(val: u32) -> (Self, bool) {
        (Self(val & !MSB_BIT), val & MSB_BIT != 0)
    }

    pub const fn from_u32(val: u32) -> Option<Self> {
        if val & MSB_BIT == 0 {
            Some(Self(val))
        } else {
            None
        }
    }

    pub const fn into_u32(self) -> u32 {
        self.0
    }

    pub const fn into_encoded_with_msb(self, msb: bool) -> u32 {
        if msb {
            self.0 | MSB_BIT
        } else {
            self.0
        }
    }

    pub fn plus_one(&self) -> Result<Self, DerivationError> {
        let next = self.0 + 1;
        Self::from_u32(next).ok_or(DerivationError::InvalidChildNumber(next))
    }
}

impl TryFrom<u32> for U31 {
    type Error = DerivationError;

    fn try_from(val: u32) -> Result<Self, Self::Error> {
        Self::from_u32(val).ok_or(DerivationError::InvalidChildNumber(val))
    }
}

impl From<U31> for u32 {
    fn from(val: U31) -> Self {
        val.0
    }
}

impl FromStr for U31 {
    type Err = DerivationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let val = s.parse::<u32>().map_err(|_| DerivationError::InvalidChildNumberFormat)?;
        Self::try_from(val)
    }
}

impl fmt::Display for U31 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
