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
use std::fmt::{self, Formatter};
use std::slice::Iter;
use std::str::FromStr;

use super::{child_number::ChildNumber, derivable::DerivationError};

const PREFIX: &str = "m";
const SEPARATOR: char = '/';
pub const MAX_DERIVATION_PATH_LENGTH: usize = u8::MAX as usize;

/// BIP-32 compatible derivation path
#[derive(Debug, Clone, PartialEq, Eq, Ord, PartialOrd, Hash, Default)]
pub struct DerivationPath(Vec<ChildNumber>);

impl DerivationPath {
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn as_slice(&self) -> &[ChildNumber] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<ChildNumber> {
        self.0.last().copied()
    }

    /// The path of the direct parent, `None` for the root
    pub fn parent(&self) -> Option<Self> {
        self.0.split_last().map(|(_, parent)| Self(parent.to_vec()))
    }

    pub fn child(&self, num: ChildNumber) -> Result<Self, DerivationError> {
        self.extended(&[num])
    }

    pub fn extended(&self, nums: &[ChildNumber]) -> Result<Self, DerivationError> {
        let mut path = self.0.clone();
        path.extend_from_slice(nums);
        path.try_into()
    }

    pub fn is_prefix_of(&self, other: &DerivationPath) -> bool {
        other.0.starts_with(&self.0)
    }

    pub fn to_encoded_indexes(&self) -> Vec<u32> {
        self.0.iter().map(|num| num.into_encoded_index()).collect()
    }

    pub fn from_encoded_indexes(indexes: &[u32]) -> Result<Self, DerivationError> {
        indexes
            .iter()
            .map(|index| ChildNumber::from_index_with_hardened_bit(*index))
            .collect::<Vec<_>>()
            .try_into()
    }
}

impl TryFrom<Vec<ChildNumber>> for DerivationPath {
    type Error = DerivationError;

    fn try_from(path: Vec<ChildNumber>) -> Result<Self, Self::Error> {
        if path.len() > MAX_DERIVATION_PATH_LENGTH {
            return Err(DerivationError::PathTooLong);
        }
        Ok(DerivationPath(path))
    }
}

impl<'a> IntoIterator for &'a DerivationPath {
    type Item = &'a ChildNumber;
    type IntoIter = Iter<'a, ChildNumber>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Encode for DerivationPath {
    fn size_hint(&self) -> usize {
        1 + self.0.len() * 4
    }

    fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
        // The length always fits, it is checked on construction
        dest.push_byte(self.0.len() as u8);
        for num in &self.0 {
            num.encode_to(dest);
        }
    }
}

impl Decode for DerivationPath {
    fn decode<I: Input>(input: &mut I) -> Result<Self, Error> {
        let len = input.read_byte()?;
        let path = (0..len).map(|_| ChildNumber::decode(input)).collect::<Result<Vec<_>, _>>()?;
        Ok(DerivationPath(path))
    }
}

impl FromStr for DerivationPath {
    type Err = DerivationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(SEPARATOR);
        let prefix_part = parts.next().ok_or(DerivationError::InvalidDerivationPathFormat)?;
        if prefix_part != PREFIX {
            return Err(DerivationError::InvalidDerivationPathFormat);
        }
        let path = parts.map(str::parse).collect::<Result<Vec<ChildNumber>, _>>()?;
        path.try_into()
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(PREFIX)?;
        for child in self.0.iter() {
            write!(f, "{SEPARATOR}{child}")?;
        }
        Ok(())
    }
}
