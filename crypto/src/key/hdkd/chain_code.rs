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

use parity_scale_codec::{Decode, Encode};

pub const CHAINCODE_LENGTH: usize = 32;

/// The extra entropy attached to an extended key that makes child derivation possible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Ord, PartialOrd, Hash, Encode, Decode)]
pub struct ChainCode([u8; CHAINCODE_LENGTH]);

impl ChainCode {
    pub fn into_array(self) -> [u8; CHAINCODE_LENGTH] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; CHAINCODE_LENGTH]> for ChainCode {
    fn from(arr: [u8; CHAINCODE_LENGTH]) -> Self {
        Self(arr)
    }
}

impl TryFrom<&[u8]> for ChainCode {
    type Error = std::array::TryFromSliceError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Ok(Self(bytes.try_into()?))
    }
}

impl From<ChainCode> for [u8; CHAINCODE_LENGTH] {
    fn from(cc: ChainCode) -> Self {
        cc.0
    }
}
