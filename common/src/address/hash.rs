// Copyright (c) 2021 RBB S.r.l
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

use std::fmt;

use crypto::{
    hash::{hash160, HASH160_LENGTH},
    key::PublicKey,
};
use parity_scale_codec::{Decode, Encode};
use script::Script;

#[derive(thiserror::Error, Debug, Clone, Copy, Eq, PartialEq)]
#[error("Expected {HASH160_LENGTH} bytes for a hash, got {0}")]
pub struct HashLengthError(pub usize);

macro_rules! hash160_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
        pub struct $name([u8; HASH160_LENGTH]);

        impl $name {
            pub const fn from_bytes(bytes: [u8; HASH160_LENGTH]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; HASH160_LENGTH] {
                &self.0
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = HashLengthError;

            fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
                let array = bytes.try_into().map_err(|_| HashLengthError(bytes.len()))?;
                Ok(Self(array))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

hash160_newtype!(
    /// HASH160 of a compressed public key
    PublicKeyHash
);

hash160_newtype!(
    /// HASH160 of a redeem script
    ScriptHash
);

impl From<&PublicKey> for PublicKeyHash {
    fn from(pk: &PublicKey) -> Self {
        Self(hash160(pk.to_bytes()))
    }
}

impl From<&Script> for ScriptHash {
    fn from(script: &Script) -> Self {
        Self(script.script_hash())
    }
}
