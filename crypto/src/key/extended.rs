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

mod base58;

use parity_scale_codec::{Decode, Encode};
use secp256k1::SECP256K1;
use zeroize::Zeroizing;

pub use base58::{ExtendedKeyEncodingError, VersionBytes, SERIALIZED_EXTENDED_KEY_LENGTH};

use crate::hash::hash160;
use crate::key::hdkd::{
    chain_code::ChainCode,
    child_number::ChildNumber,
    derivable::{Derivable, DerivationError},
    derivation_path::DerivationPath,
};
use crate::key::{PrivateKey, PublicKey};
use crate::util::{hmac_sha512, split_derivation_output};

const MASTER_KEY_HMAC_KEY: &[u8] = b"Bitcoin seed";

pub const FINGERPRINT_LENGTH: usize = 4;

/// The head of the HASH160 of a public key. Extended keys carry the fingerprint of their parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Encode, Decode)]
pub struct Fingerprint([u8; FINGERPRINT_LENGTH]);

impl Fingerprint {
    /// The parent fingerprint of master keys
    pub const ZERO: Self = Self([0; FINGERPRINT_LENGTH]);

    pub fn of(public_key: &PublicKey) -> Self {
        let hash = hash160(public_key.to_bytes());
        let mut bytes = [0; FINGERPRINT_LENGTH];
        bytes.copy_from_slice(&hash[..FINGERPRINT_LENGTH]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LENGTH] {
        &self.0
    }

    pub fn from_u32(value: u32) -> Self {
        Self(value.to_be_bytes())
    }

    pub fn into_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.into_u32())
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Encode, Decode)]
pub struct ExtendedPrivateKey {
    /// The derivation path that was used to derive this key
    derivation_path: DerivationPath,
    parent_fingerprint: Fingerprint,
    chain_code: ChainCode,
    private_key: PrivateKey,
}

impl ExtendedPrivateKey {
    /// Create the BIP32 master key from a seed
    pub fn new_master(seed: &[u8]) -> Result<ExtendedPrivateKey, DerivationError> {
        let (secret_key, chain_code) =
            split_derivation_output(hmac_sha512(MASTER_KEY_HMAC_KEY, &[seed]))?;

        Ok(ExtendedPrivateKey {
            derivation_path: DerivationPath::empty(),
            parent_fingerprint: Fingerprint::ZERO,
            chain_code,
            private_key: PrivateKey { data: secret_key },
        })
    }

    /// The parent fingerprint is left zero, see [Self::with_parent_fingerprint]
    pub fn from_parts(
        derivation_path: DerivationPath,
        chain_code: ChainCode,
        private_key: PrivateKey,
    ) -> Self {
        Self {
            derivation_path,
            parent_fingerprint: Fingerprint::ZERO,
            chain_code,
            private_key,
        }
    }

    pub fn with_parent_fingerprint(mut self, parent_fingerprint: Fingerprint) -> Self {
        self.parent_fingerprint = parent_fingerprint;
        self
    }

    pub fn parent_fingerprint(&self) -> Fingerprint {
        self.parent_fingerprint
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn chain_code(&self) -> ChainCode {
        self.chain_code
    }

    pub fn to_public_key(&self) -> ExtendedPublicKey {
        ExtendedPublicKey {
            derivation_path: self.derivation_path.clone(),
            parent_fingerprint: self.parent_fingerprint,
            chain_code: self.chain_code,
            public_key: self.private_key.public_key(),
        }
    }
}

impl Derivable for ExtendedPrivateKey {
    fn derive_child(self, num: ChildNumber) -> Result<Self, DerivationError> {
        let secp_key = self.private_key.data;
        let index = num.into_encoded_be_bytes();
        let public = PublicKey {
            data: secp_key.public_key(SECP256K1),
        };
        let mac = if num.is_hardened() {
            // Hardened derivation commits to the private key with a 0x00 prefix
            let secret = Zeroizing::new(secp_key.secret_bytes());
            hmac_sha512(self.chain_code.as_bytes(), &[&[0u8], secret.as_slice(), &index])
        } else {
            hmac_sha512(self.chain_code.as_bytes(), &[&public.to_bytes(), &index])
        };

        let (key_part, chain_code) = split_derivation_output(mac)?;

        let private_key = key_part
            .add_tweak(&secp_key.into())
            .map_err(|_| DerivationError::KeyDerivationError)?;

        Ok(ExtendedPrivateKey {
            derivation_path: self.derivation_path.child(num)?,
            parent_fingerprint: Fingerprint::of(&public),
            chain_code,
            private_key: PrivateKey { data: private_key },
        })
    }

    fn get_derivation_path(&self) -> &DerivationPath {
        &self.derivation_path
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Encode, Decode)]
pub struct ExtendedPublicKey {
    /// The derivation path that was used to derive this key
    derivation_path: DerivationPath,
    parent_fingerprint: Fingerprint,
    chain_code: ChainCode,
    public_key: PublicKey,
}

impl ExtendedPublicKey {
    /// The parent fingerprint is left zero, see [Self::with_parent_fingerprint]
    pub fn from_parts(
        derivation_path: DerivationPath,
        chain_code: ChainCode,
        public_key: PublicKey,
    ) -> Self {
        Self {
            derivation_path,
            parent_fingerprint: Fingerprint::ZERO,
            chain_code,
            public_key,
        }
    }

    pub fn with_parent_fingerprint(mut self, parent_fingerprint: Fingerprint) -> Self {
        self.parent_fingerprint = parent_fingerprint;
        self
    }

    pub fn parent_fingerprint(&self) -> Fingerprint {
        self.parent_fingerprint
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.public_key)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn chain_code(&self) -> ChainCode {
        self.chain_code
    }
}

impl Derivable for ExtendedPublicKey {
    fn derive_child(self, num: ChildNumber) -> Result<Self, DerivationError> {
        if num.is_hardened() {
            return Err(DerivationError::CannotDeriveHardenedKeyFromPublicKey(num));
        }

        let mac = hmac_sha512(
            self.chain_code.as_bytes(),
            &[&self.public_key.data.serialize(), &num.into_encoded_be_bytes()],
        );
        let (key_part, chain_code) = split_derivation_output(mac)?;

        let public_key = self
            .public_key
            .data
            .add_exp_tweak(SECP256K1, &key_part.into())
            .map_err(|_| DerivationError::KeyDerivationError)?;

        Ok(ExtendedPublicKey {
            derivation_path: self.derivation_path.child(num)?,
            parent_fingerprint: self.fingerprint(),
            chain_code,
            public_key: PublicKey { data: public_key },
        })
    }

    fn get_derivation_path(&self) -> &DerivationPath {
        &self.derivation_path
    }
}
