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

use std::fmt;

use bip39::Mnemonic;
use common::primitives::time::Seconds;
use crypto::{
    key::extended::ExtendedPrivateKey,
    random::{CryptoRng, Rng},
    symkey::SymmetricKey,
};
use utils::ensure;
use zeroize::Zeroizing;

use super::{
    crypter::{EncryptedData, KeyCrypter, KeyCrypterError},
    KeyChainError, KeyChainResult,
};

/// Entropy of a newly generated seed, gives 12 mnemonic words
pub const DEFAULT_SEED_ENTROPY_BITS: usize = 128;
/// Gives 24 mnemonic words
pub const MAX_SEED_ENTROPY_BITS: usize = 256;

const MIN_SEED_ENTROPY_BITS: usize = 128;

#[derive(Clone, PartialEq, Eq)]
enum SeedData {
    Plain {
        mnemonic: Zeroizing<String>,
        seed: Zeroizing<Vec<u8>>,
    },
    Encrypted {
        encrypted_mnemonic: EncryptedData,
        encrypted_seed: Option<EncryptedData>,
        crypter: KeyCrypter,
    },
}

/// The BIP39 mnemonic and the seed generated from it, the root of a deterministic key chain
#[derive(Clone, PartialEq, Eq)]
pub struct DeterministicSeed {
    data: SeedData,
    creation_time: Seconds,
}

impl DeterministicSeed {
    pub fn from_entropy(
        entropy: &[u8],
        passphrase: &str,
        creation_time: Seconds,
    ) -> KeyChainResult<Self> {
        let bits = entropy.len() * 8;
        ensure!(
            (MIN_SEED_ENTROPY_BITS..=MAX_SEED_ENTROPY_BITS).contains(&bits) && bits % 32 == 0,
            KeyChainError::IllegalArgument(format!("Invalid seed entropy length: {bits} bits"))
        );
        let mnemonic = Mnemonic::from_entropy(entropy).map_err(KeyChainError::Bip39)?;
        Ok(Self::from_bip39(&mnemonic, passphrase, creation_time))
    }

    pub fn from_random(
        rng: &mut (impl Rng + CryptoRng),
        bits: usize,
        passphrase: &str,
        creation_time: Seconds,
    ) -> KeyChainResult<Self> {
        ensure!(
            bits % 8 == 0,
            KeyChainError::IllegalArgument(format!("Invalid seed entropy length: {bits} bits"))
        );
        let mut entropy = Zeroizing::new(vec![0u8; bits / 8]);
        rng.fill(entropy.as_mut_slice());
        Self::from_entropy(&entropy, passphrase, creation_time)
    }

    pub fn from_mnemonic(
        words: &str,
        passphrase: &str,
        creation_time: Seconds,
    ) -> KeyChainResult<Self> {
        let normalized = Zeroizing::new(words.split_whitespace().collect::<Vec<_>>().join(" "));
        let mnemonic = Mnemonic::parse_normalized(&normalized).map_err(KeyChainError::Bip39)?;
        Ok(Self::from_bip39(&mnemonic, passphrase, creation_time))
    }

    /// Rebuild a plain seed from its stored parts. Without the seed bytes they are recomputed
    /// from the mnemonic with an empty passphrase.
    pub fn from_plain_parts(
        mnemonic: String,
        seed: Option<Vec<u8>>,
        creation_time: Seconds,
    ) -> KeyChainResult<Self> {
        let mnemonic = Zeroizing::new(mnemonic);
        let seed = match seed {
            Some(seed) => Zeroizing::new(seed),
            None => {
                let parsed =
                    Mnemonic::parse_normalized(&mnemonic).map_err(KeyChainError::Bip39)?;
                Zeroizing::new(parsed.to_seed_normalized("").to_vec())
            }
        };
        Ok(Self {
            data: SeedData::Plain { mnemonic, seed },
            creation_time,
        })
    }

    pub fn from_encrypted_parts(
        encrypted_mnemonic: EncryptedData,
        encrypted_seed: Option<EncryptedData>,
        crypter: KeyCrypter,
        creation_time: Seconds,
    ) -> Self {
        Self {
            data: SeedData::Encrypted {
                encrypted_mnemonic,
                encrypted_seed,
                crypter,
            },
            creation_time,
        }
    }

    fn from_bip39(mnemonic: &Mnemonic, passphrase: &str, creation_time: Seconds) -> Self {
        let seed = Zeroizing::new(mnemonic.to_seed_normalized(passphrase).to_vec());
        Self {
            data: SeedData::Plain {
                mnemonic: Zeroizing::new(mnemonic.to_string()),
                seed,
            },
            creation_time,
        }
    }

    pub fn creation_time(&self) -> Seconds {
        self.creation_time
    }

    pub fn set_creation_time(&mut self, creation_time: Seconds) {
        self.creation_time = creation_time;
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self.data, SeedData::Encrypted { .. })
    }

    pub fn crypter(&self) -> Option<&KeyCrypter> {
        match &self.data {
            SeedData::Plain { .. } => None,
            SeedData::Encrypted { crypter, .. } => Some(crypter),
        }
    }

    /// The mnemonic sentence, if the seed is not encrypted
    pub fn mnemonic(&self) -> Option<&str> {
        match &self.data {
            SeedData::Plain { mnemonic, .. } => Some(mnemonic.as_str()),
            SeedData::Encrypted { .. } => None,
        }
    }

    pub fn mnemonic_words(&self) -> Option<Vec<&str>> {
        self.mnemonic().map(|m| m.split(' ').collect())
    }

    /// The BIP39 seed, if not encrypted
    pub fn seed_bytes(&self) -> Option<&[u8]> {
        match &self.data {
            SeedData::Plain { seed, .. } => Some(seed.as_slice()),
            SeedData::Encrypted { .. } => None,
        }
    }

    pub fn encrypted_mnemonic(&self) -> Option<&EncryptedData> {
        match &self.data {
            SeedData::Plain { .. } => None,
            SeedData::Encrypted {
                encrypted_mnemonic, ..
            } => Some(encrypted_mnemonic),
        }
    }

    pub fn encrypted_seed(&self) -> Option<&EncryptedData> {
        match &self.data {
            SeedData::Plain { .. } => None,
            SeedData::Encrypted { encrypted_seed, .. } => encrypted_seed.as_ref(),
        }
    }

    /// The BIP32 root key
    pub fn master_key(&self) -> KeyChainResult<ExtendedPrivateKey> {
        let seed = self.seed_bytes().ok_or(KeyChainError::EncryptionKeyRequired)?;
        Ok(ExtendedPrivateKey::new_master(seed)?)
    }

    pub fn encrypt(
        &self,
        crypter: &KeyCrypter,
        aes_key: &SymmetricKey,
        rng: &mut (impl Rng + CryptoRng),
    ) -> KeyChainResult<Self> {
        match &self.data {
            SeedData::Plain { mnemonic, seed } => {
                let encrypted_mnemonic = crypter.encrypt_checked(mnemonic.as_bytes(), aes_key, rng)?;
                let encrypted_seed = crypter.encrypt_checked(seed, aes_key, rng)?;
                Ok(Self::from_encrypted_parts(
                    encrypted_mnemonic,
                    Some(encrypted_seed),
                    crypter.clone(),
                    self.creation_time,
                ))
            }
            SeedData::Encrypted { .. } => Err(KeyChainError::AlreadyEncrypted),
        }
    }

    pub fn decrypt(&self, aes_key: &SymmetricKey) -> KeyChainResult<Self> {
        match &self.data {
            SeedData::Plain { .. } => Err(KeyChainError::NotEncrypted),
            SeedData::Encrypted {
                encrypted_mnemonic,
                encrypted_seed,
                crypter,
            } => {
                let mnemonic = crypter.decrypt(encrypted_mnemonic, aes_key)?;
                let mnemonic = String::from_utf8(mnemonic.to_vec())
                    .map_err(|_| KeyCrypterError::InvalidEncryptedData)?;
                let seed = encrypted_seed
                    .as_ref()
                    .map(|data| crypter.decrypt(data, aes_key).map(|seed| seed.to_vec()))
                    .transpose()?;
                Self::from_plain_parts(mnemonic, seed, self.creation_time)
            }
        }
    }
}

impl fmt::Debug for DeterministicSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeterministicSeed")
            .field("encrypted", &self.is_encrypted())
            .field("creation_time", &self.creation_time)
            .finish_non_exhaustive()
    }
}
