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

use common::{address::PublicKeyHash, primitives::time::Seconds};
use crypto::{
    key::{PrivateKey, PublicKey, Signature},
    random::{CryptoRng, Rng},
    symkey::SymmetricKey,
};

use super::{
    crypter::{EncryptedData, KeyCrypter, KeyCrypterError},
    KeyChainError, KeyChainResult,
};

/// The private part of a key, if the wallet has it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySecret {
    Plain(PrivateKey),
    Encrypted {
        data: EncryptedData,
        crypter: KeyCrypter,
    },
    /// Watching only
    Absent,
}

impl KeySecret {
    pub fn is_plain(&self) -> bool {
        matches!(self, KeySecret::Plain(_))
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, KeySecret::Encrypted { .. })
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, KeySecret::Absent)
    }

    pub fn crypter(&self) -> Option<&KeyCrypter> {
        match self {
            KeySecret::Encrypted { crypter, .. } => Some(crypter),
            KeySecret::Plain(_) | KeySecret::Absent => None,
        }
    }

    pub fn encrypt(
        &self,
        crypter: &KeyCrypter,
        aes_key: &SymmetricKey,
        rng: &mut (impl Rng + CryptoRng),
    ) -> KeyChainResult<KeySecret> {
        match self {
            KeySecret::Plain(private_key) => {
                let data = crypter.encrypt_checked(&private_key.to_bytes(), aes_key, rng)?;
                Ok(KeySecret::Encrypted {
                    data,
                    crypter: crypter.clone(),
                })
            }
            KeySecret::Encrypted { .. } => Err(KeyChainError::AlreadyEncrypted),
            KeySecret::Absent => Ok(KeySecret::Absent),
        }
    }

    /// Decrypt and check that the private key belongs to `public_key`
    pub fn decrypt(&self, aes_key: &SymmetricKey, public_key: &PublicKey) -> KeyChainResult<KeySecret> {
        match self {
            KeySecret::Encrypted { data, crypter } => {
                let private_key = decrypt_private_key(crypter, data, aes_key)?;
                if &private_key.public_key() != public_key {
                    return Err(KeyChainError::BadPassword);
                }
                Ok(KeySecret::Plain(private_key))
            }
            KeySecret::Plain(_) => Err(KeyChainError::NotEncrypted),
            KeySecret::Absent => Ok(KeySecret::Absent),
        }
    }

    /// The private key, decrypting it with `aes_key` if needed
    pub fn private_key(&self, aes_key: Option<&SymmetricKey>) -> KeyChainResult<PrivateKey> {
        match self {
            KeySecret::Plain(private_key) => Ok(private_key.clone()),
            KeySecret::Encrypted { data, crypter } => {
                let aes_key = aes_key.ok_or(KeyChainError::EncryptionKeyRequired)?;
                decrypt_private_key(crypter, data, aes_key)
            }
            KeySecret::Absent => Err(KeyChainError::MissingPrivateKey),
        }
    }
}

fn decrypt_private_key(
    crypter: &KeyCrypter,
    data: &EncryptedData,
    aes_key: &SymmetricKey,
) -> KeyChainResult<PrivateKey> {
    let bytes = crypter.decrypt(data, aes_key)?;
    PrivateKey::from_bytes(&bytes).map_err(|_| KeyCrypterError::InvalidEncryptedData.into())
}

/// A standalone key, as kept in a basic key chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletKey {
    public_key: PublicKey,
    secret: KeySecret,
    /// Zero if unknown
    creation_time: Seconds,
}

impl WalletKey {
    pub fn new_random(rng: &mut (impl Rng + CryptoRng), creation_time: Seconds) -> Self {
        let (private_key, public_key) = PrivateKey::new_from_rng(rng);
        Self {
            public_key,
            secret: KeySecret::Plain(private_key),
            creation_time,
        }
    }

    pub fn from_private_key(private_key: PrivateKey, creation_time: Seconds) -> Self {
        Self {
            public_key: private_key.public_key(),
            secret: KeySecret::Plain(private_key),
            creation_time,
        }
    }

    pub fn watching(public_key: PublicKey, creation_time: Seconds) -> Self {
        Self {
            public_key,
            secret: KeySecret::Absent,
            creation_time,
        }
    }

    pub fn from_encrypted(
        public_key: PublicKey,
        data: EncryptedData,
        crypter: KeyCrypter,
        creation_time: Seconds,
    ) -> Self {
        Self {
            public_key,
            secret: KeySecret::Encrypted { data, crypter },
            creation_time,
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn pubkey_hash(&self) -> PublicKeyHash {
        PublicKeyHash::from(&self.public_key)
    }

    pub fn secret(&self) -> &KeySecret {
        &self.secret
    }

    pub fn creation_time(&self) -> Seconds {
        self.creation_time
    }

    pub fn set_creation_time(&mut self, creation_time: Seconds) {
        self.creation_time = creation_time;
    }

    pub fn is_watching(&self) -> bool {
        self.secret.is_absent()
    }

    pub fn is_encrypted(&self) -> bool {
        self.secret.is_encrypted()
    }

    /// True if the private key is not directly available
    pub fn is_pubkey_only(&self) -> bool {
        !self.secret.is_plain()
    }

    pub fn encrypt(
        &self,
        crypter: &KeyCrypter,
        aes_key: &SymmetricKey,
        rng: &mut (impl Rng + CryptoRng),
    ) -> KeyChainResult<WalletKey> {
        Ok(Self {
            public_key: self.public_key.clone(),
            secret: self.secret.encrypt(crypter, aes_key, rng)?,
            creation_time: self.creation_time,
        })
    }

    pub fn decrypt(&self, aes_key: &SymmetricKey) -> KeyChainResult<WalletKey> {
        Ok(Self {
            public_key: self.public_key.clone(),
            secret: self.secret.decrypt(aes_key, &self.public_key)?,
            creation_time: self.creation_time,
        })
    }

    pub fn private_key(&self, aes_key: Option<&SymmetricKey>) -> KeyChainResult<PrivateKey> {
        self.secret.private_key(aes_key)
    }

    pub fn sign_message(
        &self,
        message: &[u8],
        aes_key: Option<&SymmetricKey>,
    ) -> KeyChainResult<Signature> {
        Ok(self.private_key(aes_key)?.sign_message(message))
    }
}
