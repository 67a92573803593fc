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

//! Password based encryption of key material

use crypto::{
    kdf::{make_salt, KdfConfig, KdfError},
    random::{CryptoRng, Rng},
    symkey::{SymKeyError, SymmetricKey, KEY_LEN},
};
use parity_scale_codec::{Decode, Encode};
use utils::ensure;
use zeroize::Zeroizing;

use super::config::DEFAULT_SALT_LENGTH;

#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum KeyCrypterError {
    #[error("Empty password")]
    EmptyPassword,
    #[error("Key derivation error: {0}")]
    Kdf(#[from] KdfError),
    #[error("Encryption failed: {0}")]
    Encryption(SymKeyError),
    #[error("Decryption failed: {0}")]
    Decryption(SymKeyError),
    #[error("Malformed encrypted data")]
    InvalidEncryptedData,
    #[error("Decrypting the encrypted data did not give back the original")]
    RoundTripMismatch,
}

/// An encrypted blob: the nonce used for the encryption and the authenticated cipher text
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct EncryptedData {
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Turns passwords into encryption keys and encrypts and decrypts with them.
///
/// Two crypters are equal when they derive the same key from the same password.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct KeyCrypter {
    kdf_config: KdfConfig,
    salt: Vec<u8>,
}

impl KeyCrypter {
    /// A crypter with a fresh random salt
    pub fn new_with_rng(rng: &mut (impl Rng + CryptoRng), kdf_config: KdfConfig) -> Self {
        Self {
            kdf_config,
            salt: make_salt(rng, DEFAULT_SALT_LENGTH),
        }
    }

    pub fn from_parts(kdf_config: KdfConfig, salt: Vec<u8>) -> Self {
        Self { kdf_config, salt }
    }

    pub fn kdf_config(&self) -> &KdfConfig {
        &self.kdf_config
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn derive_key(&self, password: &str) -> Result<SymmetricKey, KeyCrypterError> {
        ensure!(!password.is_empty(), KeyCrypterError::EmptyPassword);

        let key = self
            .kdf_config
            .derive::<KEY_LEN>(&self.salt, password.as_bytes())?;
        Ok(SymmetricKey::from_bytes(*key))
    }

    pub fn encrypt(
        &self,
        plain_bytes: &[u8],
        key: &SymmetricKey,
        rng: &mut (impl Rng + CryptoRng),
    ) -> Result<EncryptedData, KeyCrypterError> {
        let sealed = key.seal(plain_bytes, rng).map_err(KeyCrypterError::Encryption)?;
        Ok(EncryptedData {
            iv: sealed.nonce.to_vec(),
            ciphertext: sealed.ciphertext,
        })
    }

    pub fn decrypt(
        &self,
        data: &EncryptedData,
        key: &SymmetricKey,
    ) -> Result<Zeroizing<Vec<u8>>, KeyCrypterError> {
        key.open(&data.iv, &data.ciphertext).map_err(|err| match err {
            SymKeyError::InvalidNonceLength { .. } => KeyCrypterError::InvalidEncryptedData,
            err => KeyCrypterError::Decryption(err),
        })
    }

    /// Encrypt and check that the result decrypts back to the input
    pub fn encrypt_checked(
        &self,
        plain_bytes: &[u8],
        key: &SymmetricKey,
        rng: &mut (impl Rng + CryptoRng),
    ) -> Result<EncryptedData, KeyCrypterError> {
        let encrypted = self.encrypt(plain_bytes, key, rng)?;
        let decrypted = self.decrypt(&encrypted, key)?;
        ensure!(
            decrypted.as_slice() == plain_bytes,
            KeyCrypterError::RoundTripMismatch
        );
        Ok(encrypted)
    }
}

#[cfg(test)]
mod tests {
    use crypto::symkey::NONCE_LEN;
    use rstest::rstest;
    use test_utils::{
        assert_matches,
        random::{make_seedable_rng, Seed},
    };

    use super::super::config::TEST_KDF_CONFIG;
    use super::*;

    #[rstest]
    #[trace]
    #[case(Seed::from_entropy())]
    fn encrypt_decrypt(#[case] seed: Seed) {
        let mut rng = make_seedable_rng(seed);
        let crypter = KeyCrypter::new_with_rng(&mut rng, TEST_KDF_CONFIG);
        assert_eq!(crypter.salt().len(), DEFAULT_SALT_LENGTH);

        let key = crypter.derive_key("hunter2").unwrap();
        let message = b"some private key material";
        let encrypted = crypter.encrypt(message, &key, &mut rng).unwrap();
        assert_eq!(encrypted.iv.len(), NONCE_LEN);
        assert_ne!(encrypted.ciphertext.as_slice(), message.as_slice());
        assert_eq!(crypter.decrypt(&encrypted, &key).unwrap().as_slice(), message);

        let checked = crypter.encrypt_checked(message, &key, &mut rng).unwrap();
        // Fresh nonce for every encryption
        assert_ne!(checked, encrypted);

        let wrong_key = crypter.derive_key("hunter3").unwrap();
        assert_matches!(
            crypter.decrypt(&encrypted, &wrong_key),
            Err(KeyCrypterError::Decryption(_))
        );
    }

    #[rstest]
    #[trace]
    #[case(Seed::from_entropy())]
    fn same_password_same_key(#[case] seed: Seed) {
        let mut rng = make_seedable_rng(seed);
        let crypter = KeyCrypter::new_with_rng(&mut rng, TEST_KDF_CONFIG);
        let copy = KeyCrypter::from_parts(*crypter.kdf_config(), crypter.salt().to_vec());
        assert_eq!(crypter, copy);

        let encrypted =
            crypter.encrypt(b"abc", &crypter.derive_key("pw").unwrap(), &mut rng).unwrap();
        let decrypted = copy.decrypt(&encrypted, &copy.derive_key("pw").unwrap()).unwrap();
        assert_eq!(decrypted.as_slice(), b"abc");

        // A different salt gives a different key
        let other = KeyCrypter::new_with_rng(&mut rng, TEST_KDF_CONFIG);
        assert_ne!(crypter, other);
        assert!(other.decrypt(&encrypted, &other.derive_key("pw").unwrap()).is_err());
    }

    #[test]
    fn rejects_bad_input() {
        let crypter = KeyCrypter::from_parts(TEST_KDF_CONFIG, vec![7; 16]);
        assert_eq!(
            crypter.derive_key("").unwrap_err(),
            KeyCrypterError::EmptyPassword
        );

        let key = crypter.derive_key("pw").unwrap();
        let truncated = EncryptedData {
            iv: vec![0; 5],
            ciphertext: vec![1, 2, 3],
        };
        assert_eq!(
            crypter.decrypt(&truncated, &key).unwrap_err(),
            KeyCrypterError::InvalidEncryptedData
        );
    }
}
