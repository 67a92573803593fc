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

use std::fmt;

use ::chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use zeroize::{Zeroize, Zeroizing};

use crate::random::{CryptoRng, Rng};

use super::{Sealed, SymKeyError};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;

/// An XChaCha20-Poly1305 key. The key bytes are wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey {
    key: Key,
}

impl SymmetricKey {
    pub fn new_from_rng(rng: &mut (impl Rng + CryptoRng)) -> Self {
        let bytes = Zeroizing::new(rng.gen::<[u8; KEY_LEN]>());
        Self::from_bytes(*bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { key: bytes.into() }
    }

    /// Encrypt under a fresh random nonce
    pub fn seal(
        &self,
        plain_bytes: &[u8],
        rng: &mut (impl Rng + CryptoRng),
    ) -> Result<Sealed, SymKeyError> {
        let nonce = rng.gen::<[u8; NONCE_LEN]>();
        let ciphertext = self.seal_with_nonce(&nonce, plain_bytes)?;
        Ok(Sealed { nonce, ciphertext })
    }

    fn seal_with_nonce(
        &self,
        nonce: &[u8; NONCE_LEN],
        plain_bytes: &[u8],
    ) -> Result<Vec<u8>, SymKeyError> {
        let mut buffer = plain_bytes.to_vec();
        XChaCha20Poly1305::new(&self.key)
            .encrypt_in_place(XNonce::from_slice(nonce), b"", &mut buffer)
            .map_err(|e| SymKeyError::EncryptionError(e.to_string()))?;
        Ok(buffer)
    }

    /// Decrypt and authenticate. A wrong key or tampered data fails with `DecryptionError`.
    pub fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, SymKeyError> {
        if nonce.len() != NONCE_LEN {
            return Err(SymKeyError::InvalidNonceLength {
                expected: NONCE_LEN,
                actual: nonce.len(),
            });
        }

        let mut buffer = Zeroizing::new(ciphertext.to_vec());
        XChaCha20Poly1305::new(&self.key)
            .decrypt_in_place(XNonce::from_slice(nonce), b"", &mut *buffer)
            .map_err(|e| SymKeyError::DecryptionError(e.to_string()))?;
        Ok(buffer)
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.key.as_mut_slice().zeroize();
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(XChaCha20Poly1305)")
    }
}
