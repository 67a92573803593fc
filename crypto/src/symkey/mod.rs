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

//! Authenticated symmetric encryption of small secrets (private keys, seeds, mnemonics).

mod chacha20poly1305;

pub use self::chacha20poly1305::{SymmetricKey, KEY_LEN, NONCE_LEN};

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum SymKeyError {
    #[error("Encryption error: {0}")]
    EncryptionError(String),
    #[error("Decryption error: {0}")]
    DecryptionError(String),
    #[error("Nonce must be {expected} bytes, got {actual}")]
    InvalidNonceLength { expected: usize, actual: usize },
}

/// Output of [SymmetricKey::seal]: the random nonce and the cipher text with its tag appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}
