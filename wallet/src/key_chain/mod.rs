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

//! # HD key chains
//! Key chains hold the wallet keys and hand them out as they are needed.
//!
//! Deterministic key chains derive everything from a single seed using the following scheme:
//!
//! <account_path>/<branch>/<key_index>
//!
//! Where `account_path` depends on the chain's output script type and the group structure
//!       (m/0' for P2PKH and m/1' for P2WPKH by default, m/44'/<coin_type>'/0' and
//!       m/84'/<coin_type>'/0' with the BIP43 structure),
//!       `branch` is 0 for external (receiving) keys and 1 for internal (change) keys,
//!       `key_index` starts from 0 and it is incremented for each new key.
//!
//! Standalone keys that are imported or randomly generated live in a [BasicKeyChain].
//! A [KeyChainGroup] combines one basic chain with any number of deterministic chains, the last
//! of which is the active one.

mod basic_key_chain;
mod config;
mod crypter;
mod deterministic_key;
mod deterministic_key_chain;
mod deterministic_seed;
mod key_chain_group;
mod records;
mod redeem_data;
mod wallet_key;
mod with_purpose;

use std::fmt;

use common::address::{AddressError, PublicKeyHash};
use crypto::key::{
    extended::ExtendedKeyEncodingError, hdkd::derivable::DerivationError, KeyError, PublicKey,
};
use crypto::key::hdkd::derivation_path::DerivationPath;
use utils::bloom_filters::BloomFilterError;

pub use basic_key_chain::{BasicKeyChain, WatchingState};
pub use config::{
    KeyChainConfig, KeyChainGroupStructure, DEFAULT_LOOKAHEAD_SIZE, DEFAULT_SALT_LENGTH,
};
pub use crypter::{EncryptedData, KeyCrypter, KeyCrypterError};
pub use deterministic_key::DeterministicKey;
pub use deterministic_key_chain::{
    ChainSource, DeterministicKeyChain, DeterministicKeyChainConfig, MultisigConfig,
};
pub use deterministic_seed::{
    DeterministicSeed, DEFAULT_SEED_ENTROPY_BITS, MAX_SEED_ENTROPY_BITS,
};
pub use key_chain_group::{KeyChainGroup, KeyChainGroupBuilder};
pub use records::{decode_records, encode_records, DeterministicKeyRecord, KeyRecord, KeyType};
pub use redeem_data::RedeemData;
pub use wallet_key::{KeySecret, WalletKey};
pub use with_purpose::{Branch, WithPurpose};

/// KeyChain errors
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum KeyChainError {
    #[error("Cannot encrypt a key chain group without keys or chains")]
    NoKeysOrChains,
    #[error("Key chain is already encrypted")]
    AlreadyEncrypted,
    #[error("Key chain is not encrypted")]
    NotEncrypted,
    #[error("Cannot mix watching and spending keys in one chain")]
    MixedWatchingAndSpending,
    #[error("Cannot tell whether an empty key chain group is watching")]
    WatchingStateUndetermined,
    #[error("Key encryption state does not match the chain")]
    EncryptionStateMismatch,
    #[error("Key is encrypted under different parameters than the chain")]
    CrypterMismatch,
    #[error("Cannot create new keys in an encrypted chain")]
    CannotCreateKeysWhileEncrypted,
    #[error("Married chains hand out P2SH addresses, not single keys")]
    UnsupportedForMarriedChain,
    #[error("This key chain group does not support deterministic chains")]
    DeterministicChainsUnsupported,
    #[error("No deterministic chain present, a deterministic upgrade is required")]
    DeterministicUpgradeRequired,
    #[error("Cannot encrypt a watching chain")]
    CannotEncryptWatchingChain,
    #[error("Following chains are not in sync with the followed chain")]
    FollowingChainsOutOfSync,
    #[error("The chain already issued keys")]
    KeysAlreadyIssued,
    #[error("Lookahead threshold {threshold} must be below the lookahead size {size}")]
    LookaheadThresholdTooLarge { threshold: u32, size: u32 },
    #[error("Invalid argument: {0}")]
    IllegalArgument(String),
    #[error("No key at path {0}")]
    KeyNotFound(DerivationPath),
    #[error("Key at path {0} does not match its rederivation")]
    BitFlipDetected(DerivationPath),
    #[error("The chain is encrypted and no decryption key was provided")]
    EncryptionKeyRequired,
    #[error("Wrong password or decryption key")]
    BadPassword,
    #[error("The key chain group is encrypted, a password is needed for the deterministic upgrade")]
    DeterministicUpgradeRequiresPassword,
    #[error("All random keys are older than the key rotation time")]
    AllRandomKeysRotating,
    #[error("No private key found")]
    MissingPrivateKey,
    #[error("Unreadable wallet: {0}")]
    UnreadableWallet(String),
    #[error("Key derivation error: {0}")]
    Derivation(#[from] DerivationError),
    #[error("Key crypter error: {0}")]
    KeyCrypter(#[from] KeyCrypterError),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("Extended key encoding error: {0}")]
    ExtendedKeyEncoding(#[from] ExtendedKeyEncodingError),
    #[error("Bip39 error: {0}")]
    Bip39(bip39::Error),
    #[error("Script error: {0}")]
    Script(#[from] script::Error),
    #[error("Address error: {0}")]
    Address(#[from] AddressError),
    #[error("Bloom filter error: {0}")]
    Bloom(#[from] BloomFilterError),
}

/// Result type used for the key chain
pub type KeyChainResult<T> = Result<T, KeyChainError>;

/// What a key is going to be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyPurpose {
    ReceiveFunds,
    Refund,
    Change,
    Authentication,
}

impl KeyPurpose {
    pub const ALL: [KeyPurpose; 4] = [
        KeyPurpose::ReceiveFunds,
        KeyPurpose::Refund,
        KeyPurpose::Change,
        KeyPurpose::Authentication,
    ];

    /// The branch of the account the keys for this purpose are derived on
    pub const fn branch(self) -> Branch {
        match self {
            KeyPurpose::ReceiveFunds | KeyPurpose::Refund => Branch::External,
            KeyPurpose::Change | KeyPurpose::Authentication => Branch::Internal,
        }
    }
}

/// Notifications sent to key chain listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyChainEvent {
    /// New keys were added to the chain, either imported or derived for the lookahead
    KeysAdded(Vec<PublicKey>),
}

/// A key found by one of the lookup functions of a key chain group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoundKey {
    Standalone(WalletKey),
    Hierarchy(DeterministicKey),
}

impl FoundKey {
    pub fn public_key(&self) -> &PublicKey {
        match self {
            FoundKey::Standalone(key) => key.public_key(),
            FoundKey::Hierarchy(key) => key.public_key(),
        }
    }

    pub fn pubkey_hash(&self) -> PublicKeyHash {
        PublicKeyHash::from(self.public_key())
    }

    pub fn secret(&self) -> &KeySecret {
        match self {
            FoundKey::Standalone(key) => key.secret(),
            FoundKey::Hierarchy(key) => key.secret(),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.secret().is_encrypted()
    }

    pub fn into_deterministic(self) -> Option<DeterministicKey> {
        match self {
            FoundKey::Standalone(_) => None,
            FoundKey::Hierarchy(key) => Some(key),
        }
    }
}

impl fmt::Display for FoundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FoundKey::Standalone(key) => write!(f, "{}", hex::encode(key.public_key().to_bytes())),
            FoundKey::Hierarchy(key) => write!(
                f,
                "{} ({})",
                hex::encode(key.public_key().to_bytes()),
                key.path()
            ),
        }
    }
}

#[cfg(test)]
mod tests;
