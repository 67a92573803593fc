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

use std::collections::BTreeMap;
use std::sync::Arc;

use common::address::PublicKeyHash;
use common::primitives::time::{millis_to_seconds, seconds_to_millis, Seconds};
use common::time_getter::TimeGetter;
use crypto::key::{PrivateKey, PublicKey};
use crypto::random::{CryptoRng, Rng};
use crypto::symkey::SymmetricKey;
use logging::log;
use parking_lot::Mutex;
use utils::bloom_filters::{BloomFilter, BloomUpdate};
use utils::ensure;
use utils::eventhandler::{EventHandler, Executor, ListenerId, ListenerRegistry};

use super::crypter::KeyCrypter;
use super::records::{KeyRecord, KeyType};
use super::wallet_key::{KeySecret, WalletKey};
use super::{KeyChainError, KeyChainEvent, KeyChainResult};

/// Whether a basic key chain holds private keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchingState {
    /// No keys yet, so it cannot be told
    Empty,
    Watching,
    Regular,
}

#[derive(Default)]
struct BasicChainState {
    keys: BTreeMap<PublicKeyHash, WalletKey>,
    /// Insertion order of the keys
    order: Vec<PublicKeyHash>,
    /// Fixed by the first key added
    is_watching: bool,
}

impl BasicChainState {
    fn ordered_keys(&self) -> impl Iterator<Item = &WalletKey> + '_ {
        self.order.iter().filter_map(|hash| self.keys.get(hash))
    }

    fn has_key(&self, public_key: &PublicKey) -> bool {
        self.find_by_pub_key(public_key).is_some()
    }

    fn find_by_pub_key(&self, public_key: &PublicKey) -> Option<&WalletKey> {
        self.keys
            .get(&PublicKeyHash::from(public_key))
            .filter(|key| key.public_key() == public_key)
    }

    fn insert(&mut self, key: WalletKey) -> KeyChainResult<()> {
        if self.keys.is_empty() {
            self.is_watching = key.is_watching();
        } else {
            ensure!(
                key.is_watching() == self.is_watching,
                KeyChainError::MixedWatchingAndSpending
            );
        }
        let hash = key.pubkey_hash();
        if self.keys.insert(hash, key).is_none() {
            self.order.push(hash);
        }
        Ok(())
    }
}

/// A flat collection of unrelated keys, random or imported
pub struct BasicKeyChain {
    /// Set if the keys of this chain are encrypted
    crypter: Option<KeyCrypter>,

    time_getter: TimeGetter,

    state: Mutex<BasicChainState>,

    listeners: ListenerRegistry<KeyChainEvent>,
}

impl BasicKeyChain {
    pub fn new(crypter: Option<KeyCrypter>, time_getter: TimeGetter) -> Self {
        Self {
            crypter,
            time_getter,
            state: Mutex::new(BasicChainState::default()),
            listeners: ListenerRegistry::new(),
        }
    }

    pub fn crypter(&self) -> Option<&KeyCrypter> {
        self.crypter.as_ref()
    }

    pub fn is_encrypted(&self) -> bool {
        self.crypter.is_some()
    }

    /// The first key of the chain, a random key is created if the chain is empty
    pub fn get_key(&self, rng: &mut (impl Rng + CryptoRng)) -> KeyChainResult<WalletKey> {
        let mut keys = self.get_keys(1, rng)?;
        keys.pop().ok_or(KeyChainError::NoKeysOrChains)
    }

    /// The first `count` keys of the chain, random keys are created to fill up the chain as needed
    pub fn get_keys(
        &self,
        count: usize,
        rng: &mut (impl Rng + CryptoRng),
    ) -> KeyChainResult<Vec<WalletKey>> {
        ensure!(
            count > 0,
            KeyChainError::IllegalArgument("Number of keys must be positive".into())
        );

        let (keys, added) = {
            let mut state = self.state.lock();
            let mut added = Vec::new();
            if state.keys.len() < count {
                ensure!(
                    self.crypter.is_none(),
                    KeyChainError::CannotCreateKeysWhileEncrypted
                );
                let now = self.time_getter.get_time_secs();
                for _ in state.keys.len()..count {
                    let key = WalletKey::new_random(rng, now);
                    added.push(key.public_key().clone());
                    state.insert(key)?;
                }
            }
            let keys: Vec<_> = state.ordered_keys().take(count).cloned().collect();
            (keys, added)
        };

        self.notify_keys_added(added);
        Ok(keys)
    }

    pub fn keys(&self) -> Vec<WalletKey> {
        self.state.lock().ordered_keys().cloned().collect()
    }

    /// Import keys that are not yet in the chain, returns the number of keys actually added.
    /// Keys already in the chain are skipped before any other check.
    ///
    /// The keys must be encrypted if and only if the chain is, under the same crypter, and they must
    /// all be watching or all be spending, like the keys already in the chain.
    pub fn import_keys(&self, keys: Vec<WalletKey>) -> KeyChainResult<usize> {
        for key in &keys {
            self.check_key_encryption_state(key)?;
        }

        let added = {
            let mut state = self.state.lock();
            // Check everything up front so that a failed import leaves the chain untouched
            let mut is_watching = (!state.keys.is_empty()).then_some(state.is_watching);
            for key in keys.iter().filter(|key| !state.has_key(key.public_key())) {
                let expected = *is_watching.get_or_insert(key.is_watching());
                ensure!(
                    key.is_watching() == expected,
                    KeyChainError::MixedWatchingAndSpending
                );
            }

            let mut added = Vec::new();
            for key in keys {
                if state.has_key(key.public_key()) {
                    continue;
                }
                added.push(key.public_key().clone());
                state.insert(key)?;
            }
            added
        };

        let count = added.len();
        self.notify_keys_added(added);
        Ok(count)
    }

    pub fn import_key(&self, key: WalletKey) -> KeyChainResult<()> {
        self.import_keys(vec![key]).map(|_| ())
    }

    fn check_key_encryption_state(&self, key: &WalletKey) -> KeyChainResult<()> {
        match (&self.crypter, key.secret()) {
            (None, KeySecret::Encrypted { .. }) => Err(KeyChainError::EncryptionStateMismatch),
            (Some(_), KeySecret::Plain(_) | KeySecret::Absent) => {
                Err(KeyChainError::EncryptionStateMismatch)
            }
            (Some(crypter), KeySecret::Encrypted { crypter: key_crypter, .. }) => {
                ensure!(crypter == key_crypter, KeyChainError::CrypterMismatch);
                Ok(())
            }
            (None, KeySecret::Plain(_) | KeySecret::Absent) => Ok(()),
        }
    }

    pub fn find_key_from_pub_hash(&self, hash: &PublicKeyHash) -> Option<WalletKey> {
        self.state.lock().keys.get(hash).cloned()
    }

    pub fn find_key_from_pub_key(&self, public_key: &PublicKey) -> Option<WalletKey> {
        self.state.lock().find_by_pub_key(public_key).cloned()
    }

    pub fn has_key(&self, public_key: &PublicKey) -> bool {
        self.state.lock().has_key(public_key)
    }

    pub fn num_keys(&self) -> usize {
        self.state.lock().keys.len()
    }

    pub fn is_watching(&self) -> WatchingState {
        let state = self.state.lock();
        if state.keys.is_empty() {
            WatchingState::Empty
        } else if state.is_watching {
            WatchingState::Watching
        } else {
            WatchingState::Regular
        }
    }

    /// Removing a key with a private key destroys the funds it controls
    pub fn remove_key(&self, public_key: &PublicKey) -> bool {
        let mut state = self.state.lock();
        if !state.has_key(public_key) {
            return false;
        }
        let hash = PublicKeyHash::from(public_key);
        state.keys.remove(&hash);
        state.order.retain(|h| *h != hash);
        true
    }

    /// `Seconds::MAX` if there are no keys
    pub fn earliest_key_creation_time(&self) -> Seconds {
        self.state
            .lock()
            .keys
            .values()
            .map(WalletKey::creation_time)
            .min()
            .unwrap_or(Seconds::MAX)
    }

    /// The oldest key created strictly after `time`
    pub fn find_oldest_key_after(&self, time: Seconds) -> Option<WalletKey> {
        self.state
            .lock()
            .ordered_keys()
            .filter(|key| key.creation_time() > time)
            .min_by_key(|key| key.creation_time())
            .cloned()
    }

    /// All keys created strictly before `time`
    pub fn find_keys_before(&self, time: Seconds) -> Vec<WalletKey> {
        self.state
            .lock()
            .ordered_keys()
            .filter(|key| key.creation_time() < time)
            .cloned()
            .collect()
    }

    pub fn private_key_for(
        &self,
        public_key: &PublicKey,
        aes_key: Option<&SymmetricKey>,
    ) -> KeyChainResult<Option<PrivateKey>> {
        self.find_key_from_pub_key(public_key)
            .map(|key| key.private_key(aes_key))
            .transpose()
    }

    /// Every key contributes its public key and the hash of it
    pub fn num_bloom_filter_entries(&self) -> usize {
        self.num_keys() * 2
    }

    pub fn bloom_filter(&self, size: usize, false_positive_rate: f64, tweak: u32) -> BloomFilter {
        let mut filter = BloomFilter::new(size, false_positive_rate, tweak, BloomUpdate::P2PubkeyOnly);
        for key in self.state.lock().ordered_keys() {
            filter.insert(&key.public_key().to_bytes());
            filter.insert(key.pubkey_hash().as_bytes());
        }
        filter
    }

    pub fn listeners(&self) -> &ListenerRegistry<KeyChainEvent> {
        &self.listeners
    }

    /// Listen for new keys, the handler runs on `executor`
    pub fn add_listener(
        &self,
        handler: EventHandler<KeyChainEvent>,
        executor: Arc<dyn Executor>,
    ) -> ListenerId {
        self.listeners.add(handler, executor)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    fn notify_keys_added(&self, keys: Vec<PublicKey>) {
        if !keys.is_empty() {
            self.listeners.broadcast(KeyChainEvent::KeysAdded(keys));
        }
    }

    /// An encrypted copy of this chain. The listeners are carried over.
    pub fn to_encrypted(
        &self,
        crypter: &KeyCrypter,
        aes_key: &SymmetricKey,
        rng: &mut (impl Rng + CryptoRng),
    ) -> KeyChainResult<BasicKeyChain> {
        ensure!(self.crypter.is_none(), KeyChainError::AlreadyEncrypted);

        let encrypted = BasicKeyChain::new(Some(crypter.clone()), self.time_getter.clone());
        {
            let state = self.state.lock();
            ensure!(
                state.keys.is_empty() || !state.is_watching,
                KeyChainError::CannotEncryptWatchingChain
            );
            let mut encrypted_state = encrypted.state.lock();
            for key in state.ordered_keys() {
                encrypted_state.insert(key.encrypt(crypter, aes_key, rng)?)?;
            }
        }
        encrypted.listeners.copy_from(&self.listeners);
        log::info!("Encrypted basic key chain");
        Ok(encrypted)
    }

    /// A decrypted copy of this chain. The listeners are carried over.
    pub fn to_decrypted(&self, aes_key: &SymmetricKey) -> KeyChainResult<BasicKeyChain> {
        ensure!(self.crypter.is_some(), KeyChainError::NotEncrypted);
        ensure!(
            self.num_keys() == 0 || self.check_aes_key(aes_key)?,
            KeyChainError::BadPassword
        );

        let decrypted = BasicKeyChain::new(None, self.time_getter.clone());
        {
            let state = self.state.lock();
            let mut decrypted_state = decrypted.state.lock();
            for key in state.ordered_keys() {
                decrypted_state.insert(key.decrypt(aes_key)?)?;
            }
        }
        decrypted.listeners.copy_from(&self.listeners);
        log::info!("Decrypted basic key chain");
        Ok(decrypted)
    }

    pub fn check_password(&self, password: &str) -> KeyChainResult<bool> {
        let crypter = self.crypter.as_ref().ok_or(KeyChainError::NotEncrypted)?;
        self.check_aes_key(&crypter.derive_key(password)?)
    }

    /// Whether `aes_key` decrypts the first encrypted key of the chain
    pub fn check_aes_key(&self, aes_key: &SymmetricKey) -> KeyChainResult<bool> {
        let state = self.state.lock();
        if state.keys.is_empty() {
            return Ok(false);
        }
        ensure!(self.crypter.is_some(), KeyChainError::NotEncrypted);

        let first = match state.ordered_keys().find(|key| key.is_encrypted()) {
            Some(key) => key,
            None => return Ok(false),
        };
        match first.decrypt(aes_key) {
            Ok(key) => Ok(key.public_key() == first.public_key()),
            Err(err) => {
                log::debug!("AES key check failed: {err}");
                Ok(false)
            }
        }
    }

    pub fn to_records(&self) -> Vec<KeyRecord> {
        self.state.lock().ordered_keys().map(key_to_record).collect()
    }

    /// Load the standalone keys of `records`, other records are skipped
    pub fn from_records_unencrypted(
        records: &[KeyRecord],
        time_getter: TimeGetter,
    ) -> KeyChainResult<BasicKeyChain> {
        Self::from_records(records, None, time_getter)
    }

    pub fn from_records_encrypted(
        records: &[KeyRecord],
        crypter: KeyCrypter,
        time_getter: TimeGetter,
    ) -> KeyChainResult<BasicKeyChain> {
        Self::from_records(records, Some(crypter), time_getter)
    }

    fn from_records(
        records: &[KeyRecord],
        crypter: Option<KeyCrypter>,
        time_getter: TimeGetter,
    ) -> KeyChainResult<BasicKeyChain> {
        let chain = BasicKeyChain::new(crypter, time_getter);
        {
            let mut state = chain.state.lock();
            for record in records {
                if let Some(key) = key_from_record(record, chain.crypter.as_ref())? {
                    state.insert(key)?;
                }
            }
        }
        Ok(chain)
    }
}

fn key_to_record(key: &WalletKey) -> KeyRecord {
    let mut record = match key.secret() {
        KeySecret::Encrypted { data, .. } => {
            let mut record = KeyRecord::new(KeyType::EncryptedAead);
            record.encrypted_data = Some(data.clone());
            record
        }
        KeySecret::Plain(private_key) => {
            let mut record = KeyRecord::new(KeyType::Original);
            record.secret_bytes = Some(private_key.to_bytes().to_vec());
            record
        }
        KeySecret::Absent => KeyRecord::new(KeyType::Original),
    };
    record.public_key = Some(key.public_key().to_bytes().to_vec());
    record.creation_timestamp_ms = Some(seconds_to_millis(key.creation_time()));
    record
}

fn key_from_record(
    record: &KeyRecord,
    crypter: Option<&KeyCrypter>,
) -> KeyChainResult<Option<WalletKey>> {
    let encrypted = match record.key_type {
        KeyType::Original => false,
        KeyType::EncryptedAead => true,
        KeyType::DeterministicMnemonic | KeyType::DeterministicKey => return Ok(None),
    };

    let public_key = record
        .public_key
        .as_ref()
        .ok_or_else(|| KeyChainError::UnreadableWallet("Public key missing".into()))?;
    let public_key = PublicKey::from_bytes(public_key)
        .map_err(|e| KeyChainError::UnreadableWallet(format!("Invalid public key: {e}")))?;
    let creation_time = millis_to_seconds(record.creation_timestamp_ms.unwrap_or(0));

    let key = if encrypted {
        let crypter = crypter.ok_or_else(|| {
            KeyChainError::UnreadableWallet("Encrypted key in an unencrypted wallet".into())
        })?;
        let data = record.encrypted_data.clone().ok_or_else(|| {
            KeyChainError::UnreadableWallet("Encrypted private key data missing".into())
        })?;
        WalletKey::from_encrypted(public_key, data, crypter.clone(), creation_time)
    } else {
        match &record.secret_bytes {
            Some(secret) => {
                let private_key = PrivateKey::from_bytes(secret).map_err(|e| {
                    KeyChainError::UnreadableWallet(format!("Invalid private key: {e}"))
                })?;
                ensure!(
                    private_key.public_key() == public_key,
                    KeyChainError::UnreadableWallet("Private key does not match public key".into())
                );
                WalletKey::from_private_key(private_key, creation_time)
            }
            None => WalletKey::watching(public_key, creation_time),
        }
    };
    Ok(Some(key))
}
