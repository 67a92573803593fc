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

//! BIP32 key chains. Keys are derived from a seed, an account key or a watching key, and handed
//! out from the external and internal branches below the account key. A window of unused keys,
//! the lookahead, is kept derived past the last issued key on each branch so that payments to
//! keys not handed out yet are recognized.

mod describe;
mod hierarchy;
mod married;
mod persistence;


use std::sync::Arc;

use common::address::PublicKeyHash;
use common::chain::ChainConfig;
use common::primitives::time::Seconds;
use crypto::key::extended::{ExtendedPrivateKey, ExtendedPublicKey};
use crypto::key::hdkd::{
    child_number::ChildNumber,
    derivable::{Derivable, DerivationError},
    derivation_path::DerivationPath,
    u31::U31,
};
use crypto::key::{PrivateKey, PublicKey};
use crypto::random::{CryptoRng, Rng};
use crypto::symkey::SymmetricKey;
use logging::log;
use parking_lot::Mutex;
use script::ScriptType;
use utils::bloom_filters::{BloomFilter, BloomUpdate};
use utils::ensure;
use utils::eventhandler::{EventHandler, Executor, ListenerId, ListenerRegistry};

use self::hierarchy::Hierarchy;
use self::married::Multisig;
use super::config::DEFAULT_LOOKAHEAD_SIZE;
use super::crypter::KeyCrypter;
use super::deterministic_key::DeterministicKey;
use super::deterministic_seed::{DeterministicSeed, DEFAULT_SEED_ENTROPY_BITS};
use super::with_purpose::{Branch, WithPurpose};
use super::{KeyChainError, KeyChainEvent, KeyChainResult, KeyPurpose};

/// The account path of chains built from a seed when no other path is given
pub const DEFAULT_ACCOUNT_PATH: [ChildNumber; 1] = [ChildNumber::ZERO_HARDENED];

/// Child indexes that produce invalid keys are skipped, this bounds how many in a row
const MAX_CHILD_DERIVATION_ATTEMPTS: u32 = 100;

/// Where the keys of a new chain come from
#[derive(Debug, Clone)]
pub enum ChainSource {
    Seed(DeterministicSeed),
    Entropy {
        entropy: Vec<u8>,
        passphrase: String,
        creation_time: Seconds,
    },
    Random {
        bits: usize,
        passphrase: String,
        creation_time: Seconds,
    },
    /// A watching chain of an account public key. Following chains are the cosigner chains of
    /// a married chain.
    WatchingKey {
        key: ExtendedPublicKey,
        creation_time: Seconds,
        following: bool,
    },
    /// A spending chain of an account private key, without a seed
    AccountKey {
        key: ExtendedPrivateKey,
        creation_time: Seconds,
    },
}

impl ChainSource {
    pub fn random(creation_time: Seconds) -> Self {
        Self::Random {
            bits: DEFAULT_SEED_ENTROPY_BITS,
            passphrase: String::new(),
            creation_time,
        }
    }

    pub fn watching(key: ExtendedPublicKey, creation_time: Seconds) -> Self {
        Self::WatchingKey {
            key,
            creation_time,
            following: false,
        }
    }

    /// A watching chain of a BIP32 serialized account public key. The account path of the key
    /// is taken to be a single child of the root.
    pub fn watching_from_base58(
        chain_config: &ChainConfig,
        encoded: &str,
        creation_time: Seconds,
    ) -> KeyChainResult<Self> {
        let key =
            ExtendedPublicKey::from_base58(encoded, chain_config.bip32_public_version(), None)?;
        Ok(Self::watching(key, creation_time))
    }

    /// A spending chain of a BIP32 serialized account private key
    pub fn spending_from_base58(
        chain_config: &ChainConfig,
        encoded: &str,
        creation_time: Seconds,
    ) -> KeyChainResult<Self> {
        let key =
            ExtendedPrivateKey::from_base58(encoded, chain_config.bip32_private_version(), None)?;
        Ok(Self::AccountKey { key, creation_time })
    }
}

/// The cosigners of a married chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigConfig {
    /// Account public keys of the cosigners, in the order their keys go into redeem scripts
    pub following_keys: Vec<ExtendedPublicKey>,
    /// Signatures needed to spend, a majority of all keys when not given
    pub threshold: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct DeterministicKeyChainConfig {
    source: ChainSource,
    output_script_type: ScriptType,
    account_path: Option<DerivationPath>,
    lookahead_size: u32,
    lookahead_threshold: Option<u32>,
    multisig: Option<MultisigConfig>,
}

impl DeterministicKeyChainConfig {
    pub fn new(source: ChainSource) -> Self {
        Self {
            source,
            output_script_type: ScriptType::P2pkh,
            account_path: None,
            lookahead_size: DEFAULT_LOOKAHEAD_SIZE,
            lookahead_threshold: None,
            multisig: None,
        }
    }

    pub fn with_output_script_type(mut self, output_script_type: ScriptType) -> Self {
        self.output_script_type = output_script_type;
        self
    }

    /// Only for chains built from a seed, other chains take the path of their account key
    pub fn with_account_path(mut self, account_path: DerivationPath) -> Self {
        self.account_path = Some(account_path);
        self
    }

    pub fn with_lookahead_size(mut self, lookahead_size: u32) -> Self {
        self.lookahead_size = lookahead_size;
        self
    }

    pub fn with_lookahead_threshold(mut self, lookahead_threshold: u32) -> Self {
        self.lookahead_threshold = Some(lookahead_threshold);
        self
    }

    pub fn with_multisig(mut self, multisig: MultisigConfig) -> Self {
        self.multisig = Some(multisig);
        self
    }
}

const fn default_lookahead_threshold(lookahead_size: u32) -> u32 {
    lookahead_size / 3
}

fn normal_child(index: u32) -> Result<ChildNumber, DerivationError> {
    U31::from_u32(index)
        .map(ChildNumber::from_normal)
        .ok_or(DerivationError::InvalidChildNumber(index))
}

/// Derive the child at `*next`, moving on to the following index while the derived key is invalid
fn derive_this_or_next(
    parent: &DeterministicKey,
    next: &mut u32,
) -> KeyChainResult<DeterministicKey> {
    for _ in 0..MAX_CHILD_DERIVATION_ATTEMPTS {
        let index = *next;
        *next = index.checked_add(1).ok_or(DerivationError::InvalidChildNumber(index))?;
        match parent.derive_child(normal_child(index)?) {
            Ok(key) => return Ok(key),
            Err(DerivationError::KeyDerivationError) => {
                log::warn!("Skipping child {index} of {}, it is not a valid key", parent.path())
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(DerivationError::KeyDerivationError.into())
}

/// Rederive `key` from its parent to catch memory corruption before the key is handed out
fn check_for_bit_flip(parent: &DeterministicKey, key: &DeterministicKey) -> KeyChainResult<()> {
    let num = key.child_number().ok_or_else(|| KeyChainError::BitFlipDetected(key.path().clone()))?;
    let rederived = parent.extended_public_key().clone().derive_child(num)?;
    ensure!(
        rederived.public_key() == key.public_key(),
        KeyChainError::BitFlipDetected(key.path().clone())
    );
    Ok(())
}

#[derive(Debug, Clone)]
struct ChainState {
    seed: Option<DeterministicSeed>,

    /// Set if the private material of the chain is encrypted
    crypter: Option<KeyCrypter>,

    output_script_type: ScriptType,

    account_path: DerivationPath,

    /// The parents of the external and internal leaf keys
    branch_paths: WithPurpose<DerivationPath>,

    hierarchy: Hierarchy,

    /// Number of keys handed out per branch
    issued: WithPurpose<u32>,

    lookahead_size: u32,

    lookahead_threshold: u32,

    /// Bumped every time the lookahead adds keys
    lookahead_epoch: u32,

    is_following: bool,

    sigs_required_to_spend: u32,

    multisig: Option<Multisig>,

    /// Keys added since the listeners were last notified
    pending_added: Vec<PublicKey>,
}

impl ChainState {
    fn empty(account_path: DerivationPath, output_script_type: ScriptType) -> KeyChainResult<Self> {
        ensure!(
            matches!(output_script_type, ScriptType::P2pkh | ScriptType::P2wpkh),
            KeyChainError::IllegalArgument(format!(
                "Unsupported output script type for a key chain: {output_script_type}"
            ))
        );
        let branch_paths = WithPurpose::new(
            account_path.child(Branch::External.child_number())?,
            account_path.child(Branch::Internal.child_number())?,
        );
        Ok(Self {
            seed: None,
            crypter: None,
            output_script_type,
            account_path,
            branch_paths,
            hierarchy: Hierarchy::default(),
            issued: WithPurpose::default(),
            lookahead_size: DEFAULT_LOOKAHEAD_SIZE,
            lookahead_threshold: default_lookahead_threshold(DEFAULT_LOOKAHEAD_SIZE),
            lookahead_epoch: 0,
            is_following: false,
            sigs_required_to_spend: 1,
            multisig: None,
            pending_added: Vec::new(),
        })
    }

    fn from_seed(
        seed: DeterministicSeed,
        account_path: DerivationPath,
        output_script_type: ScriptType,
    ) -> KeyChainResult<Self> {
        let mut state = Self::empty(account_path, output_script_type)?;

        let mut account = DeterministicKey::from_private(seed.master_key()?, seed.creation_time());
        for num in state.account_path.as_slice() {
            state.hierarchy.put(account.clone());
            account = account.derive_child(*num)?;
        }
        state.add_account_key(account)?;
        state.seed = Some(seed);
        Ok(state)
    }

    fn from_account_key(
        account: DeterministicKey,
        output_script_type: ScriptType,
    ) -> KeyChainResult<Self> {
        let mut state = Self::empty(account.path().clone(), output_script_type)?;
        state.add_account_key(account)?;
        Ok(state)
    }

    /// Add the account key and the two branch parents below it
    fn add_account_key(&mut self, account: DeterministicKey) -> KeyChainResult<()> {
        let parents = Branch::ALL
            .into_iter()
            .map(|branch| account.derive_child(branch.child_number()))
            .collect::<Result<Vec<_>, _>>()?;
        self.hierarchy.put(account);
        for parent in parents {
            self.hierarchy.put(parent);
        }
        Ok(())
    }

    fn account_key(&self) -> KeyChainResult<&DeterministicKey> {
        self.key_at(&self.account_path)
    }

    fn key_at(&self, path: &DerivationPath) -> KeyChainResult<&DeterministicKey> {
        self.hierarchy
            .get(path)
            .ok_or_else(|| KeyChainError::KeyNotFound(path.clone()))
    }

    /// The branch and child index of `path` if it is a leaf of this chain
    fn leaf_position(&self, path: &DerivationPath) -> Option<(Branch, u32)> {
        let parent = path.parent()?;
        let branch = Branch::ALL
            .into_iter()
            .find(|branch| *self.branch_paths.get_for(*branch) == parent)?;
        Some((branch, path.last()?.get_index().into_u32()))
    }

    fn is_leaf(&self, key: &DeterministicKey) -> bool {
        self.leaf_position(key.path()).is_some()
    }

    fn leaf_keys(&self) -> impl Iterator<Item = &DeterministicKey> + '_ {
        self.hierarchy.iter().filter(|key| self.is_leaf(key))
    }

    fn set_lookahead_size(&mut self, lookahead_size: u32) {
        let readjust_threshold =
            self.lookahead_threshold == default_lookahead_threshold(self.lookahead_size);
        self.lookahead_size = lookahead_size;
        if readjust_threshold {
            self.lookahead_threshold = default_lookahead_threshold(lookahead_size);
        }
    }

    fn set_lookahead_threshold(&mut self, lookahead_threshold: u32) -> KeyChainResult<()> {
        ensure!(
            lookahead_threshold < self.lookahead_size,
            KeyChainError::LookaheadThresholdTooLarge {
                threshold: lookahead_threshold,
                size: self.lookahead_size,
            }
        );
        self.lookahead_threshold = lookahead_threshold;
        Ok(())
    }

    fn effective_lookahead_threshold(&self) -> u32 {
        if self.lookahead_threshold >= self.lookahead_size {
            0
        } else {
            self.lookahead_threshold
        }
    }

    /// Top up the lookahead of both branches
    fn look_ahead(&mut self) -> KeyChainResult<()> {
        let mut added = Vec::new();
        for branch in Branch::ALL {
            self.look_ahead_branch(branch, &mut added)?;
        }
        if !added.is_empty() {
            self.lookahead_epoch = self.lookahead_epoch.wrapping_add(1);
            self.pending_added.extend(added);
        }
        Ok(())
    }

    /// Nothing is derived until more than `threshold` keys are missing, so the lookahead grows
    /// in batches instead of one key per issued key
    fn look_ahead_branch(&mut self, branch: Branch, added: &mut Vec<PublicKey>) -> KeyChainResult<()> {
        let threshold = self.effective_lookahead_threshold();
        let parent_path = self.branch_paths.get_for(branch).clone();
        let issued = *self.issued.get_for(branch);
        let num_children = self.hierarchy.num_children(&parent_path);
        let needed = issued
            .saturating_add(self.lookahead_size)
            .saturating_add(threshold)
            .saturating_sub(num_children);
        if needed <= threshold {
            return Ok(());
        }

        log::debug!(
            "{needed} keys needed for {parent_path} = {issued} issued + {} lookahead size + {threshold} lookahead threshold - {num_children} num children",
            self.lookahead_size,
        );

        let parent = self.key_at(&parent_path)?.drop_private_bytes();
        let mut next = num_children;
        for _ in 0..needed {
            let key = derive_this_or_next(&parent, &mut next)?;
            added.push(key.public_key().clone());
            self.hierarchy.put(key);
        }
        Ok(())
    }

    /// Issue the next `count` keys of the branch of `purpose`. A married chain issues the same
    /// indexes on every following chain, and nothing is issued unless all of them are in step.
    fn issue_keys(&mut self, purpose: KeyPurpose, count: u32) -> KeyChainResult<Vec<DeterministicKey>> {
        ensure!(
            count > 0,
            KeyChainError::IllegalArgument("Number of keys must be positive".into())
        );
        let branch = purpose.branch();
        let start = *self.issued.get_for(branch);
        let end = start
            .checked_add(count)
            .ok_or_else(|| KeyChainError::IllegalArgument("Too many keys requested".into()))?;
        if let Some(multisig) = &self.multisig {
            for following in &multisig.following {
                ensure!(
                    following.issued_keys(branch) == start,
                    KeyChainError::FollowingChainsOutOfSync
                );
            }
        }

        *self.issued.mut_for(branch) = end;
        self.look_ahead()?;

        let parent = self.key_at(self.branch_paths.get_for(branch))?;
        let keys = (start..end)
            .map(|index| {
                let path = parent.path().child(normal_child(index)?)?;
                let key = self.key_at(&path)?;
                check_for_bit_flip(parent, key)?;
                Ok(key.clone())
            })
            .collect::<KeyChainResult<Vec<_>>>()?;

        if let Some(multisig) = &self.multisig {
            for following in &multisig.following {
                let following_keys = following.get_keys(purpose, count)?;
                ensure!(
                    following_keys.iter().map(DeterministicKey::child_number).eq(keys
                        .iter()
                        .map(DeterministicKey::child_number)),
                    KeyChainError::FollowingChainsOutOfSync
                );
            }
        }
        Ok(keys)
    }

    /// Mark the leaf at `index` of `branch` as used, following chains included. Issued keys are
    /// never taken back.
    fn mark_leaf_used(&mut self, branch: Branch, index: u32) -> KeyChainResult<()> {
        let num_used = index.saturating_add(1);
        let issued = self.issued.mut_for(branch);
        if *issued < num_used {
            *issued = num_used;
            self.look_ahead()?;
        }
        if let Some(multisig) = &self.multisig {
            for following in &multisig.following {
                following.mark_leaf_as_used(branch, index)?;
            }
        }
        Ok(())
    }

    fn mark_key_used(&mut self, key: &DeterministicKey) -> KeyChainResult<()> {
        match self.leaf_position(key.path()) {
            Some((branch, index)) => self.mark_leaf_used(branch, index),
            None => Ok(()),
        }
    }

    fn earliest_key_creation_time(&self) -> KeyChainResult<Seconds> {
        match &self.seed {
            Some(seed) => Ok(seed.creation_time()),
            None => Ok(self.account_key()?.creation_time()),
        }
    }
}

/// A hierarchy of keys derived from one account key
pub struct DeterministicKeyChain {
    state: Mutex<ChainState>,

    listeners: ListenerRegistry<KeyChainEvent>,
}

impl DeterministicKeyChain {
    pub fn new(
        config: DeterministicKeyChainConfig,
        rng: &mut (impl Rng + CryptoRng),
    ) -> KeyChainResult<Self> {
        let DeterministicKeyChainConfig {
            source,
            output_script_type,
            account_path,
            lookahead_size,
            lookahead_threshold,
            multisig,
        } = config;

        let seed_account_path = || -> Result<DerivationPath, DerivationError> {
            match &account_path {
                Some(path) => Ok(path.clone()),
                None => DerivationPath::try_from(DEFAULT_ACCOUNT_PATH.to_vec()),
            }
        };
        let check_key_path = |key_path: &DerivationPath| match &account_path {
            Some(path) if path != key_path => Err(KeyChainError::IllegalArgument(format!(
                "Account path {path} does not match the account key path {key_path}"
            ))),
            _ => Ok(()),
        };

        let mut state = match source {
            ChainSource::Seed(seed) => {
                ensure!(
                    !seed.is_encrypted(),
                    KeyChainError::IllegalArgument(
                        "Cannot build a key chain from an encrypted seed".into()
                    )
                );
                ChainState::from_seed(seed, seed_account_path()?, output_script_type)?
            }
            ChainSource::Entropy {
                entropy,
                passphrase,
                creation_time,
            } => {
                let seed = DeterministicSeed::from_entropy(&entropy, &passphrase, creation_time)?;
                ChainState::from_seed(seed, seed_account_path()?, output_script_type)?
            }
            ChainSource::Random {
                bits,
                passphrase,
                creation_time,
            } => {
                let seed = DeterministicSeed::from_random(rng, bits, &passphrase, creation_time)?;
                ChainState::from_seed(seed, seed_account_path()?, output_script_type)?
            }
            ChainSource::WatchingKey {
                key,
                creation_time,
                following,
            } => {
                check_key_path(key.get_derivation_path())?;
                let account = DeterministicKey::from_public(key, creation_time);
                let mut state = ChainState::from_account_key(account, output_script_type)?;
                state.is_following = following;
                state
            }
            ChainSource::AccountKey { key, creation_time } => {
                check_key_path(key.get_derivation_path())?;
                let account = DeterministicKey::from_private(key, creation_time);
                ChainState::from_account_key(account, output_script_type)?
            }
        };

        state.set_lookahead_size(lookahead_size);
        if let Some(threshold) = lookahead_threshold {
            state.set_lookahead_threshold(threshold)?;
        }
        state.look_ahead()?;
        // Nobody can listen to a chain that is still being built
        state.pending_added.clear();

        let chain = Self::from_state(state);
        if let Some(MultisigConfig {
            following_keys,
            threshold,
        }) = multisig
        {
            chain.add_following_account_keys(following_keys, threshold)?;
        }
        Ok(chain)
    }

    fn from_state(state: ChainState) -> Self {
        Self {
            state: Mutex::new(state),
            listeners: ListenerRegistry::new(),
        }
    }

    /// Run `f` on the state, then tell the listeners about the keys it added
    fn with_state<R>(&self, f: impl FnOnce(&mut ChainState) -> R) -> R {
        let (result, added) = {
            let mut state = self.state.lock();
            let result = f(&mut state);
            (result, std::mem::take(&mut state.pending_added))
        };
        if !added.is_empty() {
            self.listeners.broadcast(KeyChainEvent::KeysAdded(added));
        }
        result
    }

    /// Hand out the next key for `purpose`. The key counts as issued from now on.
    pub fn get_key(&self, purpose: KeyPurpose) -> KeyChainResult<DeterministicKey> {
        let mut keys = self.get_keys(purpose, 1)?;
        keys.pop().ok_or(KeyChainError::KeyNotFound(DerivationPath::empty()))
    }

    pub fn get_keys(&self, purpose: KeyPurpose, count: u32) -> KeyChainResult<Vec<DeterministicKey>> {
        self.with_state(|state| state.issue_keys(purpose, count))
    }

    /// Mark the key as used, which issues it and every key before it on its branch
    pub fn mark_key_as_used(&self, key: &DeterministicKey) -> KeyChainResult<()> {
        self.with_state(|state| state.mark_key_used(key))
    }

    pub fn mark_pub_hash_as_used(
        &self,
        hash: &PublicKeyHash,
    ) -> KeyChainResult<Option<DeterministicKey>> {
        self.with_state(|state| {
            let key = state.hierarchy.find_by_pubkey_hash(hash).cloned();
            if let Some(key) = &key {
                state.mark_key_used(key)?;
            }
            Ok(key)
        })
    }

    pub fn mark_pub_key_as_used(
        &self,
        public_key: &PublicKey,
    ) -> KeyChainResult<Option<DeterministicKey>> {
        self.with_state(|state| {
            let key = state.hierarchy.find_by_public_key(public_key).cloned();
            if let Some(key) = &key {
                state.mark_key_used(key)?;
            }
            Ok(key)
        })
    }

    /// Used to keep following chains in step with the chain they follow
    fn mark_leaf_as_used(&self, branch: Branch, index: u32) -> KeyChainResult<()> {
        self.with_state(|state| state.mark_leaf_used(branch, index))
    }

    pub fn find_key_from_pub_hash(&self, hash: &PublicKeyHash) -> Option<DeterministicKey> {
        self.state.lock().hierarchy.find_by_pubkey_hash(hash).cloned()
    }

    pub fn find_key_from_pub_key(&self, public_key: &PublicKey) -> Option<DeterministicKey> {
        self.state.lock().hierarchy.find_by_public_key(public_key).cloned()
    }

    pub fn has_key(&self, public_key: &PublicKey) -> bool {
        self.state.lock().hierarchy.find_by_public_key(public_key).is_some()
    }

    pub fn key_by_path(&self, path: &DerivationPath) -> Option<DeterministicKey> {
        self.state.lock().hierarchy.get(path).cloned()
    }

    /// The account key, without its private material
    pub fn watching_key(&self) -> KeyChainResult<DeterministicKey> {
        Ok(self.state.lock().account_key()?.drop_private_bytes())
    }

    /// A watching chain only has public keys
    pub fn is_watching(&self) -> bool {
        self.state
            .lock()
            .account_key()
            .map_or(true, DeterministicKey::is_watching)
    }

    pub fn seed(&self) -> Option<DeterministicSeed> {
        self.state.lock().seed.clone()
    }

    pub fn account_path(&self) -> DerivationPath {
        self.state.lock().account_path.clone()
    }

    pub fn output_script_type(&self) -> ScriptType {
        self.state.lock().output_script_type
    }

    pub fn is_following(&self) -> bool {
        self.state.lock().is_following
    }

    pub fn crypter(&self) -> Option<KeyCrypter> {
        self.state.lock().crypter.clone()
    }

    pub fn is_encrypted(&self) -> bool {
        self.state.lock().crypter.is_some()
    }

    /// Number of keys in the hierarchy, after topping up the lookahead
    pub fn num_keys(&self) -> KeyChainResult<usize> {
        self.with_state(|state| {
            state.look_ahead()?;
            Ok(state.hierarchy.len())
        })
    }

    pub fn num_leaf_keys_issued(&self) -> u32 {
        let state = self.state.lock();
        state.issued.external + state.issued.internal
    }

    pub fn issued_external_keys(&self) -> u32 {
        self.state.lock().issued.external
    }

    pub fn issued_internal_keys(&self) -> u32 {
        self.state.lock().issued.internal
    }

    fn issued_keys(&self, branch: Branch) -> u32 {
        *self.state.lock().issued.get_for(branch)
    }

    /// The last key handed out on `branch`
    pub fn last_issued_key(&self, branch: Branch) -> KeyChainResult<Option<DeterministicKey>> {
        let state = self.state.lock();
        match state.issued.get_for(branch).checked_sub(1) {
            Some(index) => {
                let path = state.branch_paths.get_for(branch).child(normal_child(index)?)?;
                Ok(Some(state.key_at(&path)?.clone()))
            }
            None => Ok(None),
        }
    }

    /// Keys of the hierarchy. Leaf keys beyond the issued ones are only included with
    /// `include_lookahead`, keys that are not leaves only with `include_parents`.
    pub fn keys(&self, include_lookahead: bool, include_parents: bool) -> Vec<DeterministicKey> {
        let state = self.state.lock();
        state
            .hierarchy
            .iter()
            .filter(|key| match state.leaf_position(key.path()) {
                Some((branch, index)) => include_lookahead || index < *state.issued.get_for(branch),
                None => include_parents,
            })
            .cloned()
            .collect()
    }

    /// Every leaf key, lookahead included
    pub fn leaf_keys(&self) -> Vec<DeterministicKey> {
        self.keys(true, false)
    }

    pub fn issued_receive_keys(&self) -> Vec<DeterministicKey> {
        let state = self.state.lock();
        state
            .leaf_keys()
            .filter(|key| {
                state.leaf_position(key.path()).is_some_and(|(branch, index)| {
                    branch == Branch::External && index < state.issued.external
                })
            })
            .cloned()
            .collect()
    }

    /// The creation time of the seed, or of the account key if there is no seed
    pub fn earliest_key_creation_time(&self) -> KeyChainResult<Seconds> {
        self.state.lock().earliest_key_creation_time()
    }

    pub fn lookahead_size(&self) -> u32 {
        self.state.lock().lookahead_size
    }

    /// A threshold following the default also follows the new size. Following chains are
    /// updated too.
    pub fn set_lookahead_size(&self, lookahead_size: u32) {
        let mut state = self.state.lock();
        state.set_lookahead_size(lookahead_size);
        if let Some(multisig) = &state.multisig {
            for following in &multisig.following {
                following.set_lookahead_size(lookahead_size);
            }
        }
    }

    /// Zero if the stored threshold is not below the lookahead size
    pub fn lookahead_threshold(&self) -> u32 {
        self.state.lock().effective_lookahead_threshold()
    }

    pub fn set_lookahead_threshold(&self, lookahead_threshold: u32) -> KeyChainResult<()> {
        let mut state = self.state.lock();
        state.set_lookahead_threshold(lookahead_threshold)?;
        if let Some(multisig) = &state.multisig {
            for following in &multisig.following {
                following.set_lookahead_threshold(lookahead_threshold)?;
            }
        }
        Ok(())
    }

    /// Derive lookahead keys if enough of them were used up
    pub fn maybe_look_ahead(&self) -> KeyChainResult<()> {
        self.with_state(ChainState::look_ahead)
    }

    /// Changes whenever the lookahead derives new keys, so cached filters can be refreshed
    pub fn key_lookahead_epoch(&self) -> u32 {
        self.state.lock().lookahead_epoch
    }

    /// The private key at `path`, derived from the closest ancestor that has private material
    pub fn private_key_for(
        &self,
        path: &DerivationPath,
        aes_key: Option<&SymmetricKey>,
    ) -> KeyChainResult<PrivateKey> {
        let state = self.state.lock();
        state.key_at(path)?;

        let mut ancestor_path = path.clone();
        loop {
            if let Some(ancestor) = state.hierarchy.get(&ancestor_path) {
                if !ancestor.secret().is_absent() {
                    let xpriv = ancestor.decrypted_extended_private_key(aes_key)?;
                    return Ok(xpriv.derive_absolute_path(path)?.private_key().clone());
                }
            }
            ancestor_path = ancestor_path.parent().ok_or(KeyChainError::MissingPrivateKey)?;
        }
    }

    pub fn num_bloom_filter_entries(&self) -> KeyChainResult<usize> {
        if self.is_married() {
            return self.num_married_bloom_filter_entries();
        }
        self.num_keys().map(|num_keys| num_keys * 2)
    }

    /// A filter matching every key of the chain, or every script of a married chain
    pub fn bloom_filter(
        &self,
        size: usize,
        false_positive_rate: f64,
        tweak: u32,
    ) -> KeyChainResult<BloomFilter> {
        if self.is_married() {
            return self.married_bloom_filter(size, false_positive_rate, tweak);
        }
        self.with_state(|state| {
            state.look_ahead()?;
            let entries = state.hierarchy.len() * 2;
            ensure!(
                size >= entries,
                KeyChainError::IllegalArgument(format!(
                    "Bloom filter size {size} is below the {entries} entries of the chain"
                ))
            );
            let mut filter =
                BloomFilter::new(size, false_positive_rate, tweak, BloomUpdate::P2PubkeyOnly);
            for key in state.hierarchy.iter() {
                filter.insert(&key.public_key().to_bytes());
                filter.insert(key.pubkey_hash().as_bytes());
            }
            Ok(filter)
        })
    }

    /// An encrypted copy of this chain. The seed and the keys above the leaves are encrypted,
    /// leaf keys never have private material. Listeners are carried over.
    pub fn to_encrypted(
        &self,
        crypter: &KeyCrypter,
        aes_key: &SymmetricKey,
        rng: &mut (impl Rng + CryptoRng),
    ) -> KeyChainResult<DeterministicKeyChain> {
        let encrypted_state = {
            let state = self.state.lock();
            ensure!(state.crypter.is_none(), KeyChainError::AlreadyEncrypted);
            ensure!(
                !state.account_key()?.is_watching(),
                KeyChainError::CannotEncryptWatchingChain
            );

            let mut encrypted = state.clone();
            encrypted.seed = state
                .seed
                .as_ref()
                .map(|seed| seed.encrypt(crypter, aes_key, rng))
                .transpose()?;
            encrypted.hierarchy = state.hierarchy.try_map(|key| key.encrypt(crypter, aes_key, rng))?;
            encrypted.crypter = Some(crypter.clone());
            encrypted
        };

        let chain = Self::from_state(encrypted_state);
        chain.listeners.copy_from(&self.listeners);
        log::info!("Encrypted deterministic key chain {}", chain.account_path());
        Ok(chain)
    }

    /// A decrypted copy of this chain. Listeners are carried over.
    pub fn to_decrypted(&self, aes_key: &SymmetricKey) -> KeyChainResult<DeterministicKeyChain> {
        ensure!(self.is_encrypted(), KeyChainError::NotEncrypted);
        ensure!(self.check_aes_key(aes_key)?, KeyChainError::BadPassword);

        let decrypted_state = {
            let state = self.state.lock();
            let mut decrypted = state.clone();
            decrypted.seed = state.seed.as_ref().map(|seed| seed.decrypt(aes_key)).transpose()?;
            decrypted.hierarchy = state.hierarchy.try_map(|key| {
                if key.is_encrypted() {
                    key.decrypt(aes_key)
                } else {
                    Ok(key.clone())
                }
            })?;
            decrypted.crypter = None;

            // The seed must lead to the same account, or the key decrypted it into garbage
            if let Some(seed) = &decrypted.seed {
                let account = seed.master_key()?.derive_absolute_path(&decrypted.account_path)?;
                ensure!(
                    account.to_public_key().public_key() == decrypted.account_key()?.public_key(),
                    KeyChainError::BadPassword
                );
            }
            decrypted
        };

        let chain = Self::from_state(decrypted_state);
        chain.listeners.copy_from(&self.listeners);
        log::info!("Decrypted deterministic key chain {}", chain.account_path());
        Ok(chain)
    }

    pub fn check_password(&self, password: &str) -> KeyChainResult<bool> {
        let crypter = self.crypter().ok_or(KeyChainError::NotEncrypted)?;
        self.check_aes_key(&crypter.derive_key(password)?)
    }

    /// Whether `aes_key` decrypts the first encrypted key of the chain
    pub fn check_aes_key(&self, aes_key: &SymmetricKey) -> KeyChainResult<bool> {
        let state = self.state.lock();
        ensure!(state.crypter.is_some(), KeyChainError::NotEncrypted);

        let first = match state.hierarchy.iter().find(|key| key.is_encrypted()) {
            Some(key) => key,
            None => return Ok(false),
        };
        match first.decrypt(aes_key) {
            Ok(_) => Ok(true),
            Err(err) => {
                log::debug!("AES key check failed: {err}");
                Ok(false)
            }
        }
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
}

impl std::fmt::Debug for DeterministicKeyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DeterministicKeyChain")
            .field("account_path", &state.account_path)
            .field("output_script_type", &state.output_script_type)
            .field("issued", &state.issued)
            .field("num_keys", &state.hierarchy.len())
            .field("is_following", &state.is_following)
            .field("is_encrypted", &state.crypter.is_some())
            .finish()
    }
}
