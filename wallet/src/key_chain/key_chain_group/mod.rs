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


//! A group of key chains acting as the key bag of one wallet: one basic chain holding the
//! standalone keys, and any number of deterministic chains of which the last one is active.
//! Keys and addresses are handed out from the active chain.

mod upgrade;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::address::{Address, PublicKeyHash, ScriptHash};
use common::chain::{ChainConfig, Destination};
use common::primitives::time::Seconds;
use crypto::key::{PrivateKey, PublicKey};
use crypto::random::{CryptoRng, Rng};
use crypto::symkey::SymmetricKey;
use logging::log;
use script::ScriptType;
use utils::bloom_filters::{BloomFilter, BloomUpdate};
use utils::ensure;
use utils::eventhandler::{EventHandler, Executor, ListenerId};

use super::basic_key_chain::{BasicKeyChain, WatchingState};
use super::config::KeyChainConfig;
use super::crypter::KeyCrypter;
use super::deterministic_key::DeterministicKey;
use super::deterministic_key_chain::{ChainSource, DeterministicKeyChain};
use super::deterministic_seed::{DeterministicSeed, DEFAULT_SEED_ENTROPY_BITS};
use super::records::KeyRecord;
use super::redeem_data::RedeemData;
use super::wallet_key::WalletKey;
use super::with_purpose::Branch;
use super::{FoundKey, KeyChainError, KeyChainEvent, KeyChainResult, KeyPurpose};

pub struct KeyChainGroup {
    chain_config: Arc<ChainConfig>,

    config: KeyChainConfig,

    basic: BasicKeyChain,

    /// `None` if no deterministic chains are supported, the last chain is the active one
    chains: Option<Vec<Arc<DeterministicKeyChain>>>,

    /// The keys handed out by `current_key`, used by chains that are not married
    current_keys: BTreeMap<KeyPurpose, DeterministicKey>,

    /// The P2SH addresses handed out by a married active chain
    current_addresses: BTreeMap<KeyPurpose, Address>,

    crypter: Option<KeyCrypter>,

    /// Lookahead settings forced on every chain of the group
    lookahead_size: Option<u32>,
    lookahead_threshold: Option<u32>,
}

/// Builds a [KeyChainGroup] from a seed, random entropy or ready chains
pub struct KeyChainGroupBuilder {
    chain_config: Arc<ChainConfig>,
    config: KeyChainConfig,
    chains: Vec<DeterministicKeyChain>,
    lookahead_size: Option<u32>,
    lookahead_threshold: Option<u32>,
}

impl KeyChainGroupBuilder {
    pub fn new(chain_config: Arc<ChainConfig>, config: KeyChainConfig) -> Self {
        Self {
            chain_config,
            config,
            chains: Vec::new(),
            lookahead_size: None,
            lookahead_threshold: None,
        }
    }

    /// Chains from a new random seed, see [Self::from_seed]
    pub fn from_random(
        self,
        output_script_type: ScriptType,
        rng: &mut (impl Rng + CryptoRng),
    ) -> KeyChainResult<Self> {
        let creation_time = self.config.time_getter().get_time_secs();
        let seed = DeterministicSeed::from_random(rng, DEFAULT_SEED_ENTROPY_BITS, "", creation_time)?;
        self.from_seed(seed, output_script_type, rng)
    }

    /// Replace the chains with chains of `seed`. For P2PKH that is a single P2PKH chain. For
    /// P2WPKH a P2PKH chain comes first and the P2WPKH chain after it is the active one.
    pub fn from_seed(
        mut self,
        seed: DeterministicSeed,
        output_script_type: ScriptType,
        rng: &mut (impl Rng + CryptoRng),
    ) -> KeyChainResult<Self> {
        let script_types: &[ScriptType] = match output_script_type {
            ScriptType::P2pkh => &[ScriptType::P2pkh],
            ScriptType::P2wpkh => &[ScriptType::P2pkh, ScriptType::P2wpkh],
            ScriptType::P2sh => {
                return Err(KeyChainError::IllegalArgument(format!(
                    "Cannot build a group of {output_script_type} chains from a seed"
                )))
            }
        };

        let chains = script_types
            .iter()
            .map(|&script_type| {
                let account_path = self
                    .config
                    .structure()
                    .account_path_for(script_type, &self.chain_config)?;
                let config = self.config.new_chain_config(
                    ChainSource::Seed(seed.clone()),
                    script_type,
                    account_path,
                );
                DeterministicKeyChain::new(config, rng)
            })
            .collect::<KeyChainResult<Vec<_>>>()?;
        self.chains = chains;
        Ok(self)
    }

    pub fn add_chain(mut self, chain: DeterministicKeyChain) -> Self {
        self.chains.push(chain);
        self
    }

    pub fn chains(mut self, chains: Vec<DeterministicKeyChain>) -> Self {
        self.chains = chains;
        self
    }

    /// Lookahead size of every chain of the group, including chains added later
    pub fn lookahead_size(mut self, lookahead_size: u32) -> Self {
        self.lookahead_size = Some(lookahead_size);
        self
    }

    pub fn lookahead_threshold(mut self, lookahead_threshold: u32) -> Self {
        self.lookahead_threshold = Some(lookahead_threshold);
        self
    }

    pub fn build(self) -> KeyChainResult<KeyChainGroup> {
        let basic = BasicKeyChain::new(None, self.config.time_getter().clone());
        KeyChainGroup::new(
            self.chain_config,
            self.config,
            basic,
            Some(self.chains.into_iter().map(Arc::new).collect()),
            self.lookahead_size,
            self.lookahead_threshold,
            BTreeMap::new(),
            None,
        )
    }
}

impl KeyChainGroup {
    #[allow(clippy::too_many_arguments)]
    fn new(
        chain_config: Arc<ChainConfig>,
        config: KeyChainConfig,
        basic: BasicKeyChain,
        chains: Option<Vec<Arc<DeterministicKeyChain>>>,
        lookahead_size: Option<u32>,
        lookahead_threshold: Option<u32>,
        current_keys: BTreeMap<KeyPurpose, DeterministicKey>,
        crypter: Option<KeyCrypter>,
    ) -> KeyChainResult<Self> {
        let mut group = Self {
            chain_config,
            config,
            basic,
            chains,
            current_keys,
            current_addresses: BTreeMap::new(),
            crypter,
            lookahead_size,
            lookahead_threshold,
        };

        for chain in group.chains() {
            group.apply_lookahead(chain)?;
        }

        if group.is_married() {
            group.maybe_look_ahead_scripts()?;
            let active = group.active_key_chain()?;
            let current_addresses = group
                .current_keys
                .iter()
                .map(|(purpose, key)| {
                    let redeem_data = active.redeem_data(key)?;
                    let address =
                        Address::from_redeem_script(&group.chain_config, redeem_data.redeem_script())?;
                    Ok((*purpose, address))
                })
                .collect::<KeyChainResult<_>>()?;
            group.current_addresses = current_addresses;
        }
        Ok(group)
    }

    pub fn builder(chain_config: Arc<ChainConfig>, config: KeyChainConfig) -> KeyChainGroupBuilder {
        KeyChainGroupBuilder::new(chain_config, config)
    }

    /// A group of one chain from a random seed, of the output script type of `config`
    pub fn new_random(
        chain_config: Arc<ChainConfig>,
        config: KeyChainConfig,
        rng: &mut (impl Rng + CryptoRng),
    ) -> KeyChainResult<Self> {
        let output_script_type = config.output_script_type();
        Self::builder(chain_config, config).from_random(output_script_type, rng)?.build()
    }

    /// A group of standalone keys only, which never gets deterministic chains
    pub fn create_basic(chain_config: Arc<ChainConfig>, config: KeyChainConfig) -> Self {
        let basic = BasicKeyChain::new(None, config.time_getter().clone());
        Self {
            chain_config,
            config,
            basic,
            chains: None,
            current_keys: BTreeMap::new(),
            current_addresses: BTreeMap::new(),
            crypter: None,
            lookahead_size: None,
            lookahead_threshold: None,
        }
    }

    pub fn chain_config(&self) -> &Arc<ChainConfig> {
        &self.chain_config
    }

    pub fn supports_deterministic_chains(&self) -> bool {
        self.chains.is_some()
    }

    fn chains(&self) -> &[Arc<DeterministicKeyChain>] {
        self.chains.as_deref().unwrap_or_default()
    }

    fn apply_lookahead(&self, chain: &DeterministicKeyChain) -> KeyChainResult<()> {
        if let Some(lookahead_size) = self.lookahead_size {
            chain.set_lookahead_size(lookahead_size);
        }
        if let Some(lookahead_threshold) = self.lookahead_threshold {
            chain.set_lookahead_threshold(lookahead_threshold)?;
        }
        Ok(())
    }

    /// Keep the redeem scripts of married chains in step with their lookahead
    fn maybe_look_ahead_scripts(&self) -> KeyChainResult<()> {
        for chain in self.chains() {
            chain.maybe_look_ahead_scripts()?;
        }
        Ok(())
    }

    /// Add `chain` and make it the active one. The listeners and the lookahead settings of the
    /// group are applied to it.
    pub fn add_and_activate_hd_chain(&mut self, chain: Arc<DeterministicKeyChain>) -> KeyChainResult<()> {
        ensure!(
            self.supports_deterministic_chains(),
            KeyChainError::DeterministicChainsUnsupported
        );
        log::info!("Activating a new HD chain: {chain:?}");

        chain.listeners().copy_from(self.basic.listeners());
        self.apply_lookahead(&chain)?;
        if let Some(chains) = &mut self.chains {
            chains.push(chain);
        }
        self.current_keys.clear();
        self.current_addresses.clear();
        Ok(())
    }

    /// A key not seen in a transaction yet. The same key is returned until it is marked as used.
    pub fn current_key(&mut self, purpose: KeyPurpose) -> KeyChainResult<DeterministicKey> {
        let chain = self.active_key_chain()?;
        ensure!(!chain.is_married(), KeyChainError::UnsupportedForMarriedChain);

        if let Some(key) = self.current_keys.get(&purpose) {
            return Ok(key.clone());
        }
        let key = self.fresh_key(purpose)?;
        self.current_keys.insert(purpose, key.clone());
        Ok(key)
    }

    /// The address of the current key, or the current P2SH address of a married chain
    pub fn current_address(&mut self, purpose: KeyPurpose) -> KeyChainResult<Address> {
        let chain = self.active_key_chain()?;
        if chain.is_married() {
            if let Some(address) = self.current_addresses.get(&purpose) {
                return Ok(address.clone());
            }
            return self.fresh_address(purpose);
        }

        let key = self.current_key(purpose)?;
        Ok(Address::from_public_key(
            &self.chain_config,
            key.public_key(),
            chain.output_script_type(),
        )?)
    }

    /// A key never handed out before. The current key is not affected.
    pub fn fresh_key(&self, purpose: KeyPurpose) -> KeyChainResult<DeterministicKey> {
        let chain = self.active_key_chain()?;
        ensure!(!chain.is_married(), KeyChainError::UnsupportedForMarriedChain);
        chain.get_key(purpose)
    }

    pub fn fresh_keys(&self, purpose: KeyPurpose, count: u32) -> KeyChainResult<Vec<DeterministicKey>> {
        let chain = self.active_key_chain()?;
        ensure!(!chain.is_married(), KeyChainError::UnsupportedForMarriedChain);
        chain.get_keys(purpose, count)
    }

    /// The address of a fresh key, or a fresh P2SH address of a married chain which then
    /// becomes the current one
    pub fn fresh_address(&mut self, purpose: KeyPurpose) -> KeyChainResult<Address> {
        let chain = self.active_key_chain()?;
        if chain.is_married() {
            let output_script = chain.fresh_output_script(purpose)?;
            let address = match Destination::from_output_script(&output_script) {
                Some(destination @ Destination::ScriptHash(_)) => {
                    Address::new(&self.chain_config, destination)?
                }
                _ => {
                    return Err(KeyChainError::IllegalArgument(
                        "Married chains only produce P2SH outputs".into(),
                    ))
                }
            };
            self.maybe_look_ahead_scripts()?;
            self.current_addresses.insert(purpose, address.clone());
            return Ok(address);
        }

        let key = self.fresh_key(purpose)?;
        Ok(Address::from_public_key(
            &self.chain_config,
            key.public_key(),
            chain.output_script_type(),
        )?)
    }

    /// A fresh address from the newest chain of `output_script_type` not older than the key
    /// rotation time. No upgrade is attempted if there is no such chain.
    pub fn fresh_address_for(
        &self,
        purpose: KeyPurpose,
        output_script_type: ScriptType,
        key_rotation_time: Seconds,
    ) -> KeyChainResult<Address> {
        let chain = self
            .active_key_chain_for(output_script_type, key_rotation_time)?
            .ok_or(KeyChainError::DeterministicUpgradeRequired)?;
        let key = chain.get_key(purpose)?;
        Ok(Address::from_public_key(
            &self.chain_config,
            key.public_key(),
            output_script_type,
        )?)
    }

    /// The chains created at or after the key rotation time, oldest first
    pub fn active_key_chains(
        &self,
        key_rotation_time: Seconds,
    ) -> KeyChainResult<Vec<Arc<DeterministicKeyChain>>> {
        let chains = self.chains.as_ref().ok_or(KeyChainError::DeterministicChainsUnsupported)?;
        let mut active = Vec::new();
        for chain in chains {
            if chain.earliest_key_creation_time()? >= key_rotation_time {
                active.push(Arc::clone(chain));
            }
        }
        Ok(active)
    }

    /// The newest chain of `output_script_type` created at or after the key rotation time
    pub fn active_key_chain_for(
        &self,
        output_script_type: ScriptType,
        key_rotation_time: Seconds,
    ) -> KeyChainResult<Option<Arc<DeterministicKeyChain>>> {
        let chains = self.chains.as_ref().ok_or(KeyChainError::DeterministicChainsUnsupported)?;
        for chain in chains.iter().rev() {
            if chain.output_script_type() == output_script_type
                && chain.earliest_key_creation_time()? >= key_rotation_time
            {
                return Ok(Some(Arc::clone(chain)));
            }
        }
        Ok(None)
    }

    /// The chain keys and addresses are handed out from, the newest one
    pub fn active_key_chain(&self) -> KeyChainResult<Arc<DeterministicKeyChain>> {
        let chains = self.chains.as_ref().ok_or(KeyChainError::DeterministicChainsUnsupported)?;
        chains.last().cloned().ok_or(KeyChainError::DeterministicUpgradeRequired)
    }

    pub fn deterministic_key_chains(&self) -> KeyChainResult<Vec<Arc<DeterministicKeyChain>>> {
        self.chains.clone().ok_or(KeyChainError::DeterministicChainsUnsupported)
    }

    /// Add the active chains of `from` to this group, the chains are shared between the groups
    pub fn merge_active_key_chains(
        &mut self,
        from: &KeyChainGroup,
        key_rotation_time: Seconds,
    ) -> KeyChainResult<()> {
        ensure!(
            self.is_encrypted() == from.is_encrypted(),
            KeyChainError::IllegalArgument(
                "Encrypted and unencrypted key chains cannot be mixed".into()
            )
        );
        for chain in from.active_key_chains(key_rotation_time)? {
            self.add_and_activate_hd_chain(chain)?;
        }
        Ok(())
    }

    pub fn lookahead_size(&self) -> KeyChainResult<u32> {
        match self.lookahead_size {
            Some(lookahead_size) => Ok(lookahead_size),
            None => Ok(self.active_key_chain()?.lookahead_size()),
        }
    }

    pub fn lookahead_threshold(&self) -> KeyChainResult<u32> {
        match self.lookahead_threshold {
            Some(lookahead_threshold) => Ok(lookahead_threshold),
            None => Ok(self.active_key_chain()?.lookahead_threshold()),
        }
    }

    /// Import standalone keys into the basic chain, returns how many were new
    pub fn import_keys(&self, keys: Vec<WalletKey>) -> KeyChainResult<usize> {
        self.basic.import_keys(keys)
    }

    /// Import unencrypted keys into an encrypted group, encrypting them on the way
    pub fn import_keys_and_encrypt(
        &self,
        keys: Vec<WalletKey>,
        aes_key: &SymmetricKey,
        rng: &mut (impl Rng + CryptoRng),
    ) -> KeyChainResult<usize> {
        let crypter = self.crypter.as_ref().ok_or(KeyChainError::NotEncrypted)?;
        let encrypted_keys = keys
            .iter()
            .map(|key| {
                ensure!(
                    !key.is_encrypted(),
                    KeyChainError::IllegalArgument("Cannot import already encrypted keys".into())
                );
                key.encrypt(crypter, aes_key, rng)
            })
            .collect::<KeyChainResult<Vec<_>>>()?;
        self.import_keys(encrypted_keys)
    }

    /// Deterministic keys cannot be removed, returns whether an imported key was removed
    pub fn remove_imported_key(&self, public_key: &PublicKey) -> bool {
        self.basic.remove_key(public_key)
    }

    pub fn imported_keys(&self) -> Vec<WalletKey> {
        self.basic.keys()
    }

    pub fn check_password(&self, password: &str) -> KeyChainResult<bool> {
        let crypter = self.crypter.as_ref().ok_or(KeyChainError::NotEncrypted)?;
        self.check_aes_key(&crypter.derive_key(password)?)
    }

    /// Checked against the standalone keys if there are any, against the active chain otherwise
    pub fn check_aes_key(&self, aes_key: &SymmetricKey) -> KeyChainResult<bool> {
        ensure!(self.crypter.is_some(), KeyChainError::NotEncrypted);
        if self.basic.num_keys() > 0 {
            return self.basic.check_aes_key(aes_key);
        }
        self.active_key_chain()?.check_aes_key(aes_key)
    }

    /// Newest chains first, the active chain is the most likely to know the script
    pub fn find_redeem_data_from_script_hash(
        &self,
        script_hash: &ScriptHash,
    ) -> KeyChainResult<Option<RedeemData>> {
        for chain in self.chains().iter().rev() {
            if let Some(redeem_data) = chain.find_redeem_data_by_script_hash(script_hash)? {
                return Ok(Some(redeem_data));
            }
        }
        Ok(None)
    }

    /// Mark the keys behind a P2SH address of a married chain as used. The current address
    /// moves on if it was this one.
    pub fn mark_p2sh_address_as_used(&mut self, address: &Address) -> KeyChainResult<()> {
        let script_hash = match address.destination() {
            Destination::ScriptHash(script_hash) => *script_hash,
            _ => {
                return Err(KeyChainError::IllegalArgument(format!(
                    "{address} is not a P2SH address"
                )))
            }
        };
        let redeem_data = match self.find_redeem_data_from_script_hash(&script_hash)? {
            Some(redeem_data) => redeem_data,
            // Not ours
            None => return Ok(()),
        };

        for public_key in redeem_data.keys() {
            for chain in self.chains().to_vec() {
                if let Some(key) = chain.find_key_from_pub_key(public_key) {
                    chain.mark_key_as_used(&key)?;
                    self.maybe_mark_current_address_as_used(address)?;
                }
            }
        }
        Ok(())
    }

    fn maybe_mark_current_address_as_used(&mut self, address: &Address) -> KeyChainResult<()> {
        let purpose = self
            .current_addresses
            .iter()
            .find_map(|(purpose, current)| (current == address).then_some(*purpose));
        if let Some(purpose) = purpose {
            log::info!("Marking P2SH address as used: {address}");
            let fresh = self.fresh_address(purpose)?;
            self.current_addresses.insert(purpose, fresh);
        }
        Ok(())
    }

    fn maybe_mark_current_key_as_used(&mut self, key: &DeterministicKey) -> KeyChainResult<()> {
        // Nothing to do for married chains, they have no current keys
        let purpose = self
            .current_keys
            .iter()
            .find_map(|(purpose, current)| (current == key).then_some(*purpose));
        if let Some(purpose) = purpose {
            log::info!("Marking key as used: {}", key.path());
            let fresh = self.fresh_key(purpose)?;
            self.current_keys.insert(purpose, fresh);
        }
        Ok(())
    }

    /// Standalone keys first, then deterministic chains of `script_type` if one is given.
    /// Standalone keys serve any script type.
    pub fn find_key_from_pub_key_hash(
        &self,
        hash: &PublicKeyHash,
        script_type: Option<ScriptType>,
    ) -> Option<FoundKey> {
        if let Some(key) = self.basic.find_key_from_pub_hash(hash) {
            return Some(FoundKey::Standalone(key));
        }
        self.chains()
            .iter()
            .filter(|chain| script_type.map_or(true, |t| t == chain.output_script_type()))
            .find_map(|chain| chain.find_key_from_pub_hash(hash))
            .map(FoundKey::Hierarchy)
    }

    pub fn find_key_from_pub_key(&self, public_key: &PublicKey) -> Option<FoundKey> {
        if let Some(key) = self.basic.find_key_from_pub_key(public_key) {
            return Some(FoundKey::Standalone(key));
        }
        self.chains()
            .iter()
            .find_map(|chain| chain.find_key_from_pub_key(public_key))
            .map(FoundKey::Hierarchy)
    }

    pub fn has_key(&self, public_key: &PublicKey) -> bool {
        self.basic.has_key(public_key) || self.chains().iter().any(|chain| chain.has_key(public_key))
    }

    /// Mark the deterministic key with this hash as used. The current key moves on if it was
    /// this one.
    pub fn mark_pub_key_hash_as_used(&mut self, hash: &PublicKeyHash) -> KeyChainResult<()> {
        for chain in self.chains().to_vec() {
            if let Some(key) = chain.mark_pub_hash_as_used(hash)? {
                return self.maybe_mark_current_key_as_used(&key);
            }
        }
        Ok(())
    }

    pub fn mark_pub_key_as_used(&mut self, public_key: &PublicKey) -> KeyChainResult<()> {
        for chain in self.chains().to_vec() {
            if let Some(key) = chain.mark_pub_key_as_used(public_key)? {
                return self.maybe_mark_current_key_as_used(&key);
            }
        }
        Ok(())
    }

    /// The private key for `public_key`, `None` if the key is not in the group
    pub fn private_key_for(
        &self,
        public_key: &PublicKey,
        aes_key: Option<&SymmetricKey>,
    ) -> KeyChainResult<Option<PrivateKey>> {
        if let Some(private_key) = self.basic.private_key_for(public_key, aes_key)? {
            return Ok(Some(private_key));
        }
        for chain in self.chains() {
            if let Some(key) = chain.find_key_from_pub_key(public_key) {
                return chain.private_key_for(key.path(), aes_key).map(Some);
            }
        }
        Ok(None)
    }

    /// Number of keys in all the chains, lookahead included
    pub fn num_keys(&self) -> KeyChainResult<usize> {
        let mut num_keys = self.basic.num_keys();
        for chain in self.chains() {
            num_keys += chain.num_keys()?;
        }
        Ok(num_keys)
    }

    /// Whether the active chain hands out P2SH addresses of a multisig
    pub fn is_married(&self) -> bool {
        self.chains().last().is_some_and(|chain| chain.is_married())
    }

    /// Encrypt every key of the group. Nothing changes if any of the chains fails to encrypt.
    pub fn encrypt(
        &mut self,
        crypter: KeyCrypter,
        aes_key: &SymmetricKey,
        rng: &mut (impl Rng + CryptoRng),
    ) -> KeyChainResult<()> {
        ensure!(
            !self.chains().is_empty() || self.basic.num_keys() != 0,
            KeyChainError::NoKeysOrChains
        );
        ensure!(self.crypter.is_none(), KeyChainError::AlreadyEncrypted);

        let basic = self.basic.to_encrypted(&crypter, aes_key, rng)?;
        let chains = self
            .chains()
            .iter()
            .map(|chain| chain.to_encrypted(&crypter, aes_key, rng).map(Arc::new))
            .collect::<KeyChainResult<Vec<_>>>()?;

        self.basic = basic;
        if let Some(current) = &mut self.chains {
            *current = chains;
        }
        self.crypter = Some(crypter);
        log::info!("Encrypted key chain group");
        Ok(())
    }

    /// Decrypt every key of the group. Nothing changes if any of the chains fails to decrypt.
    pub fn decrypt(&mut self, aes_key: &SymmetricKey) -> KeyChainResult<()> {
        ensure!(self.crypter.is_some(), KeyChainError::NotEncrypted);

        let basic = self.basic.to_decrypted(aes_key)?;
        let chains = self
            .chains()
            .iter()
            .map(|chain| chain.to_decrypted(aes_key).map(Arc::new))
            .collect::<KeyChainResult<Vec<_>>>()?;

        self.basic = basic;
        if let Some(current) = &mut self.chains {
            *current = chains;
        }
        self.crypter = None;
        log::info!("Decrypted key chain group");
        Ok(())
    }

    pub fn is_encrypted(&self) -> bool {
        self.crypter.is_some()
    }

    pub fn key_crypter(&self) -> Option<&KeyCrypter> {
        self.crypter.as_ref()
    }

    /// Whether the group only has public keys. Fails for an empty group and for a group
    /// mixing watching and spending keys.
    pub fn is_watching(&self) -> KeyChainResult<bool> {
        let active_state = match self.chains().last() {
            None => WatchingState::Empty,
            Some(chain) if chain.is_watching() => WatchingState::Watching,
            Some(_) => WatchingState::Regular,
        };
        match (self.basic.is_watching(), active_state) {
            (WatchingState::Empty, WatchingState::Empty) => {
                Err(KeyChainError::WatchingStateUndetermined)
            }
            (WatchingState::Empty, state) | (state, WatchingState::Empty) => {
                Ok(state == WatchingState::Watching)
            }
            (basic_state, active_state) => {
                ensure!(
                    basic_state == active_state,
                    KeyChainError::MixedWatchingAndSpending
                );
                Ok(active_state == WatchingState::Watching)
            }
        }
    }

    /// `Seconds::MAX` for an empty group
    pub fn earliest_key_creation_time(&self) -> KeyChainResult<Seconds> {
        let mut time = self.basic.earliest_key_creation_time();
        for chain in self.chains() {
            time = time.min(chain.earliest_key_creation_time()?);
        }
        Ok(time)
    }

    pub fn bloom_filter_element_count(&self) -> KeyChainResult<usize> {
        let mut count = self.basic.num_bloom_filter_entries();
        for chain in self.chains() {
            count += chain.num_bloom_filter_entries()?;
        }
        Ok(count)
    }

    /// A filter matching the keys of every chain, `size` should be at least
    /// [Self::bloom_filter_element_count]
    pub fn bloom_filter(
        &self,
        size: usize,
        false_positive_rate: f64,
        tweak: u32,
    ) -> KeyChainResult<BloomFilter> {
        let mut filter = BloomFilter::new(size, false_positive_rate, tweak, BloomUpdate::P2PubkeyOnly);
        if self.basic.num_keys() > 0 {
            filter.merge(&self.basic.bloom_filter(size, false_positive_rate, tweak))?;
        }
        for chain in self.chains() {
            filter.merge(&chain.bloom_filter(size, false_positive_rate, tweak)?)?;
        }
        Ok(filter)
    }

    /// Grows whenever any chain derives new lookahead keys, a filter built before is stale then
    pub fn combined_key_lookahead_epochs(&self) -> KeyChainResult<u32> {
        let chains = self.chains.as_ref().ok_or(KeyChainError::DeterministicChainsUnsupported)?;
        Ok(chains
            .iter()
            .fold(0u32, |epochs, chain| epochs.wrapping_add(chain.key_lookahead_epoch())))
    }

    /// Listen for new keys in any chain of the group, on the executor of the group config
    pub fn add_listener(&self, handler: EventHandler<KeyChainEvent>) -> ListenerId {
        self.add_listener_with_executor(handler, Arc::clone(self.config.executor()))
    }

    /// The listener is also registered with chains added to the group later
    pub fn add_listener_with_executor(
        &self,
        handler: EventHandler<KeyChainEvent>,
        executor: Arc<dyn Executor>,
    ) -> ListenerId {
        let id = self.basic.add_listener(Arc::clone(&handler), Arc::clone(&executor));
        for chain in self.chains() {
            chain.listeners().add_with_id(id, Arc::clone(&handler), Arc::clone(&executor));
        }
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        for chain in self.chains() {
            chain.remove_listener(id);
        }
        self.basic.remove_listener(id)
    }

    /// The records of the standalone keys followed by those of every chain, oldest first
    pub fn to_records(&self) -> Vec<KeyRecord> {
        let mut records = self.basic.to_records();
        for chain in self.chains() {
            records.extend(chain.to_records());
        }
        records
    }

    pub fn from_records_unencrypted(
        chain_config: Arc<ChainConfig>,
        config: KeyChainConfig,
        records: &[KeyRecord],
    ) -> KeyChainResult<Self> {
        let basic = BasicKeyChain::from_records_unencrypted(records, config.time_getter().clone())?;
        let chains = DeterministicKeyChain::from_records(records, None)?;
        Self::from_loaded_chains(chain_config, config, basic, chains, None)
    }

    pub fn from_records_encrypted(
        chain_config: Arc<ChainConfig>,
        config: KeyChainConfig,
        records: &[KeyRecord],
        crypter: KeyCrypter,
    ) -> KeyChainResult<Self> {
        let basic = BasicKeyChain::from_records_encrypted(
            records,
            crypter.clone(),
            config.time_getter().clone(),
        )?;
        let chains = DeterministicKeyChain::from_records(records, Some(&crypter))?;
        Self::from_loaded_chains(chain_config, config, basic, chains, Some(crypter))
    }

    /// The lookahead of the active chain is applied to all chains, and the last keys issued on
    /// its branches become the current receive and change keys
    fn from_loaded_chains(
        chain_config: Arc<ChainConfig>,
        config: KeyChainConfig,
        basic: BasicKeyChain,
        chains: Vec<DeterministicKeyChain>,
        crypter: Option<KeyCrypter>,
    ) -> KeyChainResult<Self> {
        let mut lookahead_size = None;
        let mut lookahead_threshold = None;
        let mut current_keys = BTreeMap::new();
        if let Some(active) = chains.last() {
            let size = active.lookahead_size();
            let threshold = active.lookahead_threshold();
            lookahead_size = Some(size);
            lookahead_threshold = (threshold < size).then_some(threshold);

            for (purpose, branch) in [
                (KeyPurpose::ReceiveFunds, Branch::External),
                (KeyPurpose::Change, Branch::Internal),
            ] {
                if let Some(key) = active.last_issued_key(branch)? {
                    current_keys.insert(purpose, key);
                }
            }
        }

        Self::new(
            chain_config,
            config,
            basic,
            Some(chains.into_iter().map(Arc::new).collect()),
            lookahead_size,
            lookahead_threshold,
            current_keys,
            crypter,
        )
    }
}

impl KeyChainGroup {
    /// A dump of the imported keys and of every chain, see [`DeterministicKeyChain::describe`]
    pub fn describe(
        &self,
        include_lookahead: bool,
        include_private_keys: bool,
        aes_key: Option<&SymmetricKey>,
    ) -> KeyChainResult<String> {
        if include_private_keys && self.is_encrypted() {
            let aes_key = aes_key.ok_or(KeyChainError::EncryptionKeyRequired)?;
            ensure!(self.check_aes_key(aes_key)?, KeyChainError::BadPassword);
        }

        let mut sections = Vec::new();
        let imported_keys = self.basic.keys();
        if !imported_keys.is_empty() {
            let mut lines = Vec::with_capacity(imported_keys.len());
            for key in imported_keys {
                let address = Address::from_public_key(
                    &self.chain_config,
                    key.public_key(),
                    self.config.output_script_type(),
                )?;
                lines.push(format!(
                    "  addr:{address}  hash160:{}  (imported)",
                    key.pubkey_hash()
                ));
                if include_private_keys && !key.is_watching() {
                    let private_key = key.private_key(aes_key)?;
                    lines.push(format!("  priv:{}", hex::encode(private_key.to_bytes())));
                }
            }
            sections.push(lines.join("\n"));
        }
        for chain in self.chains.iter().flatten() {
            sections.push(chain.describe(
                &self.chain_config,
                include_lookahead,
                include_private_keys,
                aes_key,
            )?);
        }
        Ok(sections.join("\n\n"))
    }
}

/// The public part of [`KeyChainGroup::describe`], without the lookahead
impl std::fmt::Display for KeyChainGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let description = self.describe(false, false, None).map_err(|err| {
            log::warn!("Cannot describe the key chain group: {err}");
            std::fmt::Error
        })?;
        f.write_str(&description)
    }
}

impl std::fmt::Debug for KeyChainGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyChainGroup")
            .field("num_imported_keys", &self.basic.num_keys())
            .field("chains", &self.chains)
            .field("is_encrypted", &self.crypter.is_some())
            .finish()
    }
}
