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

//! Married chains hand out P2SH multisig scripts instead of single keys. Each script combines
//! the key of this chain with the keys at the same branch and index of the following chains,
//! which watch the accounts of the cosigners.

use std::collections::BTreeMap;
use std::sync::Arc;

use common::address::ScriptHash;
use crypto::key::extended::ExtendedPublicKey;
use crypto::key::hdkd::derivable::Derivable;
use logging::log;
use script::standard::MAX_MULTISIG_KEYS;
use script::Script;
use utils::bloom_filters::{BloomFilter, BloomUpdate};
use utils::ensure;

use super::{ChainState, DeterministicKeyChain};
use crate::key_chain::deterministic_key::DeterministicKey;
use crate::key_chain::redeem_data::RedeemData;
use crate::key_chain::{KeyChainError, KeyChainResult, KeyPurpose};

#[derive(Debug, Clone)]
pub(super) struct Multisig {
    pub following: Vec<Arc<DeterministicKeyChain>>,

    /// Redeem data of every leaf key, by script hash. Rebuilt when the number of leaves changes.
    pub redeem_data: BTreeMap<ScriptHash, RedeemData>,
}

impl Multisig {
    pub fn new(following: Vec<Arc<DeterministicKeyChain>>) -> Self {
        Self {
            following,
            redeem_data: BTreeMap::new(),
        }
    }
}

fn not_married() -> KeyChainError {
    KeyChainError::IllegalArgument("The key chain is not married".into())
}

/// A majority of all keys
const fn default_threshold(num_keys: usize) -> usize {
    num_keys / 2 + 1
}

impl ChainState {
    /// The followed key goes first in the redeem script, then the keys of the following chains
    /// in the order they were added
    fn redeem_data_for(&self, key: &DeterministicKey) -> KeyChainResult<RedeemData> {
        let multisig = self.multisig.as_ref().ok_or_else(not_married)?;
        ensure!(
            self.account_path.is_prefix_of(key.path()),
            KeyChainError::IllegalArgument(format!(
                "Key {} is not in the account {}",
                key.path(),
                self.account_path
            ))
        );
        let relative_path = &key.path().as_slice()[self.account_path.len()..];

        let mut keys = Vec::with_capacity(multisig.following.len() + 1);
        keys.push(key.public_key().clone());
        for following in &multisig.following {
            following.maybe_look_ahead()?;
            let path = following.account_path().extended(relative_path)?;
            let following_key =
                following.key_by_path(&path).ok_or(KeyChainError::FollowingChainsOutOfSync)?;
            keys.push(following_key.public_key().clone());
        }
        RedeemData::multisig(self.sigs_required_to_spend as usize, keys)
    }

    pub(super) fn look_ahead_scripts(&mut self) -> KeyChainResult<()> {
        let num_cached = match &self.multisig {
            Some(multisig) => multisig.redeem_data.len(),
            None => return Ok(()),
        };
        self.look_ahead()?;
        if num_cached == self.leaf_keys().count() {
            return Ok(());
        }

        let redeem_data = self
            .leaf_keys()
            .map(|key| {
                let data = self.redeem_data_for(key)?;
                Ok((data.script_hash(), data))
            })
            .collect::<KeyChainResult<BTreeMap<_, _>>>()?;
        log::debug!(
            "Cached {} redeem scripts of the married chain {}",
            redeem_data.len(),
            self.account_path
        );
        if let Some(multisig) = &mut self.multisig {
            multisig.redeem_data = redeem_data;
        }
        Ok(())
    }
}

impl DeterministicKeyChain {
    pub fn is_married(&self) -> bool {
        self.state.lock().multisig.is_some()
    }

    pub fn sigs_required_to_spend(&self) -> u32 {
        self.state.lock().sigs_required_to_spend
    }

    pub fn following_chains(&self) -> Vec<Arc<DeterministicKeyChain>> {
        self.state
            .lock()
            .multisig
            .as_ref()
            .map(|multisig| multisig.following.clone())
            .unwrap_or_default()
    }

    /// Marry this chain to the accounts of the cosigners. `threshold` signatures out of all the
    /// keys are needed to spend, a majority when not given. Only possible before any key is issued.
    pub fn add_following_account_keys(
        &self,
        following_keys: Vec<ExtendedPublicKey>,
        threshold: Option<usize>,
    ) -> KeyChainResult<()> {
        let mut state = self.state.lock();
        ensure!(
            state.multisig.is_none(),
            KeyChainError::IllegalArgument("The key chain is already married".into())
        );
        ensure!(
            !following_keys.is_empty(),
            KeyChainError::IllegalArgument("No following keys given".into())
        );

        let num_keys = following_keys.len() + 1;
        ensure!(
            num_keys <= MAX_MULTISIG_KEYS,
            KeyChainError::IllegalArgument(format!(
                "At most {MAX_MULTISIG_KEYS} keys fit a multisig, got {num_keys}"
            ))
        );
        let threshold = threshold.unwrap_or(default_threshold(num_keys));
        ensure!(
            (1..=num_keys).contains(&threshold),
            KeyChainError::IllegalArgument(format!(
                "Threshold {threshold} is not between 1 and the number of keys {num_keys}"
            ))
        );
        ensure!(
            state.issued.external == 0 && state.issued.internal == 0,
            KeyChainError::KeysAlreadyIssued
        );

        let following = following_keys
            .into_iter()
            .map(|key| {
                ensure!(
                    key.get_derivation_path().len() == state.account_path.len(),
                    KeyChainError::IllegalArgument(format!(
                        "Following key {} is not an account key",
                        key.get_derivation_path()
                    ))
                );
                let account = DeterministicKey::from_public(key, 0);
                let mut following = ChainState::from_account_key(account, state.output_script_type)?;
                following.is_following = true;
                following.lookahead_size = state.lookahead_size;
                following.lookahead_threshold = state.lookahead_threshold;
                following.look_ahead()?;
                following.pending_added.clear();
                Ok(Arc::new(DeterministicKeyChain::from_state(following)))
            })
            .collect::<KeyChainResult<Vec<_>>>()?;

        log::info!(
            "Married key chain {} to {} following chains, {threshold} of {num_keys} signatures needed",
            state.account_path,
            following.len(),
        );
        state.sigs_required_to_spend = threshold as u32;
        state.multisig = Some(Multisig::new(following));
        Ok(())
    }

    /// Issue the next key for `purpose` on this chain and on every following chain, and return
    /// the P2SH output script of their multisig
    pub fn fresh_output_script(&self, purpose: KeyPurpose) -> KeyChainResult<Script> {
        self.with_state(|state| {
            ensure!(state.multisig.is_some(), not_married());
            let followed_key = state
                .issue_keys(purpose, 1)?
                .pop()
                .ok_or(KeyChainError::FollowingChainsOutOfSync)?;
            Ok(state.redeem_data_for(&followed_key)?.output_script())
        })
    }

    /// The multisig redeem data for a key of this chain
    pub fn redeem_data(&self, followed_key: &DeterministicKey) -> KeyChainResult<RedeemData> {
        self.state.lock().redeem_data_for(followed_key)
    }

    pub fn find_redeem_data_by_script_hash(
        &self,
        script_hash: &ScriptHash,
    ) -> KeyChainResult<Option<RedeemData>> {
        self.with_state(|state| {
            state.look_ahead_scripts()?;
            Ok(state
                .multisig
                .as_ref()
                .and_then(|multisig| multisig.redeem_data.get(script_hash).cloned()))
        })
    }

    /// Bring the redeem script cache up to date with the lookahead
    pub fn maybe_look_ahead_scripts(&self) -> KeyChainResult<()> {
        self.with_state(ChainState::look_ahead_scripts)
    }

    pub(super) fn num_married_bloom_filter_entries(&self) -> KeyChainResult<usize> {
        self.with_state(|state| {
            state.look_ahead()?;
            Ok(state.leaf_keys().count() * 2)
        })
    }

    /// Matches the script hash and the redeem script of every leaf
    pub(super) fn married_bloom_filter(
        &self,
        size: usize,
        false_positive_rate: f64,
        tweak: u32,
    ) -> KeyChainResult<BloomFilter> {
        self.with_state(|state| {
            state.look_ahead_scripts()?;
            let mut filter =
                BloomFilter::new(size, false_positive_rate, tweak, BloomUpdate::P2PubkeyOnly);
            if let Some(multisig) = &state.multisig {
                for (script_hash, redeem_data) in &multisig.redeem_data {
                    filter.insert(script_hash.as_bytes());
                    filter.insert(redeem_data.redeem_script().as_bytes());
                }
            }
            Ok(filter)
        })
    }

    /// Used when loading, the chains were married when they were stored
    pub(super) fn attach_following(&self, following: Vec<Arc<DeterministicKeyChain>>) {
        self.state.lock().multisig = Some(Multisig::new(following));
    }
}
