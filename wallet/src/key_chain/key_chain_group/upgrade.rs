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


//! Moving a group along the path `standalone keys -> P2PKH chain -> P2WPKH chain`. No step is
//! skipped, a restored backup may still have coins on the P2PKH chain.

use std::sync::Arc;

use common::address::Address;
use common::primitives::time::Seconds;
use crypto::random::{CryptoRng, Rng};
use crypto::symkey::SymmetricKey;
use logging::log;
use script::ScriptType;
use utils::ensure;
use zeroize::Zeroizing;

use super::KeyChainGroup;
use crate::key_chain::config::KeyChainGroupStructure;
use crate::key_chain::deterministic_key_chain::{ChainSource, DeterministicKeyChain};
use crate::key_chain::deterministic_seed::DEFAULT_SEED_ENTROPY_BITS;
use crate::key_chain::wallet_key::WalletKey;
use crate::key_chain::{KeyChainError, KeyChainResult};

impl KeyChainGroup {
    /// Whether [Self::upgrade_to_deterministic] is needed to get an active chain of
    /// `preferred_script_type`
    pub fn is_deterministic_upgrade_required(
        &self,
        preferred_script_type: ScriptType,
        key_rotation_time: Seconds,
    ) -> KeyChainResult<bool> {
        if !self.supports_deterministic_chains() {
            return Ok(false);
        }
        Ok(self
            .active_key_chain_for(preferred_script_type, key_rotation_time)?
            .is_none())
    }

    /// Add the chains needed for an active chain of `preferred_script_type`.
    ///
    /// Standalone keys are upgraded to a P2PKH chain seeded with the oldest key created at or
    /// after `key_rotation_time`. A P2WPKH chain reuses the seed of the P2PKH chain, so no new
    /// backup is needed. An encrypted group needs `aes_key`.
    pub fn upgrade_to_deterministic(
        &mut self,
        preferred_script_type: ScriptType,
        structure: KeyChainGroupStructure,
        key_rotation_time: Seconds,
        aes_key: Option<&SymmetricKey>,
        rng: &mut (impl Rng + CryptoRng),
    ) -> KeyChainResult<()> {
        ensure!(
            self.supports_deterministic_chains(),
            KeyChainError::DeterministicChainsUnsupported
        );
        ensure!(
            preferred_script_type != ScriptType::P2sh,
            KeyChainError::IllegalArgument("There are no P2SH chains to upgrade to".into())
        );
        if !self.is_deterministic_upgrade_required(preferred_script_type, key_rotation_time)? {
            return Ok(());
        }

        if self.basic.num_keys() > 0
            && self.active_key_chain_for(ScriptType::P2pkh, key_rotation_time)?.is_none()
        {
            self.upgrade_basic_to_p2pkh(structure, key_rotation_time, aes_key, rng)?;
        }

        if preferred_script_type == ScriptType::P2wpkh
            && self.active_key_chain_for(ScriptType::P2wpkh, key_rotation_time)?.is_none()
        {
            self.upgrade_p2pkh_to_p2wpkh(structure, key_rotation_time, aes_key, rng)?;
        }
        Ok(())
    }

    fn upgrade_basic_to_p2pkh(
        &mut self,
        structure: KeyChainGroupStructure,
        key_rotation_time: Seconds,
        aes_key: Option<&SymmetricKey>,
        rng: &mut (impl Rng + CryptoRng),
    ) -> KeyChainResult<()> {
        // The rotation time may be the creation time of the first good key, which must count
        let key = match key_rotation_time.checked_sub(1) {
            Some(time) => self.basic.find_oldest_key_after(time),
            None => self.basic.keys().into_iter().min_by_key(WalletKey::creation_time),
        }
        .ok_or(KeyChainError::AllRandomKeysRotating)?;

        let was_encrypted = key.is_encrypted();
        let key = match (was_encrypted, aes_key) {
            (true, Some(aes_key)) => key.decrypt(aes_key)?,
            (true, None) => return Err(KeyChainError::DeterministicUpgradeRequiresPassword),
            (false, Some(_)) => {
                return Err(KeyChainError::IllegalArgument(
                    "An AES key was given but the key chain group is not encrypted".into(),
                ))
            }
            (false, None) => key,
        };

        log::info!(
            "Upgrading standalone keys to a P2PKH deterministic key chain, seeded with the oldest non-rotating key {}",
            Address::from_public_key(&self.chain_config, key.public_key(), ScriptType::P2pkh)?
        );
        let secret = Zeroizing::new(key.private_key(None)?.to_bytes());
        // Only the first 128 bits of the key, seeds are written down on paper
        let source = ChainSource::Entropy {
            entropy: secret[..DEFAULT_SEED_ENTROPY_BITS / 8].to_vec(),
            passphrase: String::new(),
            creation_time: key.creation_time(),
        };
        let account_path = structure.account_path_for(ScriptType::P2pkh, &self.chain_config)?;
        let config = self.config.new_chain_config(source, ScriptType::P2pkh, account_path);
        let chain = DeterministicKeyChain::new(config, rng)?;

        let chain = if was_encrypted {
            self.encrypt_new_chain(&chain, aes_key, rng)?
        } else {
            chain
        };
        self.add_and_activate_hd_chain(Arc::new(chain))
    }

    fn upgrade_p2pkh_to_p2wpkh(
        &mut self,
        structure: KeyChainGroupStructure,
        key_rotation_time: Seconds,
        aes_key: Option<&SymmetricKey>,
        rng: &mut (impl Rng + CryptoRng),
    ) -> KeyChainResult<()> {
        let p2pkh_chain = self
            .active_key_chain_for(ScriptType::P2pkh, key_rotation_time)?
            .ok_or(KeyChainError::DeterministicUpgradeRequired)?;
        let seed = p2pkh_chain.seed().ok_or_else(|| {
            KeyChainError::IllegalArgument("The P2PKH key chain has no seed to reuse".into())
        })?;

        let was_encrypted = seed.is_encrypted();
        let seed = if was_encrypted {
            let aes_key = aes_key.ok_or(KeyChainError::DeterministicUpgradeRequiresPassword)?;
            seed.decrypt(aes_key)?
        } else {
            seed
        };

        log::info!("Upgrading the P2PKH deterministic key chain to P2WPKH, reusing its seed");
        let account_path = structure.account_path_for(ScriptType::P2wpkh, &self.chain_config)?;
        let config =
            self.config.new_chain_config(ChainSource::Seed(seed), ScriptType::P2wpkh, account_path);
        let chain = DeterministicKeyChain::new(config, rng)?;

        let chain = if was_encrypted {
            self.encrypt_new_chain(&chain, aes_key, rng)?
        } else {
            chain
        };
        self.add_and_activate_hd_chain(Arc::new(chain))
    }

    fn encrypt_new_chain(
        &self,
        chain: &DeterministicKeyChain,
        aes_key: Option<&SymmetricKey>,
        rng: &mut (impl Rng + CryptoRng),
    ) -> KeyChainResult<DeterministicKeyChain> {
        let crypter = self.crypter.as_ref().ok_or(KeyChainError::NotEncrypted)?;
        let aes_key = aes_key.ok_or(KeyChainError::DeterministicUpgradeRequiresPassword)?;
        chain.to_encrypted(crypter, aes_key, rng)
    }
}
