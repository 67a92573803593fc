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

use std::sync::Arc;

use common::{chain::ChainConfig, time_getter::TimeGetter};
use crypto::{
    kdf::KdfConfig,
    key::hdkd::{child_number::ChildNumber, derivation_path::DerivationPath, u31::U31},
};
use script::ScriptType;
use utils::eventhandler::{Executor, SameThreadExecutor};

use super::deterministic_key_chain::{ChainSource, DeterministicKeyChainConfig};
use super::{KeyChainError, KeyChainResult};

/// Default number of unused keys derived ahead of the last issued key on each branch
pub const DEFAULT_LOOKAHEAD_SIZE: u32 = 100;

/// Length of the salt for the password based key derivation
pub const DEFAULT_SALT_LENGTH: usize = 32;

const DEFAULT_KDF_CONFIG: KdfConfig = KdfConfig::Argon2id {
    // 64 MiB
    m_cost_memory_size: 64 * 1024,
    t_cost_iterations: 3,
    p_cost_parallelism: 4,
};

const BIP44_PURPOSE: ChildNumber = ChildNumber::from_hardened(match U31::from_u32(44) {
    Some(v) => v,
    None => panic!("Invalid BIP44 purpose"),
});

const BIP84_PURPOSE: ChildNumber = ChildNumber::from_hardened(match U31::from_u32(84) {
    Some(v) => v,
    None => panic!("Invalid BIP84 purpose"),
});

/// Where the account keys of the chains in a group live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyChainGroupStructure {
    /// P2PKH at m/0', P2WPKH at m/1'
    #[default]
    Default,
    /// P2PKH at m/44'/<coin_type>'/0', P2WPKH at m/84'/<coin_type>'/0'
    Bip43,
}

impl KeyChainGroupStructure {
    pub fn account_path_for(
        &self,
        script_type: ScriptType,
        chain_config: &ChainConfig,
    ) -> KeyChainResult<DerivationPath> {
        let path = match (self, script_type) {
            (KeyChainGroupStructure::Default, ScriptType::P2pkh) => {
                vec![ChildNumber::ZERO_HARDENED]
            }
            (KeyChainGroupStructure::Default, ScriptType::P2wpkh) => {
                vec![ChildNumber::ONE_HARDENED]
            }
            (KeyChainGroupStructure::Bip43, ScriptType::P2pkh) => vec![
                BIP44_PURPOSE,
                chain_config.bip44_coin_type(),
                chain_config.default_account_index(),
            ],
            (KeyChainGroupStructure::Bip43, ScriptType::P2wpkh) => vec![
                BIP84_PURPOSE,
                chain_config.bip44_coin_type(),
                chain_config.default_account_index(),
            ],
            (_, ScriptType::P2sh) => {
                return Err(KeyChainError::IllegalArgument(format!(
                    "No account path for {script_type} chains"
                )))
            }
        };
        debug_assert!(path.iter().all(ChildNumber::is_hardened));
        Ok(path.try_into()?)
    }
}

/// Settings shared by the key chains of a wallet
#[derive(Clone)]
pub struct KeyChainConfig {
    lookahead_size: u32,
    lookahead_threshold: Option<u32>,
    output_script_type: ScriptType,
    structure: KeyChainGroupStructure,
    kdf_config: KdfConfig,
    time_getter: TimeGetter,

    /// Runs the listeners registered without an executor of their own
    executor: Arc<dyn Executor>,
}

impl KeyChainConfig {
    pub fn new() -> Self {
        Self {
            lookahead_size: DEFAULT_LOOKAHEAD_SIZE,
            lookahead_threshold: None,
            output_script_type: ScriptType::P2wpkh,
            structure: KeyChainGroupStructure::Default,
            kdf_config: DEFAULT_KDF_CONFIG,
            time_getter: TimeGetter::default(),
            executor: Arc::new(SameThreadExecutor),
        }
    }

    pub fn with_lookahead_size(mut self, lookahead_size: u32) -> Self {
        self.lookahead_size = lookahead_size;
        self
    }

    pub fn with_lookahead_threshold(mut self, lookahead_threshold: u32) -> Self {
        self.lookahead_threshold = Some(lookahead_threshold);
        self
    }

    pub fn with_output_script_type(mut self, output_script_type: ScriptType) -> Self {
        self.output_script_type = output_script_type;
        self
    }

    pub fn with_structure(mut self, structure: KeyChainGroupStructure) -> Self {
        self.structure = structure;
        self
    }

    pub fn with_kdf_config(mut self, kdf_config: KdfConfig) -> Self {
        self.kdf_config = kdf_config;
        self
    }

    pub fn with_time_getter(mut self, time_getter: TimeGetter) -> Self {
        self.time_getter = time_getter;
        self
    }

    /// Listeners run on the thread that added the keys unless an executor is given here, a
    /// [utils::eventhandler::UserThread] for instance
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn lookahead_size(&self) -> u32 {
        self.lookahead_size
    }

    /// The configured threshold, a third of the lookahead size unless set explicitly
    pub fn lookahead_threshold(&self) -> u32 {
        self.lookahead_threshold.unwrap_or(self.lookahead_size / 3)
    }

    pub fn output_script_type(&self) -> ScriptType {
        self.output_script_type
    }

    pub fn structure(&self) -> KeyChainGroupStructure {
        self.structure
    }

    pub fn kdf_config(&self) -> &KdfConfig {
        &self.kdf_config
    }

    pub fn time_getter(&self) -> &TimeGetter {
        &self.time_getter
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Settings of a new deterministic chain of this wallet
    pub fn new_chain_config(
        &self,
        source: ChainSource,
        output_script_type: ScriptType,
        account_path: DerivationPath,
    ) -> DeterministicKeyChainConfig {
        let config = DeterministicKeyChainConfig::new(source)
            .with_output_script_type(output_script_type)
            .with_account_path(account_path)
            .with_lookahead_size(self.lookahead_size);
        match self.lookahead_threshold {
            Some(threshold) => config.with_lookahead_threshold(threshold),
            None => config,
        }
    }
}

impl std::fmt::Debug for KeyChainConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyChainConfig")
            .field("lookahead_size", &self.lookahead_size)
            .field("lookahead_threshold", &self.lookahead_threshold)
            .field("output_script_type", &self.output_script_type)
            .field("structure", &self.structure)
            .field("kdf_config", &self.kdf_config)
            .finish_non_exhaustive()
    }
}

impl Default for KeyChainConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheap KDF parameters, only for tests
#[cfg(test)]
pub const TEST_KDF_CONFIG: KdfConfig = KdfConfig::Argon2id {
    m_cost_memory_size: 64,
    t_cost_iterations: 1,
    p_cost_parallelism: 1,
};
