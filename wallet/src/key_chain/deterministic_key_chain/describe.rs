// Copyright (c) 2024 RBB S.r.l
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


//! BIP32 serialization of the account key and the human readable dump of a chain

use common::address::Address;
use common::chain::ChainConfig;
use crypto::symkey::SymmetricKey;
use utils::ensure;

use super::DeterministicKeyChain;
use crate::key_chain::{KeyChainError, KeyChainResult};

impl DeterministicKeyChain {
    /// The account public key, `xpub...` on mainnet
    pub fn watching_key_base58(&self, chain_config: &ChainConfig) -> KeyChainResult<String> {
        Ok(self.watching_key()?.serialize_pub_base58(chain_config))
    }

    /// The account private key, `xprv...` on mainnet. An encrypted chain needs `aes_key`.
    pub fn spending_key_base58(
        &self,
        chain_config: &ChainConfig,
        aes_key: Option<&SymmetricKey>,
    ) -> KeyChainResult<String> {
        let account_key = self.state.lock().account_key()?.clone();
        ensure!(!account_key.is_watching(), KeyChainError::MissingPrivateKey);
        account_key.serialize_priv_base58(chain_config, aes_key)
    }

    /// A dump of the chain: the seed, the account key and one line per key. Private keys and
    /// seed words are only shown with `include_private_keys`, which needs `aes_key` on an
    /// encrypted chain.
    pub fn describe(
        &self,
        chain_config: &ChainConfig,
        include_lookahead: bool,
        include_private_keys: bool,
        aes_key: Option<&SymmetricKey>,
    ) -> KeyChainResult<String> {
        let include_private_keys = include_private_keys && !self.is_watching();
        if include_private_keys && self.is_encrypted() {
            let aes_key = aes_key.ok_or(KeyChainError::EncryptionKeyRequired)?;
            ensure!(self.check_aes_key(aes_key)?, KeyChainError::BadPassword);
        }

        let mut lines = Vec::new();
        if let Some(seed) = self.seed() {
            if include_private_keys {
                let seed = match aes_key.filter(|_| seed.is_encrypted()) {
                    Some(aes_key) => seed.decrypt(aes_key)?,
                    None => seed.clone(),
                };
                if let Some(mnemonic) = seed.mnemonic() {
                    lines.push(format!("Seed as words:      {mnemonic}"));
                }
                if let Some(seed_bytes) = seed.seed_bytes() {
                    lines.push(format!("Seed as hex:        {}", hex::encode(seed_bytes)));
                }
            } else if seed.is_encrypted() {
                lines.push("Seed is encrypted".to_owned());
            }
            lines.push(format!("Seed birthday:      {}", seed.creation_time()));
        } else {
            lines.push(format!(
                "Key birthday:       {}",
                self.earliest_key_creation_time()?
            ));
        }
        lines.push(format!("Output script type: {}", self.output_script_type()));
        lines.push(format!(
            "Key to watch:       {}",
            self.watching_key_base58(chain_config)?
        ));
        lines.push(format!(
            "Lookahead:          {}/{}",
            self.lookahead_size(),
            self.lookahead_threshold()
        ));

        if self.is_married() {
            for following in self.following_chains() {
                lines.push(format!(
                    "Following chain:    {}",
                    following.watching_key_base58(chain_config)?
                ));
            }
            lines.push(format!(
                "Sigs to spend:      {}",
                self.sigs_required_to_spend()
            ));
            for key in self.keys(include_lookahead, false) {
                let redeem_data = self.redeem_data(&key)?;
                let address = Address::from_redeem_script(chain_config, redeem_data.redeem_script())?;
                lines.push(format!("  addr:{address}  ({})", key.path()));
            }
        } else {
            let script_type = self.output_script_type();
            for key in self.keys(include_lookahead, true) {
                let address = Address::from_public_key(chain_config, key.public_key(), script_type)?;
                lines.push(format!(
                    "  addr:{address}  hash160:{}  ({})",
                    key.pubkey_hash(),
                    key.path()
                ));
                if include_private_keys {
                    let private_key = self.private_key_for(key.path(), aes_key)?;
                    lines.push(format!("  priv:{}", hex::encode(private_key.to_bytes())));
                }
            }
        }
        Ok(lines.join("\n"))
    }
}
