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

use common::address::ScriptHash;
use crypto::key::PublicKey;
use script::{standard, Script};

use super::KeyChainResult;

/// A redeem script together with the keys that appear in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemData {
    keys: Vec<PublicKey>,
    redeem_script: Script,
}

impl RedeemData {
    pub fn new(keys: Vec<PublicKey>, redeem_script: Script) -> Self {
        Self {
            keys,
            redeem_script,
        }
    }

    /// A `threshold`-of-n multisig over `keys`, in the given order
    pub fn multisig(threshold: usize, keys: Vec<PublicKey>) -> KeyChainResult<Self> {
        let redeem_script = standard::multisig_redeem_script(threshold, &keys)?;
        Ok(Self::new(keys, redeem_script))
    }

    pub fn keys(&self) -> &[PublicKey] {
        &self.keys
    }

    pub fn redeem_script(&self) -> &Script {
        &self.redeem_script
    }

    pub fn script_hash(&self) -> ScriptHash {
        ScriptHash::from(&self.redeem_script)
    }

    /// The P2SH output paying to the redeem script
    pub fn output_script(&self) -> Script {
        standard::p2sh_output(self.script_hash().as_bytes())
    }

    /// Signatures needed to spend, `None` if the redeem script is not a multisig
    pub fn threshold(&self) -> Option<usize> {
        standard::parse_multisig(&self.redeem_script).map(|(threshold, _)| threshold)
    }

    pub fn contains_key(&self, key: &PublicKey) -> bool {
        self.keys.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(hex_str: &str) -> PublicKey {
        PublicKey::from_bytes(&hex::decode(hex_str).unwrap()).unwrap()
    }

    #[test]
    fn two_of_three() {
        let keys = vec![
            key("026666422d00f1b308fc7527198749f06fedb028b979c09f60d0348ef79c985e41"),
            key("0384257cf895f1ca492bbee5d7485ae0ef479036fdf59e15b92e37970a98d6fe75"),
            key("030247a355c3263a69dce173ac12fcc49408260b76b089ab02dc68f3389fc57cb8"),
        ];
        let data = RedeemData::multisig(2, keys.clone()).unwrap();
        assert_eq!(data.keys(), keys.as_slice());
        assert_eq!(data.threshold(), Some(2));
        assert!(data.contains_key(&keys[1]));
        assert_eq!(
            standard::parse_multisig(data.redeem_script()),
            Some((2, keys.clone()))
        );
        assert_eq!(data.script_hash(), ScriptHash::from(data.redeem_script()));
        assert_eq!(
            data.output_script(),
            standard::p2sh_output(data.script_hash().as_bytes())
        );

        // Key order matters
        let mut reversed = keys.clone();
        reversed.reverse();
        let other = RedeemData::multisig(2, reversed).unwrap();
        assert_ne!(other.script_hash(), data.script_hash());

        assert!(RedeemData::multisig(4, keys).is_err());
    }
}
