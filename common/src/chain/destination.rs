// Copyright (c) 2021 RBB S.r.l
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

use crypto::key::PublicKey;
use script::{standard, Script, ScriptType};

use crate::address::{PublicKeyHash, ScriptHash};

/// What an output pays to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Destination {
    PublicKeyHash(PublicKeyHash),
    WitnessPublicKeyHash(PublicKeyHash),
    ScriptHash(ScriptHash),
}

impl Destination {
    /// The single-key destination of the given type. A key alone cannot describe a P2SH output.
    pub fn from_public_key(public_key: &PublicKey, script_type: ScriptType) -> Option<Self> {
        let hash = PublicKeyHash::from(public_key);
        match script_type {
            ScriptType::P2pkh => Some(Destination::PublicKeyHash(hash)),
            ScriptType::P2wpkh => Some(Destination::WitnessPublicKeyHash(hash)),
            ScriptType::P2sh => None,
        }
    }

    pub fn from_redeem_script(redeem_script: &Script) -> Self {
        Destination::ScriptHash(ScriptHash::from(redeem_script))
    }

    pub fn from_output_script(script: &Script) -> Option<Self> {
        let (script_type, hash) = standard::output_hash(script)?;
        let destination = match script_type {
            ScriptType::P2pkh => Destination::PublicKeyHash(PublicKeyHash::from_bytes(hash)),
            ScriptType::P2wpkh => {
                Destination::WitnessPublicKeyHash(PublicKeyHash::from_bytes(hash))
            }
            ScriptType::P2sh => Destination::ScriptHash(ScriptHash::from_bytes(hash)),
        };
        Some(destination)
    }

    pub fn script_type(&self) -> ScriptType {
        match self {
            Destination::PublicKeyHash(_) => ScriptType::P2pkh,
            Destination::WitnessPublicKeyHash(_) => ScriptType::P2wpkh,
            Destination::ScriptHash(_) => ScriptType::P2sh,
        }
    }

    pub fn to_output_script(&self) -> Script {
        match self {
            Destination::PublicKeyHash(hash) => standard::p2pkh_output(hash.as_bytes()),
            Destination::WitnessPublicKeyHash(hash) => standard::p2wpkh_output(hash.as_bytes()),
            Destination::ScriptHash(hash) => standard::p2sh_output(hash.as_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_script_roundtrip() {
        let pk = PublicKey::from_bytes(
            &hex::decode("026666422d00f1b308fc7527198749f06fedb028b979c09f60d0348ef79c985e41")
                .unwrap(),
        )
        .unwrap();

        for script_type in [ScriptType::P2pkh, ScriptType::P2wpkh] {
            let destination = Destination::from_public_key(&pk, script_type).unwrap();
            assert_eq!(destination.script_type(), script_type);
            let script = destination.to_output_script();
            assert_eq!(Destination::from_output_script(&script), Some(destination));
        }
        assert_eq!(Destination::from_public_key(&pk, ScriptType::P2sh), None);

        let redeem = script::Builder::new().push_int(1).into_script();
        let p2sh = Destination::from_redeem_script(&redeem);
        assert_eq!(p2sh.script_type(), ScriptType::P2sh);
        assert_eq!(
            Destination::from_output_script(&p2sh.to_output_script()),
            Some(p2sh)
        );
    }
}
