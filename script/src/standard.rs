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

//! Standard output templates.

use crypto::{hash::HASH160_LENGTH, key::PublicKey};
use parity_scale_codec::{Decode, Encode};

use crate::{
    error::{Error, Result},
    opcodes::all as opc,
    script::{Builder, Instruction, Script},
};

/// Bare multisig is limited to 16 keys by the small integer opcodes.
pub const MAX_MULTISIG_KEYS: usize = 16;

/// The kind of output a key or a chain pays to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
pub enum ScriptType {
    #[codec(index = 1)]
    P2pkh,
    #[codec(index = 3)]
    P2sh,
    #[codec(index = 4)]
    P2wpkh,
}

impl ScriptType {
    pub const fn name(&self) -> &'static str {
        match self {
            ScriptType::P2pkh => "P2PKH",
            ScriptType::P2sh => "P2SH",
            ScriptType::P2wpkh => "P2WPKH",
        }
    }

    /// Recognize one of the standard output templates.
    pub fn classify(script: &Script) -> Option<ScriptType> {
        let bytes = script.as_bytes();
        if is_p2pkh(bytes) {
            Some(ScriptType::P2pkh)
        } else if is_p2sh(bytes) {
            Some(ScriptType::P2sh)
        } else if is_p2wpkh(bytes) {
            Some(ScriptType::P2wpkh)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

const PUSH_HASH160: u8 = HASH160_LENGTH as u8;

fn is_p2pkh(b: &[u8]) -> bool {
    b.len() == 25
        && b[0] == opc::OP_DUP.into_u8()
        && b[1] == opc::OP_HASH160.into_u8()
        && b[2] == PUSH_HASH160
        && b[23] == opc::OP_EQUALVERIFY.into_u8()
        && b[24] == opc::OP_CHECKSIG.into_u8()
}

fn is_p2sh(b: &[u8]) -> bool {
    b.len() == 23
        && b[0] == opc::OP_HASH160.into_u8()
        && b[1] == PUSH_HASH160
        && b[22] == opc::OP_EQUAL.into_u8()
}

fn is_p2wpkh(b: &[u8]) -> bool {
    b.len() == 22 && b[0] == opc::OP_0.into_u8() && b[1] == PUSH_HASH160
}

/// The 20-byte hash an output script of a known template pays to.
pub fn output_hash(script: &Script) -> Option<(ScriptType, [u8; HASH160_LENGTH])> {
    let script_type = ScriptType::classify(script)?;
    let offset = match script_type {
        ScriptType::P2pkh => 3,
        ScriptType::P2sh | ScriptType::P2wpkh => 2,
    };
    let mut hash = [0u8; HASH160_LENGTH];
    hash.copy_from_slice(&script.as_bytes()[offset..offset + HASH160_LENGTH]);
    Some((script_type, hash))
}

/// OP_DUP OP_HASH160 <pubkey hash> OP_EQUALVERIFY OP_CHECKSIG
pub fn p2pkh_output(pubkey_hash: &[u8; HASH160_LENGTH]) -> Script {
    Builder::new()
        .push_opcode(opc::OP_DUP)
        .push_opcode(opc::OP_HASH160)
        .push_slice(pubkey_hash)
        .push_opcode(opc::OP_EQUALVERIFY)
        .push_opcode(opc::OP_CHECKSIG)
        .into_script()
}

/// OP_0 <pubkey hash>
pub fn p2wpkh_output(pubkey_hash: &[u8; HASH160_LENGTH]) -> Script {
    Builder::new().push_opcode(opc::OP_0).push_slice(pubkey_hash).into_script()
}

/// OP_HASH160 <script hash> OP_EQUAL
pub fn p2sh_output(script_hash: &[u8; HASH160_LENGTH]) -> Script {
    Builder::new()
        .push_opcode(opc::OP_HASH160)
        .push_slice(script_hash)
        .push_opcode(opc::OP_EQUAL)
        .into_script()
}

/// OP_m <pubkey>... OP_n OP_CHECKMULTISIG, keys in the given order.
pub fn multisig_redeem_script(threshold: usize, keys: &[PublicKey]) -> Result<Script> {
    if keys.is_empty() || keys.len() > MAX_MULTISIG_KEYS {
        return Err(Error::InvalidMultisigKeyCount(keys.len()));
    }
    if threshold == 0 || threshold > keys.len() {
        return Err(Error::InvalidMultisigThreshold {
            threshold,
            keys: keys.len(),
        });
    }

    let builder = keys
        .iter()
        .fold(Builder::new().push_int(threshold as i64), |builder, key| {
            builder.push_slice(&key.to_bytes())
        });
    Ok(builder
        .push_int(keys.len() as i64)
        .push_opcode(opc::OP_CHECKMULTISIG)
        .into_script())
}

/// Threshold and keys of a multisig redeem script produced by [multisig_redeem_script].
pub fn parse_multisig(script: &Script) -> Option<(usize, Vec<PublicKey>)> {
    let instructions: Vec<_> = script.instructions().collect::<Result<_>>().ok()?;
    let (first, rest) = instructions.split_first()?;
    let (last, rest) = rest.split_last()?;
    let (count, keys) = rest.split_last()?;

    let small_int = |instr: &Instruction| match instr {
        Instruction::Op(op) => op.small_int().map(usize::from),
        Instruction::PushBytes(_) => None,
    };
    if *last != Instruction::Op(opc::OP_CHECKMULTISIG) {
        return None;
    }
    let threshold = small_int(first)?;
    let count = small_int(count)?;

    let keys = keys
        .iter()
        .map(|instr| match instr {
            Instruction::PushBytes(bytes) => PublicKey::from_bytes(bytes).ok(),
            Instruction::Op(_) => None,
        })
        .collect::<Option<Vec<_>>>()?;
    (count == keys.len() && threshold >= 1 && threshold <= count).then_some((threshold, keys))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pubkey(hex_str: &str) -> PublicKey {
        PublicKey::from_bytes(&hex::decode(hex_str).unwrap()).unwrap()
    }

    const PUBKEY_0: &str = "026666422d00f1b308fc7527198749f06fedb028b979c09f60d0348ef79c985e41";
    const PUBKEY_1: &str = "0384257cf895f1ca492bbee5d7485ae0ef479036fdf59e15b92e37970a98d6fe75";

    #[test]
    fn p2pkh_template() {
        let hash: [u8; 20] = hex::decode("4328adace54072cd069abf108f97cf80420b212b")
            .unwrap()
            .try_into()
            .unwrap();
        let script = p2pkh_output(&hash);
        assert_eq!(
            hex::encode(script.as_bytes()),
            "76a9144328adace54072cd069abf108f97cf80420b212b88ac"
        );
        assert_eq!(ScriptType::classify(&script), Some(ScriptType::P2pkh));
        assert_eq!(output_hash(&script), Some((ScriptType::P2pkh, hash)));

        let witness = p2wpkh_output(&hash);
        assert_eq!(
            hex::encode(witness.as_bytes()),
            "00144328adace54072cd069abf108f97cf80420b212b"
        );
        assert_eq!(output_hash(&witness), Some((ScriptType::P2wpkh, hash)));

        let p2sh = p2sh_output(&hash);
        assert_eq!(
            hex::encode(p2sh.as_bytes()),
            "a9144328adace54072cd069abf108f97cf80420b212b87"
        );
        assert_eq!(ScriptType::classify(&p2sh), Some(ScriptType::P2sh));

        assert_eq!(ScriptType::classify(&Script::new()), None);
    }

    #[test]
    fn multisig() {
        let keys = vec![pubkey(PUBKEY_0), pubkey(PUBKEY_1)];
        let script = multisig_redeem_script(2, &keys).unwrap();
        assert_eq!(
            hex::encode(script.as_bytes()),
            format!("5221{PUBKEY_0}21{PUBKEY_1}52ae")
        );
        assert_eq!(parse_multisig(&script), Some((2, keys.clone())));

        assert_eq!(
            multisig_redeem_script(3, &keys),
            Err(Error::InvalidMultisigThreshold {
                threshold: 3,
                keys: 2
            })
        );
        assert_eq!(
            multisig_redeem_script(0, &keys),
            Err(Error::InvalidMultisigThreshold {
                threshold: 0,
                keys: 2
            })
        );
        assert_eq!(
            multisig_redeem_script(1, &[]),
            Err(Error::InvalidMultisigKeyCount(0))
        );
        assert_eq!(parse_multisig(&p2sh_output(&[0; 20])), None);
    }

    #[test]
    fn script_type_codec() {
        assert_eq!(ScriptType::P2pkh.encode(), vec![1]);
        assert_eq!(ScriptType::P2wpkh.encode(), vec![4]);
        assert_eq!(ScriptType::decode(&mut &[3u8][..]).unwrap(), ScriptType::P2sh);
        assert!(ScriptType::decode(&mut &[2u8][..]).is_err());
    }
}
