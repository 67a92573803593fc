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

//! The persisted form of key chains: a flat list of key records

use parity_scale_codec::{Decode, DecodeAll, Encode};
use script::ScriptType;

use super::{crypter::EncryptedData, KeyChainError, KeyChainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum KeyType {
    /// A standalone key, with its secret in plain form or without a secret at all
    #[codec(index = 1)]
    Original,
    /// A standalone key with an encrypted secret
    #[codec(index = 2)]
    EncryptedAead,
    /// The seed of a deterministic chain
    #[codec(index = 3)]
    DeterministicMnemonic,
    /// A key of a deterministic chain
    #[codec(index = 4)]
    DeterministicKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct DeterministicKeyRecord {
    pub chain_code: Vec<u8>,
    /// BIP32 child indexes, hardened ones with the top bit set
    pub path: Vec<u32>,
    /// Set on the branch parent keys, the number of keys handed out from the branch
    pub issued_subkeys: Option<u32>,
    pub lookahead_size: Option<u32>,
    pub lookahead_threshold: Option<u32>,
    /// Marks the account key of a chain that follows a married chain
    pub is_following: bool,
    /// One unless the chain is married
    pub sigs_required_to_spend: u32,
    /// Set on the first key of a chain that does not start at the root
    pub parent_fingerprint: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct KeyRecord {
    pub key_type: KeyType,
    /// The private key, or the mnemonic for a seed record
    pub secret_bytes: Option<Vec<u8>>,
    /// Encrypted private key, or encrypted mnemonic for a seed record
    pub encrypted_data: Option<EncryptedData>,
    pub public_key: Option<Vec<u8>>,
    pub creation_timestamp_ms: Option<u64>,
    pub deterministic_key: Option<DeterministicKeyRecord>,
    pub deterministic_seed: Option<Vec<u8>>,
    pub encrypted_deterministic_seed: Option<EncryptedData>,
    pub output_script_type: Option<ScriptType>,
}

impl KeyRecord {
    /// A record with every optional field empty
    pub fn new(key_type: KeyType) -> Self {
        Self {
            key_type,
            secret_bytes: None,
            encrypted_data: None,
            public_key: None,
            creation_timestamp_ms: None,
            deterministic_key: None,
            deterministic_seed: None,
            encrypted_deterministic_seed: None,
            output_script_type: None,
        }
    }
}

pub fn encode_records(records: &[KeyRecord]) -> Vec<u8> {
    records.encode()
}

pub fn decode_records(bytes: &[u8]) -> KeyChainResult<Vec<KeyRecord>> {
    Vec::<KeyRecord>::decode_all(&mut &*bytes)
        .map_err(|e| KeyChainError::UnreadableWallet(format!("Malformed key records: {e}")))
}
