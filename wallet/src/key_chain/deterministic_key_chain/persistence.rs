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

//! Deterministic chains as key records.
//!
//! A chain is stored as its seed record, if it has a seed, followed by all of its keys, parents
//! before children. The first key of a chain carries the creation time, which is how the start
//! of a chain without a seed is recognized. The branch parents carry the issued key counters and
//! the lookahead settings, the account key carries the output script type. The following chains
//! of a married chain are stored right before it, each marked on its first key.

use std::sync::Arc;

use common::primitives::time::{millis_to_seconds, seconds_to_millis};
use crypto::key::extended::{ExtendedPublicKey, Fingerprint};
use crypto::key::hdkd::{chain_code::ChainCode, derivation_path::DerivationPath};
use crypto::key::{PrivateKey, PublicKey};
use script::ScriptType;
use utils::ensure;

use super::hierarchy::Hierarchy;
use super::{default_lookahead_threshold, ChainState, DeterministicKeyChain};
use crate::key_chain::config::DEFAULT_LOOKAHEAD_SIZE;
use crate::key_chain::crypter::KeyCrypter;
use crate::key_chain::deterministic_key::DeterministicKey;
use crate::key_chain::deterministic_seed::DeterministicSeed;
use crate::key_chain::records::{DeterministicKeyRecord, KeyRecord, KeyType};
use crate::key_chain::wallet_key::KeySecret;
use crate::key_chain::with_purpose::{Branch, WithPurpose};
use crate::key_chain::{KeyChainError, KeyChainResult};

fn unreadable(reason: impl Into<String>) -> KeyChainError {
    KeyChainError::UnreadableWallet(reason.into())
}

fn seed_to_record(seed: &DeterministicSeed) -> KeyRecord {
    let mut record = KeyRecord::new(KeyType::DeterministicMnemonic);
    record.creation_timestamp_ms = Some(seconds_to_millis(seed.creation_time()));
    match seed.mnemonic() {
        Some(mnemonic) => {
            record.secret_bytes = Some(mnemonic.as_bytes().to_vec());
            record.deterministic_seed = seed.seed_bytes().map(<[u8]>::to_vec);
        }
        None => {
            record.encrypted_data = seed.encrypted_mnemonic().cloned();
            record.encrypted_deterministic_seed = seed.encrypted_seed().cloned();
        }
    }
    record
}

fn seed_from_record(
    record: &KeyRecord,
    crypter: Option<&KeyCrypter>,
) -> KeyChainResult<DeterministicSeed> {
    let creation_time = millis_to_seconds(record.creation_timestamp_ms.unwrap_or(0));
    match (&record.secret_bytes, &record.encrypted_data) {
        (Some(mnemonic), None) => {
            let mnemonic = String::from_utf8(mnemonic.clone())
                .map_err(|_| unreadable("The mnemonic is not valid UTF-8"))?;
            DeterministicSeed::from_plain_parts(
                mnemonic,
                record.deterministic_seed.clone(),
                creation_time,
            )
        }
        (None, Some(encrypted_mnemonic)) => {
            let crypter = crypter.ok_or_else(|| unreadable("Encrypted seed without a key crypter"))?;
            Ok(DeterministicSeed::from_encrypted_parts(
                encrypted_mnemonic.clone(),
                record.encrypted_deterministic_seed.clone(),
                crypter.clone(),
                creation_time,
            ))
        }
        (Some(_), Some(_)) | (None, None) => {
            Err(unreadable("A seed record needs either a plain or an encrypted mnemonic"))
        }
    }
}

fn key_from_record(
    record: &KeyRecord,
    details: &DeterministicKeyRecord,
    crypter: Option<&KeyCrypter>,
) -> KeyChainResult<DeterministicKey> {
    let public_key = record
        .public_key
        .as_deref()
        .ok_or_else(|| unreadable("Deterministic key without a public key"))
        .and_then(|bytes| {
            PublicKey::from_bytes(bytes).map_err(|e| unreadable(format!("Bad public key: {e}")))
        })?;
    let chain_code = ChainCode::try_from(details.chain_code.as_slice())
        .map_err(|_| unreadable("Bad chain code length"))?;
    let path = DerivationPath::from_encoded_indexes(&details.path)
        .map_err(|e| unreadable(format!("Bad derivation path: {e}")))?;

    let secret = match (&record.secret_bytes, &record.encrypted_data) {
        (Some(bytes), None) => {
            let private_key = PrivateKey::from_bytes(bytes)
                .map_err(|e| unreadable(format!("Bad private key at {path}: {e}")))?;
            ensure!(
                private_key.public_key() == public_key,
                unreadable(format!("Private key at {path} does not match its public key"))
            );
            KeySecret::Plain(private_key)
        }
        (None, Some(data)) => KeySecret::Encrypted {
            data: data.clone(),
            crypter: crypter
                .ok_or_else(|| unreadable(format!("Encrypted key at {path} without a key crypter")))?
                .clone(),
        },
        (None, None) => KeySecret::Absent,
        (Some(_), Some(_)) => {
            return Err(unreadable(format!("Key at {path} is both plain and encrypted")))
        }
    };

    let creation_time = millis_to_seconds(record.creation_timestamp_ms.unwrap_or(0));
    Ok(DeterministicKey::from_parts(
        ExtendedPublicKey::from_parts(path, chain_code, public_key),
        secret,
        creation_time,
    ))
}

/// The records of one chain
#[derive(Default)]
struct ChainRecords<'a> {
    seed: Option<&'a KeyRecord>,
    keys: Vec<&'a KeyRecord>,
}

impl ChainRecords<'_> {
    fn into_state(self, crypter: Option<&KeyCrypter>) -> KeyChainResult<ChainState> {
        let seed = self.seed.map(|record| seed_from_record(record, crypter)).transpose()?;

        let mut hierarchy = Hierarchy::default();
        let mut is_following = false;
        let mut output_script_type = None;
        let mut branches = Vec::new();
        for (i, record) in self.keys.iter().enumerate() {
            let details = record
                .deterministic_key
                .as_ref()
                .ok_or_else(|| unreadable("Deterministic key record without key details"))?;
            let mut key = key_from_record(record, details, crypter)?;

            if let Some(seed) = &seed {
                ensure!(
                    !(seed.is_encrypted() && key.secret().is_plain()),
                    unreadable("Plain private key in a chain with an encrypted seed")
                );
                ensure!(
                    !(!seed.is_encrypted() && key.is_encrypted()),
                    unreadable("Encrypted private key in a chain with a plain seed")
                );
            }

            if i == 0 {
                is_following = details.is_following;
                ensure!(
                    seed.is_none() || key.path().is_root(),
                    unreadable("The seed of a chain must be followed by its root key")
                );
                let parent_fingerprint =
                    details.parent_fingerprint.map_or(Fingerprint::ZERO, Fingerprint::from_u32);
                key = key.with_parent_fingerprint(parent_fingerprint);
            } else {
                let parent = key
                    .parent_path()
                    .and_then(|parent| hierarchy.get(&parent))
                    .ok_or_else(|| unreadable(format!("Key at {} has no parent", key.path())))?;
                let parent_fingerprint = Fingerprint::of(parent.public_key());
                key = key.with_parent_fingerprint(parent_fingerprint);
            }

            if details.issued_subkeys.is_some() {
                branches.push((key.path().clone(), details));
            }
            if record.output_script_type.is_some() {
                output_script_type = record.output_script_type;
            }
            hierarchy.put(key);
        }

        let find_branch = |branch: Branch| {
            branches
                .iter()
                .find(|(path, _)| path.last() == Some(branch.child_number()))
                .ok_or_else(|| unreadable(format!("Chain without its {branch:?} branch")))
        };
        let (external_path, external) = find_branch(Branch::External)?;
        let (internal_path, internal) = find_branch(Branch::Internal)?;
        let account_path = external_path
            .parent()
            .filter(|path| internal_path.parent().as_ref() == Some(path))
            .ok_or_else(|| unreadable("Branch keys of different accounts"))?;

        let mut state = ChainState::empty(
            account_path,
            output_script_type.unwrap_or(ScriptType::P2pkh),
        )?;
        ensure!(
            hierarchy.get(&state.account_path).is_some(),
            unreadable(format!("Chain without its account key {}", state.account_path))
        );

        let is_encrypted = seed.as_ref().is_some_and(DeterministicSeed::is_encrypted)
            || hierarchy.iter().any(DeterministicKey::is_encrypted);
        if is_encrypted {
            state.crypter = crypter.cloned();
        }

        if let Some(root) = seed.as_ref().filter(|seed| !seed.is_encrypted()) {
            let master = root.master_key()?.to_public_key();
            ensure!(
                hierarchy.get(&DerivationPath::empty()).map(DeterministicKey::public_key)
                    == Some(master.public_key()),
                unreadable("The root key does not match the seed")
            );
        }

        state.hierarchy = hierarchy;
        state.seed = seed;
        state.is_following = is_following;
        state.issued = WithPurpose::new(
            external.issued_subkeys.unwrap_or(0),
            internal.issued_subkeys.unwrap_or(0),
        );
        state.lookahead_size = external.lookahead_size.unwrap_or(DEFAULT_LOOKAHEAD_SIZE);
        state.lookahead_threshold = external
            .lookahead_threshold
            .unwrap_or(default_lookahead_threshold(state.lookahead_size));
        state.sigs_required_to_spend = external.sigs_required_to_spend;

        state.look_ahead()?;
        state.pending_added.clear();
        Ok(state)
    }
}

impl DeterministicKeyChain {
    /// The records of this chain, preceded by those of its following chains
    pub fn to_records(&self) -> Vec<KeyRecord> {
        let state = self.state.lock();
        let mut records = Vec::new();

        if let Some(multisig) = &state.multisig {
            for following in &multisig.following {
                records.extend(following.to_records());
            }
        }
        if let Some(seed) = &state.seed {
            records.push(seed_to_record(seed));
        }

        for (i, key) in state.hierarchy.iter().enumerate() {
            let mut record = KeyRecord::new(KeyType::DeterministicKey);
            record.public_key = Some(key.public_key().to_bytes().to_vec());
            match key.secret() {
                KeySecret::Plain(private_key) => {
                    record.secret_bytes = Some(private_key.to_bytes().to_vec())
                }
                KeySecret::Encrypted { data, .. } => record.encrypted_data = Some(data.clone()),
                KeySecret::Absent => {}
            }

            let mut details = DeterministicKeyRecord {
                chain_code: key.chain_code().as_bytes().to_vec(),
                path: key.path().to_encoded_indexes(),
                issued_subkeys: None,
                lookahead_size: None,
                lookahead_threshold: None,
                is_following: false,
                sigs_required_to_spend: 1,
                parent_fingerprint: None,
            };
            if i == 0 {
                record.creation_timestamp_ms = Some(seconds_to_millis(key.creation_time()));
                details.is_following = state.is_following;
                details.parent_fingerprint = Some(key.parent_fingerprint())
                    .filter(|fingerprint| *fingerprint != Fingerprint::ZERO)
                    .map(Fingerprint::into_u32);
            }
            if *key.path() == state.account_path {
                record.output_script_type = Some(state.output_script_type);
            }
            if let Some((branch, _)) =
                state.branch_paths.iter().find(|(_, path)| *path == key.path())
            {
                details.issued_subkeys = Some(*state.issued.get_for(branch));
                details.lookahead_size = Some(state.lookahead_size);
                details.lookahead_threshold = Some(state.lookahead_threshold);
                details.sigs_required_to_spend = state.sigs_required_to_spend;
            }
            record.deterministic_key = Some(details);
            records.push(record);
        }
        records
    }

    /// Rebuild the deterministic chains stored in `records`, skipping the records of standalone
    /// keys. `crypter` is needed if any of the chains is encrypted.
    pub fn from_records(
        records: &[KeyRecord],
        crypter: Option<&KeyCrypter>,
    ) -> KeyChainResult<Vec<DeterministicKeyChain>> {
        let mut groups: Vec<ChainRecords> = Vec::new();
        for record in records {
            match record.key_type {
                KeyType::Original | KeyType::EncryptedAead => {}
                KeyType::DeterministicMnemonic => groups.push(ChainRecords {
                    seed: Some(record),
                    keys: Vec::new(),
                }),
                KeyType::DeterministicKey => {
                    let details = record
                        .deterministic_key
                        .as_ref()
                        .ok_or_else(|| unreadable("Deterministic key record without key details"))?;
                    let starts_chain = details.is_following
                        || groups.last().map_or(true, |current| {
                            let is_first_key = current.seed.is_some() && current.keys.is_empty();
                            record.creation_timestamp_ms.is_some() && !is_first_key
                        });
                    if starts_chain {
                        groups.push(ChainRecords::default());
                    }
                    if let Some(current) = groups.last_mut() {
                        current.keys.push(record);
                    }
                }
            }
        }

        let mut chains = Vec::with_capacity(groups.len());
        let mut following = Vec::new();
        for group in groups {
            let chain = DeterministicKeyChain::from_state(group.into_state(crypter)?);
            if chain.is_following() {
                following.push(Arc::new(chain));
                continue;
            }
            if !following.is_empty() {
                chain.attach_following(std::mem::take(&mut following));
            }
            chains.push(chain);
        }
        ensure!(
            following.is_empty(),
            unreadable("Following chains without a chain to follow")
        );
        Ok(chains)
    }
}
