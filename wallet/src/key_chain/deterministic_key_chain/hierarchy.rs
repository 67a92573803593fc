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

use std::collections::BTreeMap;

use common::address::PublicKeyHash;
use crypto::key::hdkd::derivation_path::DerivationPath;
use crypto::key::PublicKey;

use crate::key_chain::deterministic_key::DeterministicKey;

/// The derived keys of a chain, indexed by path, public key and public key hash
#[derive(Debug, Clone, Default)]
pub(super) struct Hierarchy {
    keys: BTreeMap<DerivationPath, DeterministicKey>,

    /// Paths in the order the keys were added, parents always come before their children
    order: Vec<DerivationPath>,

    by_public_key: BTreeMap<PublicKey, DerivationPath>,

    by_pubkey_hash: BTreeMap<PublicKeyHash, DerivationPath>,

    /// One past the highest child index derived so far, per parent
    num_children: BTreeMap<DerivationPath, u32>,
}

impl Hierarchy {
    /// Add a key, or replace the key with the same path
    pub fn put(&mut self, key: DeterministicKey) {
        let path = key.path().clone();

        if let Some((parent, child)) = path.parent().zip(path.last()) {
            let next = child.get_index().into_u32().saturating_add(1);
            let num_children = self.num_children.entry(parent).or_default();
            *num_children = (*num_children).max(next);
        }

        self.by_public_key.insert(key.public_key().clone(), path.clone());
        self.by_pubkey_hash.insert(key.pubkey_hash(), path.clone());
        if self.keys.insert(path.clone(), key).is_none() {
            self.order.push(path);
        }
    }

    pub fn get(&self, path: &DerivationPath) -> Option<&DeterministicKey> {
        self.keys.get(path)
    }

    pub fn find_by_public_key(&self, public_key: &PublicKey) -> Option<&DeterministicKey> {
        self.by_public_key.get(public_key).and_then(|path| self.keys.get(path))
    }

    pub fn find_by_pubkey_hash(&self, hash: &PublicKeyHash) -> Option<&DeterministicKey> {
        self.by_pubkey_hash.get(hash).and_then(|path| self.keys.get(path))
    }

    pub fn num_children(&self, parent: &DerivationPath) -> u32 {
        self.num_children.get(parent).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// All keys, in the order they were added
    pub fn iter(&self) -> impl Iterator<Item = &DeterministicKey> + '_ {
        self.order.iter().filter_map(|path| self.keys.get(path))
    }

    /// Apply `f` to every key, keeping the order
    pub fn try_map<E>(
        &self,
        mut f: impl FnMut(&DeterministicKey) -> Result<DeterministicKey, E>,
    ) -> Result<Hierarchy, E> {
        let mut result = Hierarchy::default();
        for key in self.iter() {
            result.put(f(key)?);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crypto::key::{
        extended::ExtendedPrivateKey,
        hdkd::{child_number::ChildNumber, derivable::Derivable},
    };

    use super::*;

    #[test]
    fn indexes_and_order() {
        let master = ExtendedPrivateKey::new_master(&[1; 32]).unwrap();
        let account = master.clone().derive_child(ChildNumber::ZERO_HARDENED).unwrap();
        let branch = account.clone().derive_child(ChildNumber::ZERO).unwrap();
        let leaf5 = branch
            .clone()
            .derive_absolute_path(&DerivationPath::from_str("m/0'/0/5").unwrap())
            .unwrap();

        let mut hierarchy = Hierarchy::default();
        for key in [master, account, branch, leaf5.clone()] {
            hierarchy.put(DeterministicKey::from_private(key, 0));
        }
        assert_eq!(hierarchy.len(), 4);
        assert_eq!(
            hierarchy.num_children(&DerivationPath::from_str("m/0'/0").unwrap()),
            6
        );
        assert_eq!(hierarchy.num_children(&DerivationPath::from_str("m/0'").unwrap()), 1);
        assert_eq!(hierarchy.num_children(&DerivationPath::from_str("m/0'/1").unwrap()), 0);

        let paths: Vec<String> = hierarchy.iter().map(|k| k.path().to_string()).collect();
        assert_eq!(paths, ["m", "m/0'", "m/0'/0", "m/0'/0/5"]);

        let leaf = DeterministicKey::from_private(leaf5, 0);
        assert_eq!(hierarchy.find_by_public_key(leaf.public_key()), Some(&leaf));
        assert_eq!(hierarchy.find_by_pubkey_hash(&leaf.pubkey_hash()), Some(&leaf));

        // Replacing a key keeps its position
        hierarchy.put(leaf.drop_private_bytes());
        assert_eq!(hierarchy.len(), 4);
        assert!(hierarchy.iter().last().unwrap().is_watching());

        let public_only = hierarchy
            .try_map::<()>(|k| Ok(k.drop_private_bytes()))
            .unwrap();
        assert!(public_only.iter().all(DeterministicKey::is_watching));
        assert_eq!(public_only.len(), 4);
    }
}
