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

use common::{address::PublicKeyHash, chain::ChainConfig, primitives::time::Seconds};
use crypto::{
    key::{
        extended::{ExtendedPrivateKey, ExtendedPublicKey, Fingerprint},
        hdkd::{
            chain_code::ChainCode,
            child_number::ChildNumber,
            derivable::{Derivable, DerivationError},
            derivation_path::DerivationPath,
        },
        PrivateKey, PublicKey,
    },
    random::{CryptoRng, Rng},
    symkey::SymmetricKey,
};

use super::{
    crypter::{EncryptedData, KeyCrypter},
    wallet_key::KeySecret,
    KeyChainResult,
};

/// A key in a hierarchy: the extended public key plus whatever private material the wallet has
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterministicKey {
    xpub: ExtendedPublicKey,
    secret: KeySecret,
    /// Only kept for the root and account keys, zero otherwise
    creation_time: Seconds,
}

impl DeterministicKey {
    pub fn from_private(xpriv: ExtendedPrivateKey, creation_time: Seconds) -> Self {
        Self {
            xpub: xpriv.to_public_key(),
            secret: KeySecret::Plain(xpriv.private_key().clone()),
            creation_time,
        }
    }

    pub fn from_public(xpub: ExtendedPublicKey, creation_time: Seconds) -> Self {
        Self {
            xpub,
            secret: KeySecret::Absent,
            creation_time,
        }
    }

    pub fn from_encrypted(
        xpub: ExtendedPublicKey,
        data: EncryptedData,
        crypter: KeyCrypter,
        creation_time: Seconds,
    ) -> Self {
        Self {
            xpub,
            secret: KeySecret::Encrypted { data, crypter },
            creation_time,
        }
    }

    pub fn from_parts(xpub: ExtendedPublicKey, secret: KeySecret, creation_time: Seconds) -> Self {
        Self {
            xpub,
            secret,
            creation_time,
        }
    }

    pub fn path(&self) -> &DerivationPath {
        self.xpub.get_derivation_path()
    }

    pub fn depth(&self) -> usize {
        self.path().len()
    }

    /// The child number of this key, `None` for a master key
    pub fn child_number(&self) -> Option<ChildNumber> {
        self.path().last()
    }

    pub fn parent_path(&self) -> Option<DerivationPath> {
        self.path().parent()
    }

    pub fn chain_code(&self) -> ChainCode {
        self.xpub.chain_code()
    }

    pub fn public_key(&self) -> &PublicKey {
        self.xpub.public_key()
    }

    pub fn pubkey_hash(&self) -> PublicKeyHash {
        PublicKeyHash::from(self.public_key())
    }

    pub fn extended_public_key(&self) -> &ExtendedPublicKey {
        &self.xpub
    }

    pub fn parent_fingerprint(&self) -> Fingerprint {
        self.xpub.parent_fingerprint()
    }

    pub fn with_parent_fingerprint(mut self, parent_fingerprint: Fingerprint) -> Self {
        self.xpub = self.xpub.with_parent_fingerprint(parent_fingerprint);
        self
    }

    /// The BIP32 serialization of the public key, `xpub...` on mainnet
    pub fn serialize_pub_base58(&self, chain_config: &ChainConfig) -> String {
        self.xpub.to_base58(chain_config.bip32_public_version())
    }

    /// The BIP32 serialization of the private key, `xprv...` on mainnet. Encrypted keys need
    /// `aes_key`.
    pub fn serialize_priv_base58(
        &self,
        chain_config: &ChainConfig,
        aes_key: Option<&SymmetricKey>,
    ) -> KeyChainResult<String> {
        let xpriv = self.decrypted_extended_private_key(aes_key)?;
        Ok(xpriv.to_base58(chain_config.bip32_private_version()))
    }

    pub fn secret(&self) -> &KeySecret {
        &self.secret
    }

    pub fn creation_time(&self) -> Seconds {
        self.creation_time
    }

    pub fn set_creation_time(&mut self, creation_time: Seconds) {
        self.creation_time = creation_time;
    }

    pub fn is_watching(&self) -> bool {
        self.secret.is_absent()
    }

    pub fn is_encrypted(&self) -> bool {
        self.secret.is_encrypted()
    }

    pub fn is_pubkey_only(&self) -> bool {
        !self.secret.is_plain()
    }

    /// A copy of this key without any private material
    pub fn drop_private_bytes(&self) -> DeterministicKey {
        Self {
            xpub: self.xpub.clone(),
            secret: KeySecret::Absent,
            creation_time: self.creation_time,
        }
    }

    pub fn extended_private_key(&self) -> Option<ExtendedPrivateKey> {
        match &self.secret {
            KeySecret::Plain(private_key) => Some(self.make_xpriv(private_key.clone())),
            KeySecret::Encrypted { .. } | KeySecret::Absent => None,
        }
    }

    /// The extended private key, decrypting it with `aes_key` if needed
    pub fn decrypted_extended_private_key(
        &self,
        aes_key: Option<&SymmetricKey>,
    ) -> KeyChainResult<ExtendedPrivateKey> {
        let private_key = self.secret.private_key(aes_key)?;
        Ok(self.make_xpriv(private_key))
    }

    fn make_xpriv(&self, private_key: PrivateKey) -> ExtendedPrivateKey {
        ExtendedPrivateKey::from_parts(self.path().clone(), self.chain_code(), private_key)
            .with_parent_fingerprint(self.parent_fingerprint())
    }

    /// Derive a child. The child keeps private material only if this key has it in plain form.
    pub fn derive_child(&self, num: ChildNumber) -> Result<DeterministicKey, DerivationError> {
        match self.extended_private_key() {
            Some(xpriv) => Ok(Self::from_private(xpriv.derive_child(num)?, 0)),
            None => Ok(Self::from_public(self.xpub.clone().derive_child(num)?, 0)),
        }
    }

    pub fn encrypt(
        &self,
        crypter: &KeyCrypter,
        aes_key: &SymmetricKey,
        rng: &mut (impl Rng + CryptoRng),
    ) -> KeyChainResult<DeterministicKey> {
        Ok(Self {
            xpub: self.xpub.clone(),
            secret: self.secret.encrypt(crypter, aes_key, rng)?,
            creation_time: self.creation_time,
        })
    }

    pub fn decrypt(&self, aes_key: &SymmetricKey) -> KeyChainResult<DeterministicKey> {
        Ok(Self {
            xpub: self.xpub.clone(),
            secret: self.secret.decrypt(aes_key, self.public_key())?,
            creation_time: self.creation_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;
    use test_utils::random::{make_seedable_rng, Seed};

    use super::super::{config::TEST_KDF_CONFIG, KeyChainError};
    use super::*;

    const SEED: &str = "5eb00bbddcf069084889a8ab9155568165f5c453ccb85e70811aaed6f6da5fc19a5ac40b389cd370d086206dec8aa6c43daea6690f20ad3d8d48b2d2ce9e38e4";

    fn master() -> DeterministicKey {
        let xpriv = ExtendedPrivateKey::new_master(&hex::decode(SEED).unwrap()).unwrap();
        DeterministicKey::from_private(xpriv, 1_389_353_062)
    }

    #[test]
    fn derivation_keeps_path_and_material() {
        let master = master();
        assert_eq!(master.depth(), 0);
        assert_eq!(master.child_number(), None);
        assert_eq!(master.parent_path(), None);

        let account = master.derive_child(ChildNumber::ZERO_HARDENED).unwrap();
        assert_eq!(account.path().to_string(), "m/0'");
        assert_eq!(account.creation_time(), 0);
        assert_eq!(
            hex::encode(account.public_key().to_bytes()),
            "027f1d87730e460e921b382242911565bf93daf2081ed685b2edd1d01176b2c13c"
        );
        assert_eq!(
            hex::encode(account.chain_code().as_bytes()),
            "f1c03f5ff97108912fd56761d3fada8879e4173aba45f10da4bbd94b1c497160"
        );

        let leaf = account
            .derive_child(ChildNumber::ZERO)
            .and_then(|k| k.derive_child(ChildNumber::ZERO))
            .unwrap();
        assert_eq!(leaf.path(), &DerivationPath::from_str("m/0'/0/0").unwrap());
        assert_eq!(leaf.depth(), 3);
        assert_eq!(leaf.parent_path().unwrap().to_string(), "m/0'/0");
        assert_eq!(
            hex::encode(leaf.extended_private_key().unwrap().private_key().to_bytes()),
            "e81fa7bb95cc6bee975bf675bfebbab4044c1390e6a00ae246e55c07e3cf835e"
        );
        assert_eq!(
            hex::encode(leaf.pubkey_hash().as_bytes()),
            "4328adace54072cd069abf108f97cf80420b212b"
        );

        // Public derivation gives the same public key
        let watching_account = account.drop_private_bytes();
        assert!(watching_account.is_watching());
        let public_leaf = watching_account
            .derive_child(ChildNumber::ZERO)
            .and_then(|k| k.derive_child(ChildNumber::ZERO))
            .unwrap();
        assert!(public_leaf.is_watching());
        assert_eq!(public_leaf.extended_public_key(), leaf.extended_public_key());

        assert_eq!(
            watching_account.derive_child(ChildNumber::ONE_HARDENED),
            Err(DerivationError::CannotDeriveHardenedKeyFromPublicKey(
                ChildNumber::ONE_HARDENED
            ))
        );
    }

    #[rstest]
    #[trace]
    #[case(Seed::from_entropy())]
    fn encrypted_keys_derive_publicly(#[case] seed: Seed) {
        let mut rng = make_seedable_rng(seed);
        let crypter = KeyCrypter::new_with_rng(&mut rng, TEST_KDF_CONFIG);
        let aes_key = crypter.derive_key("hunter2").unwrap();

        let master = master();
        let encrypted = master.encrypt(&crypter, &aes_key, &mut rng).unwrap();
        assert!(encrypted.is_encrypted());
        assert!(encrypted.extended_private_key().is_none());
        assert_eq!(encrypted.creation_time(), master.creation_time());

        let child = encrypted.derive_child(ChildNumber::ONE).unwrap();
        assert!(child.is_watching());
        assert_eq!(
            child.public_key(),
            master.derive_child(ChildNumber::ONE).unwrap().public_key()
        );

        assert_eq!(
            encrypted.decrypted_extended_private_key(None),
            Err(KeyChainError::EncryptionKeyRequired)
        );
        assert_eq!(
            encrypted.decrypted_extended_private_key(Some(&aes_key)).unwrap(),
            master.extended_private_key().unwrap()
        );
        assert_eq!(encrypted.decrypt(&aes_key).unwrap(), master);
    }
}
