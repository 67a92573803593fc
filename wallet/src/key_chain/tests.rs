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
use std::time::Duration;

use common::chain::{create_mainnet, create_testnet};
use common::time_getter::TimeGetter;
use rstest::rstest;
use script::ScriptType;
use test_utils::random::{make_seedable_rng, Seed};

use super::*;
use crate::key_chain::config::TEST_KDF_CONFIG;

const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
const CREATION_TIME: u64 = 1_389_353_062;

fn test_config() -> KeyChainConfig {
    KeyChainConfig::new()
        .with_lookahead_size(10)
        .with_kdf_config(TEST_KDF_CONFIG)
        .with_time_getter(TimeGetter::fixed(Duration::from_secs(CREATION_TIME)))
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn basic_chain_reuses_its_first_key(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let chain = BasicKeyChain::new(None, TimeGetter::fixed(Duration::from_secs(CREATION_TIME)));

    let key = chain.get_key(&mut rng).unwrap();
    assert_eq!(chain.get_key(&mut rng).unwrap(), key);
    assert_eq!(chain.num_keys(), 1);
    assert_eq!(key.creation_time(), CREATION_TIME);

    let found = FoundKey::Standalone(key.clone());
    assert_eq!(found.to_string(), hex::encode(key.public_key().to_bytes()));
    assert_eq!(found.pubkey_hash(), key.pubkey_hash());
    assert!(found.into_deterministic().is_none());
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn restore_from_mnemonic(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let restored = DeterministicSeed::from_mnemonic(MNEMONIC, "", CREATION_TIME).unwrap();
    let mut group = KeyChainGroup::builder(Arc::new(create_mainnet()), test_config())
        .from_seed(restored.clone(), ScriptType::P2pkh, &mut rng)
        .unwrap()
        .build()
        .unwrap();

    let address = group.current_address(KeyPurpose::ReceiveFunds).unwrap();
    assert_eq!(address.to_string(), "17871ErDqdevLTLWBH6WzjUc1EKGDQzCMA");

    let key = group.current_key(KeyPurpose::ReceiveFunds).unwrap();
    let found = group.find_key_from_pub_key_hash(&key.pubkey_hash(), None).unwrap();
    assert_eq!(
        found.to_string(),
        "026666422d00f1b308fc7527198749f06fedb028b979c09f60d0348ef79c985e41 (m/0'/0/0)"
    );
    assert!(!found.is_encrypted());
    assert_eq!(found.into_deterministic(), Some(key));

    // Same seed, other network
    let mut testnet = KeyChainGroup::builder(Arc::new(create_testnet()), test_config())
        .from_seed(restored, ScriptType::P2pkh, &mut rng)
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(
        testnet.current_address(KeyPurpose::ReceiveFunds).unwrap().to_string(),
        "mme4JHwCef6B7Zp7tr4tpegvsDuy4ndy8d"
    );
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn written_down_words_restore_the_wallet(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let chain_config = Arc::new(create_mainnet());
    let mut group = KeyChainGroup::new_random(Arc::clone(&chain_config), test_config(), &mut rng)
        .unwrap();
    let words = group
        .active_key_chain()
        .unwrap()
        .seed()
        .unwrap()
        .mnemonic()
        .unwrap()
        .to_owned();
    assert_eq!(words.split(' ').count(), 12);

    let restored_seed = DeterministicSeed::from_mnemonic(&words, "", CREATION_TIME).unwrap();
    let mut restored = KeyChainGroup::builder(chain_config, test_config())
        .from_seed(restored_seed, ScriptType::P2wpkh, &mut rng)
        .unwrap()
        .build()
        .unwrap();
    for purpose in [KeyPurpose::ReceiveFunds, KeyPurpose::Change] {
        assert_eq!(
            restored.current_address(purpose).unwrap(),
            group.current_address(purpose).unwrap()
        );
    }
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn encrypted_wallet_survives_a_reload(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let chain_config = Arc::new(create_mainnet());
    let config = test_config();
    let mut group =
        KeyChainGroup::new_random(Arc::clone(&chain_config), config.clone(), &mut rng).unwrap();
    let imported = WalletKey::new_random(&mut rng, CREATION_TIME);
    group.import_keys(vec![imported.clone()]).unwrap();
    let address = group.current_address(KeyPurpose::ReceiveFunds).unwrap();
    let key = group.current_key(KeyPurpose::ReceiveFunds).unwrap();
    let private_key = group.private_key_for(key.public_key(), None).unwrap().unwrap();

    let crypter = KeyCrypter::new_with_rng(&mut rng, *config.kdf_config());
    let aes_key = crypter.derive_key("hunter2").unwrap();
    group.encrypt(crypter.clone(), &aes_key, &mut rng).unwrap();
    let bytes = encode_records(&group.to_records());

    let records = decode_records(&bytes).unwrap();
    assert!(records.iter().all(|record| record.secret_bytes.is_none()));
    let mut loaded =
        KeyChainGroup::from_records_encrypted(chain_config, config, &records, crypter).unwrap();
    assert!(loaded.check_password("hunter2").unwrap());
    assert!(!loaded.check_password("hunter3").unwrap());
    assert_eq!(loaded.current_address(KeyPurpose::ReceiveFunds).unwrap(), address);
    assert_eq!(
        loaded.private_key_for(key.public_key(), Some(&aes_key)),
        Ok(Some(private_key))
    );
    assert_eq!(
        loaded.private_key_for(key.public_key(), None),
        Err(KeyChainError::EncryptionKeyRequired)
    );

    loaded.decrypt(&aes_key).unwrap();
    assert_eq!(loaded.imported_keys(), vec![imported]);
}

#[test]
fn purposes_and_branches() {
    let external: Vec<_> =
        KeyPurpose::ALL.into_iter().filter(|purpose| purpose.branch() == Branch::External).collect();
    assert_eq!(external, [KeyPurpose::ReceiveFunds, KeyPurpose::Refund]);
    assert_eq!(KeyPurpose::Change.branch(), Branch::Internal);
    assert_eq!(KeyPurpose::Authentication.branch(), Branch::Internal);
}
