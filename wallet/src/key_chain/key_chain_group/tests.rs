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


use std::str::FromStr;
use std::time::Duration;

use common::chain::create_mainnet;
use common::time_getter::TimeGetter;
use crypto::key::hdkd::derivation_path::DerivationPath;
use parking_lot::Mutex;
use rstest::rstest;
use test_utils::{
    assert_matches,
    random::{make_seedable_rng, Seed},
};
use utils::eventhandler::{SameThreadExecutor, UserThread};

use super::*;
use crate::key_chain::config::{KeyChainGroupStructure, TEST_KDF_CONFIG};
use crate::key_chain::deterministic_key_chain::{DeterministicKeyChainConfig, MultisigConfig};
use crate::key_chain::records::{decode_records, encode_records};
use crate::key_chain::wallet_key::KeySecret;

const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
const CREATION_TIME: Seconds = 1_389_353_062;
const PRIVATE_KEY: &str = "e81fa7bb95cc6bee975bf675bfebbab4044c1390e6a00ae246e55c07e3cf835e";

fn mainnet() -> Arc<ChainConfig> {
    Arc::new(create_mainnet())
}

fn test_config() -> KeyChainConfig {
    KeyChainConfig::new()
        .with_lookahead_size(10)
        .with_kdf_config(TEST_KDF_CONFIG)
        .with_time_getter(TimeGetter::fixed(Duration::from_secs(CREATION_TIME)))
}

fn test_seed() -> DeterministicSeed {
    DeterministicSeed::from_mnemonic(MNEMONIC, "", CREATION_TIME).unwrap()
}

fn seed_group(
    config: KeyChainConfig,
    script_type: ScriptType,
    rng: &mut (impl Rng + CryptoRng),
) -> KeyChainGroup {
    KeyChainGroup::builder(mainnet(), config)
        .from_seed(test_seed(), script_type, rng)
        .unwrap()
        .build()
        .unwrap()
}

fn path(path: &str) -> DerivationPath {
    DerivationPath::from_str(path).unwrap()
}

fn random_account_key(rng: &mut (impl Rng + CryptoRng)) -> crypto::key::extended::ExtendedPublicKey {
    let config = DeterministicKeyChainConfig::new(ChainSource::random(0)).with_lookahead_size(1);
    let chain = DeterministicKeyChain::new(config, rng).unwrap();
    chain.watching_key().unwrap().extended_public_key().clone()
}

fn married_chain(rng: &mut (impl Rng + CryptoRng)) -> DeterministicKeyChain {
    let multisig = MultisigConfig {
        following_keys: vec![random_account_key(rng)],
        threshold: None,
    };
    let config = DeterministicKeyChainConfig::new(ChainSource::Seed(test_seed()))
        .with_lookahead_size(10)
        .with_multisig(multisig);
    DeterministicKeyChain::new(config, rng).unwrap()
}

fn script_hash_of(address: &Address) -> ScriptHash {
    match address.destination() {
        Destination::ScriptHash(script_hash) => *script_hash,
        other => panic!("Not a P2SH destination: {other:?}"),
    }
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn active_chain_is_the_newest(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let group = seed_group(test_config(), ScriptType::P2wpkh, &mut rng);

    let chains = group.deterministic_key_chains().unwrap();
    assert_eq!(chains.len(), 2);
    assert_eq!(chains[0].output_script_type(), ScriptType::P2pkh);
    assert_eq!(chains[0].account_path(), path("m/0'"));
    assert_eq!(chains[1].account_path(), path("m/1'"));
    let active = group.active_key_chain().unwrap();
    assert!(Arc::ptr_eq(&active, &chains[1]));
    assert_eq!(active.output_script_type(), ScriptType::P2wpkh);

    // Keys of the older chain are still found
    let old_key = chains[0].get_key(KeyPurpose::ReceiveFunds).unwrap();
    let hash = old_key.pubkey_hash();
    assert_eq!(
        group.find_key_from_pub_key_hash(&hash, None),
        Some(FoundKey::Hierarchy(old_key.clone()))
    );
    assert!(group.find_key_from_pub_key_hash(&hash, Some(ScriptType::P2pkh)).is_some());
    assert!(group.find_key_from_pub_key_hash(&hash, Some(ScriptType::P2wpkh)).is_none());
    assert_eq!(
        group.find_key_from_pub_key(old_key.public_key()),
        Some(FoundKey::Hierarchy(old_key.clone()))
    );
    assert!(group.has_key(old_key.public_key()));

    let p2pkh = group.active_key_chain_for(ScriptType::P2pkh, 0).unwrap().unwrap();
    assert!(Arc::ptr_eq(&p2pkh, &chains[0]));
    assert!(group
        .active_key_chain_for(ScriptType::P2wpkh, CREATION_TIME + 1)
        .unwrap()
        .is_none());
    assert_eq!(group.active_key_chains(CREATION_TIME).unwrap().len(), 2);
    assert!(group.active_key_chains(CREATION_TIME + 1).unwrap().is_empty());
    assert_eq!(group.earliest_key_creation_time().unwrap(), CREATION_TIME);
    assert!(!group.is_watching().unwrap());
    assert!(!group.is_married());
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn current_key_stays_until_used(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let mut group = seed_group(test_config(), ScriptType::P2pkh, &mut rng);

    let fresh = group.fresh_keys(KeyPurpose::ReceiveFunds, 5).unwrap();
    let fresh_paths: Vec<_> = fresh.iter().map(|key| key.path().to_string()).collect();
    assert_eq!(
        fresh_paths,
        ["m/0'/0/0", "m/0'/0/1", "m/0'/0/2", "m/0'/0/3", "m/0'/0/4"]
    );

    // Fresh keys do not become current, the next key does
    let current = group.current_key(KeyPurpose::ReceiveFunds).unwrap();
    assert_eq!(current.path(), &path("m/0'/0/5"));
    assert_eq!(
        group.current_address(KeyPurpose::ReceiveFunds).unwrap().to_string(),
        "1QFfYkmS6oJhPH7s3NH7Fdxhcaf8AS7tfz"
    );
    assert_eq!(group.current_key(KeyPurpose::ReceiveFunds).unwrap(), current);

    // Using another key leaves the current one alone
    group.mark_pub_key_as_used(fresh[2].public_key()).unwrap();
    assert_eq!(group.current_key(KeyPurpose::ReceiveFunds).unwrap(), current);

    group.mark_pub_key_hash_as_used(&current.pubkey_hash()).unwrap();
    let next = group.current_key(KeyPurpose::ReceiveFunds).unwrap();
    assert_eq!(next.path(), &path("m/0'/0/6"));

    group.mark_pub_key_as_used(next.public_key()).unwrap();
    assert_eq!(
        group.current_key(KeyPurpose::ReceiveFunds).unwrap().path(),
        &path("m/0'/0/7")
    );

    // Refund shares the external branch, change has its own
    assert_eq!(
        group.current_key(KeyPurpose::Refund).unwrap().path(),
        &path("m/0'/0/8")
    );
    assert_eq!(
        group.current_key(KeyPurpose::Change).unwrap().path(),
        &path("m/0'/1/0")
    );
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn known_addresses(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);

    let mut group = seed_group(test_config(), ScriptType::P2pkh, &mut rng);
    let receive = group.current_address(KeyPurpose::ReceiveFunds).unwrap();
    assert_eq!(receive.to_string(), "17871ErDqdevLTLWBH6WzjUc1EKGDQzCMA");
    assert_eq!(
        group.current_address(KeyPurpose::Change).unwrap().to_string(),
        "1MseVFBWLkbPeGMpkAsahBujinBq3QjGo4"
    );
    assert_eq!(
        group.fresh_address(KeyPurpose::ReceiveFunds).unwrap().to_string(),
        "1B4ynFJzDPqvuttzgF16jccWGxvdJwHSWr"
    );
    assert_eq!(group.current_address(KeyPurpose::ReceiveFunds).unwrap(), receive);

    let mut group = seed_group(test_config(), ScriptType::P2wpkh, &mut rng);
    assert_eq!(
        group.current_address(KeyPurpose::ReceiveFunds).unwrap().to_string(),
        "bc1qau4q859dce829p67ewe6wdhrkgehup6f8ket79"
    );
    assert_eq!(
        group
            .fresh_address_for(KeyPurpose::ReceiveFunds, ScriptType::P2pkh, 0)
            .unwrap()
            .to_string(),
        "17871ErDqdevLTLWBH6WzjUc1EKGDQzCMA"
    );
    assert_eq!(
        group.fresh_address_for(KeyPurpose::ReceiveFunds, ScriptType::P2sh, 0),
        Err(KeyChainError::DeterministicUpgradeRequired)
    );

    let config = test_config().with_structure(KeyChainGroupStructure::Bip43);
    let mut group = seed_group(config, ScriptType::P2wpkh, &mut rng);
    assert_eq!(
        group.current_address(KeyPurpose::ReceiveFunds).unwrap().to_string(),
        "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu"
    );
    assert_eq!(
        group
            .fresh_address_for(KeyPurpose::ReceiveFunds, ScriptType::P2pkh, 0)
            .unwrap()
            .to_string(),
        "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA"
    );
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn failed_encryption_changes_nothing(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let mut group = seed_group(test_config(), ScriptType::P2pkh, &mut rng);
    let imported: Vec<_> = (0..3).map(|_| WalletKey::new_random(&mut rng, CREATION_TIME)).collect();
    assert_eq!(group.import_keys(imported.clone()).unwrap(), 3);
    let spending_chain = group.active_key_chain().unwrap();

    // The watching chain is reached only after the standalone keys and the spending chain
    let watching = DeterministicKeyChain::new(
        DeterministicKeyChainConfig::new(ChainSource::watching(random_account_key(&mut rng), 0)),
        &mut rng,
    )
    .unwrap();
    group.add_and_activate_hd_chain(Arc::new(watching)).unwrap();

    let crypter = KeyCrypter::new_with_rng(&mut rng, TEST_KDF_CONFIG);
    let aes_key = crypter.derive_key("hunter2").unwrap();
    assert_eq!(
        group.encrypt(crypter, &aes_key, &mut rng),
        Err(KeyChainError::CannotEncryptWatchingChain)
    );

    assert!(!group.is_encrypted());
    assert!(group.key_crypter().is_none());
    let after = group.imported_keys();
    assert_eq!(after.len(), imported.len());
    assert!(imported.iter().all(|key| after.contains(key)));
    assert!(after.iter().all(|key| matches!(key.secret(), KeySecret::Plain(_))));
    let chains = group.deterministic_key_chains().unwrap();
    assert!(Arc::ptr_eq(&chains[0], &spending_chain));
    assert!(!chains[0].is_encrypted());
    assert!(chains[0].private_key_for(&path("m/0'/0/0"), None).is_ok());
    assert!(chains[1].is_watching());

    // Keys can still be created without a password
    group.fresh_keys(KeyPurpose::ReceiveFunds, 2).unwrap();
    assert_matches!(group.import_keys(vec![WalletKey::new_random(&mut rng, 0)]), Ok(1));
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn encryption(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let mut group = seed_group(test_config(), ScriptType::P2pkh, &mut rng);
    let imported: Vec<_> = (0..3).map(|_| WalletKey::new_random(&mut rng, CREATION_TIME)).collect();
    assert_eq!(group.import_keys(imported.clone()).unwrap(), 3);
    let first_key = group.current_key(KeyPurpose::ReceiveFunds).unwrap();
    let num_keys = group.num_keys().unwrap();

    let crypter = KeyCrypter::new_with_rng(&mut rng, TEST_KDF_CONFIG);
    let aes_key = crypter.derive_key("hunter2").unwrap();
    assert_eq!(group.check_password("hunter2"), Err(KeyChainError::NotEncrypted));

    group.encrypt(crypter.clone(), &aes_key, &mut rng).unwrap();
    assert!(group.is_encrypted());
    assert_eq!(group.key_crypter(), Some(&crypter));
    assert!(!group.check_password("wrong").unwrap());
    assert!(group.check_password("hunter2").unwrap());
    assert!(group.active_key_chain().unwrap().check_password("hunter2").unwrap());
    assert!(group.imported_keys().iter().all(WalletKey::is_encrypted));
    assert_eq!(
        group.encrypt(crypter.clone(), &aes_key, &mut rng),
        Err(KeyChainError::AlreadyEncrypted)
    );
    assert_eq!(
        group.private_key_for(imported[0].public_key(), None),
        Err(KeyChainError::EncryptionKeyRequired)
    );
    let private_key = group
        .private_key_for(first_key.public_key(), Some(&aes_key))
        .unwrap()
        .unwrap();
    assert_eq!(hex::encode(private_key.to_bytes()), PRIVATE_KEY);

    // Keys imported later are encrypted on the way in
    let late_key = WalletKey::new_random(&mut rng, CREATION_TIME);
    assert_eq!(
        group.import_keys(vec![late_key.clone()]),
        Err(KeyChainError::EncryptionStateMismatch)
    );
    assert_eq!(
        group.import_keys_and_encrypt(vec![late_key.clone()], &aes_key, &mut rng),
        Ok(1)
    );

    // A wrong key leaves everything encrypted
    let wrong_key = crypter.derive_key("wrong").unwrap();
    assert_eq!(group.decrypt(&wrong_key), Err(KeyChainError::BadPassword));
    assert!(group.is_encrypted());

    group.decrypt(&aes_key).unwrap();
    assert!(!group.is_encrypted());
    assert_eq!(group.decrypt(&aes_key), Err(KeyChainError::NotEncrypted));
    assert_eq!(group.num_keys().unwrap(), num_keys + 1);
    for key in imported.iter().chain(std::iter::once(&late_key)) {
        assert_eq!(
            group.find_key_from_pub_key(key.public_key()),
            Some(FoundKey::Standalone(key.clone()))
        );
    }
    assert_eq!(group.current_key(KeyPurpose::ReceiveFunds).unwrap(), first_key);
    assert_eq!(
        group.private_key_for(imported[1].public_key(), None).unwrap(),
        Some(imported[1].private_key(None).unwrap())
    );
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn groups_without_chains(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let crypter = KeyCrypter::new_with_rng(&mut rng, TEST_KDF_CONFIG);
    let aes_key = crypter.derive_key("hunter2").unwrap();

    let mut group = KeyChainGroup::builder(mainnet(), test_config()).build().unwrap();
    assert!(group.supports_deterministic_chains());
    assert!(matches!(
        group.active_key_chain(),
        Err(KeyChainError::DeterministicUpgradeRequired)
    ));
    assert_eq!(
        group.current_key(KeyPurpose::ReceiveFunds),
        Err(KeyChainError::DeterministicUpgradeRequired)
    );
    assert_eq!(group.is_watching(), Err(KeyChainError::WatchingStateUndetermined));
    assert_eq!(
        group.encrypt(crypter.clone(), &aes_key, &mut rng),
        Err(KeyChainError::NoKeysOrChains)
    );
    assert_eq!(group.earliest_key_creation_time(), Ok(Seconds::MAX));
    assert_eq!(group.combined_key_lookahead_epochs(), Ok(0));

    let mut basic = KeyChainGroup::create_basic(mainnet(), test_config());
    assert!(!basic.supports_deterministic_chains());
    assert!(matches!(
        basic.active_key_chain(),
        Err(KeyChainError::DeterministicChainsUnsupported)
    ));
    assert_eq!(
        basic.is_deterministic_upgrade_required(ScriptType::P2pkh, 0),
        Ok(false)
    );
    assert_eq!(
        basic.add_and_activate_hd_chain(Arc::new(married_chain(&mut rng))),
        Err(KeyChainError::DeterministicChainsUnsupported)
    );
    assert_eq!(
        basic.upgrade_to_deterministic(
            ScriptType::P2pkh,
            KeyChainGroupStructure::Default,
            0,
            None,
            &mut rng
        ),
        Err(KeyChainError::DeterministicChainsUnsupported)
    );

    let key = WalletKey::new_random(&mut rng, CREATION_TIME);
    basic.import_keys(vec![key.clone()]).unwrap();
    assert_eq!(basic.is_watching(), Ok(false));
    assert_eq!(basic.num_keys(), Ok(1));
    assert!(basic.remove_imported_key(key.public_key()));
    assert!(!basic.remove_imported_key(key.public_key()));
    assert_eq!(basic.num_keys(), Ok(0));
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn watching_groups(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let account_key = random_account_key(&mut rng);
    let watching = DeterministicKeyChain::new(
        DeterministicKeyChainConfig::new(ChainSource::watching(account_key, CREATION_TIME))
            .with_lookahead_size(5),
        &mut rng,
    )
    .unwrap();
    let group = KeyChainGroup::builder(mainnet(), test_config())
        .add_chain(watching)
        .build()
        .unwrap();
    assert_eq!(group.is_watching(), Ok(true));

    let crypter = KeyCrypter::new_with_rng(&mut rng, TEST_KDF_CONFIG);
    let aes_key = crypter.derive_key("hunter2").unwrap();
    let mut encrypted = KeyChainGroup::from_records_unencrypted(
        mainnet(),
        test_config(),
        &group.to_records(),
    )
    .unwrap();
    assert_eq!(
        encrypted.encrypt(crypter, &aes_key, &mut rng),
        Err(KeyChainError::CannotEncryptWatchingChain)
    );
    assert!(!encrypted.is_encrypted());

    let (_, public_key) = PrivateKey::new_from_rng(&mut rng);
    group
        .import_keys(vec![WalletKey::watching(public_key.clone(), CREATION_TIME)])
        .unwrap();
    assert_eq!(group.is_watching(), Ok(true));

    let spending = seed_group(test_config(), ScriptType::P2pkh, &mut rng);
    spending
        .import_keys(vec![WalletKey::watching(public_key, CREATION_TIME)])
        .unwrap();
    assert_eq!(
        spending.is_watching(),
        Err(KeyChainError::MixedWatchingAndSpending)
    );
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn upgrade_standalone_keys(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let private_key = PrivateKey::from_bytes(&hex::decode(PRIVATE_KEY).unwrap()).unwrap();
    let key = WalletKey::from_private_key(private_key, CREATION_TIME);

    let mut group = KeyChainGroup::builder(mainnet(), test_config()).build().unwrap();
    group.import_keys(vec![key]).unwrap();
    assert_eq!(
        group.is_deterministic_upgrade_required(ScriptType::P2wpkh, 0),
        Ok(true)
    );
    assert_eq!(
        group.upgrade_to_deterministic(
            ScriptType::P2wpkh,
            KeyChainGroupStructure::Default,
            CREATION_TIME + 1,
            None,
            &mut rng
        ),
        Err(KeyChainError::AllRandomKeysRotating)
    );

    let crypter = KeyCrypter::new_with_rng(&mut rng, TEST_KDF_CONFIG);
    let aes_key = crypter.derive_key("hunter2").unwrap();
    assert!(matches!(
        group.upgrade_to_deterministic(
            ScriptType::P2wpkh,
            KeyChainGroupStructure::Default,
            0,
            Some(&aes_key),
            &mut rng
        ),
        Err(KeyChainError::IllegalArgument(_))
    ));
    assert!(matches!(
        group.upgrade_to_deterministic(
            ScriptType::P2sh,
            KeyChainGroupStructure::Default,
            0,
            None,
            &mut rng
        ),
        Err(KeyChainError::IllegalArgument(_))
    ));

    // A key created right at the rotation time is still good
    group
        .upgrade_to_deterministic(
            ScriptType::P2wpkh,
            KeyChainGroupStructure::Default,
            CREATION_TIME,
            None,
            &mut rng,
        )
        .unwrap();

    let chains = group.deterministic_key_chains().unwrap();
    assert_eq!(chains.len(), 2);
    assert_eq!(chains[0].output_script_type(), ScriptType::P2pkh);
    assert_eq!(chains[0].account_path(), path("m/0'"));
    assert_eq!(chains[1].output_script_type(), ScriptType::P2wpkh);
    assert_eq!(chains[1].account_path(), path("m/1'"));

    let entropy = hex::decode(PRIVATE_KEY).unwrap();
    let expected = DeterministicSeed::from_entropy(&entropy[..16], "", CREATION_TIME).unwrap();
    for chain in &chains {
        let seed = chain.seed().unwrap();
        assert_eq!(seed.mnemonic(), expected.mnemonic());
        assert_eq!(chain.earliest_key_creation_time().unwrap(), CREATION_TIME);
    }
    assert_eq!(
        group.is_deterministic_upgrade_required(ScriptType::P2wpkh, 0),
        Ok(false)
    );

    // Nothing left to do
    group
        .upgrade_to_deterministic(
            ScriptType::P2wpkh,
            KeyChainGroupStructure::Default,
            0,
            None,
            &mut rng,
        )
        .unwrap();
    assert_eq!(group.deterministic_key_chains().unwrap().len(), 2);
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn upgrade_encrypted_group(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let crypter = KeyCrypter::new_with_rng(&mut rng, TEST_KDF_CONFIG);
    let aes_key = crypter.derive_key("hunter2").unwrap();

    let mut group = KeyChainGroup::builder(mainnet(), test_config()).build().unwrap();
    group
        .import_keys(vec![WalletKey::new_random(&mut rng, CREATION_TIME)])
        .unwrap();
    group.encrypt(crypter, &aes_key, &mut rng).unwrap();

    assert_eq!(
        group.upgrade_to_deterministic(
            ScriptType::P2pkh,
            KeyChainGroupStructure::Default,
            0,
            None,
            &mut rng
        ),
        Err(KeyChainError::DeterministicUpgradeRequiresPassword)
    );
    assert!(group.deterministic_key_chains().unwrap().is_empty());

    group
        .upgrade_to_deterministic(
            ScriptType::P2pkh,
            KeyChainGroupStructure::Default,
            0,
            Some(&aes_key),
            &mut rng,
        )
        .unwrap();
    let p2pkh = group.active_key_chain().unwrap();
    assert!(p2pkh.is_encrypted());
    assert_eq!(p2pkh.output_script_type(), ScriptType::P2pkh);

    // The P2WPKH step needs the password as well, the seed is encrypted
    assert_eq!(
        group.upgrade_to_deterministic(
            ScriptType::P2wpkh,
            KeyChainGroupStructure::Default,
            0,
            None,
            &mut rng
        ),
        Err(KeyChainError::DeterministicUpgradeRequiresPassword)
    );
    group
        .upgrade_to_deterministic(
            ScriptType::P2wpkh,
            KeyChainGroupStructure::Default,
            0,
            Some(&aes_key),
            &mut rng,
        )
        .unwrap();
    let p2wpkh = group.active_key_chain().unwrap();
    assert!(p2wpkh.is_encrypted());
    assert!(p2wpkh.check_aes_key(&aes_key).unwrap());

    group.decrypt(&aes_key).unwrap();
    let chains = group.deterministic_key_chains().unwrap();
    assert_eq!(
        chains[0].seed().unwrap().mnemonic(),
        chains[1].seed().unwrap().mnemonic()
    );
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn married_group(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let mut group = KeyChainGroup::builder(mainnet(), test_config())
        .add_chain(married_chain(&mut rng))
        .build()
        .unwrap();
    assert!(group.is_married());
    assert_eq!(
        group.current_key(KeyPurpose::ReceiveFunds),
        Err(KeyChainError::UnsupportedForMarriedChain)
    );
    assert_eq!(
        group.fresh_key(KeyPurpose::ReceiveFunds),
        Err(KeyChainError::UnsupportedForMarriedChain)
    );

    let address = group.current_address(KeyPurpose::ReceiveFunds).unwrap();
    assert_eq!(address.script_type(), ScriptType::P2sh);
    assert!(address.to_string().starts_with('3'));
    assert_eq!(group.current_address(KeyPurpose::ReceiveFunds).unwrap(), address);

    let redeem_data = group
        .find_redeem_data_from_script_hash(&script_hash_of(&address))
        .unwrap()
        .unwrap();
    assert_eq!(redeem_data.keys().len(), 2);
    assert_eq!(redeem_data.threshold(), Some(2));

    let active = group.active_key_chain().unwrap();
    let followed_key = active.find_key_from_pub_key(&redeem_data.keys()[0]).unwrap();
    assert_eq!(followed_key.path(), &path("m/0'/0/0"));
    assert_eq!(
        group.find_key_from_pub_key(&redeem_data.keys()[0]),
        Some(FoundKey::Hierarchy(followed_key))
    );

    let p2pkh_address =
        Address::from_public_key(&mainnet(), &redeem_data.keys()[0], ScriptType::P2pkh).unwrap();
    assert!(matches!(
        group.mark_p2sh_address_as_used(&p2pkh_address),
        Err(KeyChainError::IllegalArgument(_))
    ));

    group.mark_p2sh_address_as_used(&address).unwrap();
    let next = group.current_address(KeyPurpose::ReceiveFunds).unwrap();
    assert_ne!(next, address);
    assert_eq!(active.issued_external_keys(), 2);
    for following in active.following_chains() {
        assert_eq!(following.issued_external_keys(), 2);
    }

    // The current address survives a reload
    let records = decode_records(&encode_records(&group.to_records())).unwrap();
    let mut loaded =
        KeyChainGroup::from_records_unencrypted(mainnet(), test_config(), &records).unwrap();
    assert!(loaded.is_married());
    assert_eq!(loaded.current_address(KeyPurpose::ReceiveFunds).unwrap(), next);
    assert!(loaded
        .find_redeem_data_from_script_hash(&script_hash_of(&address))
        .unwrap()
        .is_some());
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn records_round_trip(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let mut group = seed_group(test_config(), ScriptType::P2wpkh, &mut rng);
    let imported = WalletKey::new_random(&mut rng, CREATION_TIME - 10);
    group.import_keys(vec![imported.clone()]).unwrap();
    group.fresh_keys(KeyPurpose::ReceiveFunds, 2).unwrap();
    let receive = group.current_key(KeyPurpose::ReceiveFunds).unwrap();
    let change = group.current_key(KeyPurpose::Change).unwrap();

    let records = decode_records(&encode_records(&group.to_records())).unwrap();
    let mut loaded =
        KeyChainGroup::from_records_unencrypted(mainnet(), test_config(), &records).unwrap();
    assert_eq!(loaded.num_keys(), group.num_keys());
    assert_eq!(loaded.deterministic_key_chains().unwrap().len(), 2);
    assert_eq!(
        loaded.active_key_chain().unwrap().output_script_type(),
        ScriptType::P2wpkh
    );
    assert_eq!(loaded.imported_keys(), vec![imported.clone()]);
    assert_eq!(loaded.current_key(KeyPurpose::ReceiveFunds).unwrap(), receive);
    assert_eq!(loaded.current_key(KeyPurpose::Change).unwrap(), change);
    assert_eq!(loaded.lookahead_size(), Ok(10));
    assert_eq!(loaded.earliest_key_creation_time(), Ok(CREATION_TIME - 10));

    let crypter = KeyCrypter::new_with_rng(&mut rng, TEST_KDF_CONFIG);
    let aes_key = crypter.derive_key("hunter2").unwrap();
    group.encrypt(crypter.clone(), &aes_key, &mut rng).unwrap();
    let records = decode_records(&encode_records(&group.to_records())).unwrap();
    assert!(matches!(
        KeyChainGroup::from_records_unencrypted(mainnet(), test_config(), &records),
        Err(KeyChainError::UnreadableWallet(_))
    ));
    let mut loaded =
        KeyChainGroup::from_records_encrypted(mainnet(), test_config(), &records, crypter).unwrap();
    assert!(loaded.is_encrypted());
    assert!(loaded.check_password("hunter2").unwrap());
    loaded.decrypt(&aes_key).unwrap();
    assert_eq!(loaded.imported_keys(), vec![imported]);
    assert_eq!(loaded.current_key(KeyPurpose::ReceiveFunds).unwrap(), receive);
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn bloom_filter_and_epochs(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let group = seed_group(test_config(), ScriptType::P2pkh, &mut rng);
    let imported = WalletKey::new_random(&mut rng, CREATION_TIME);
    group.import_keys(vec![imported.clone()]).unwrap();

    // Root, account, branch parents and 10 + 3 lookahead keys per branch
    assert_eq!(group.num_keys(), Ok(1 + 4 + 2 * 13));
    let count = group.bloom_filter_element_count().unwrap();
    assert_eq!(count, 2 * (1 + 4 + 2 * 13));

    let filter = group.bloom_filter(count, 0.001, 7).unwrap();
    let key = group.active_key_chain().unwrap().key_by_path(&path("m/0'/0/12")).unwrap();
    assert!(filter.contains(&imported.public_key().to_bytes()));
    assert!(filter.contains(imported.pubkey_hash().as_bytes()));
    assert!(filter.contains(&key.public_key().to_bytes()));
    assert!(filter.contains(key.pubkey_hash().as_bytes()));

    let epochs = group.combined_key_lookahead_epochs().unwrap();
    group.fresh_keys(KeyPurpose::ReceiveFunds, 1).unwrap();
    assert_eq!(group.combined_key_lookahead_epochs(), Ok(epochs));
    group.fresh_keys(KeyPurpose::ReceiveFunds, 3).unwrap();
    assert_eq!(group.combined_key_lookahead_epochs(), Ok(epochs + 1));
    assert!(group.bloom_filter_element_count().unwrap() > count);
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn lookahead_settings(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let mut group = KeyChainGroup::builder(mainnet(), test_config())
        .from_seed(test_seed(), ScriptType::P2wpkh, &mut rng)
        .unwrap()
        .lookahead_size(20)
        .lookahead_threshold(5)
        .build()
        .unwrap();
    assert_eq!(group.lookahead_size(), Ok(20));
    assert_eq!(group.lookahead_threshold(), Ok(5));
    for chain in group.deterministic_key_chains().unwrap() {
        assert_eq!(chain.lookahead_size(), 20);
        assert_eq!(chain.lookahead_threshold(), 5);
    }

    let chain = Arc::new(married_chain(&mut rng));
    group.add_and_activate_hd_chain(Arc::clone(&chain)).unwrap();
    assert_eq!(chain.lookahead_size(), 20);
    assert_eq!(chain.lookahead_threshold(), 5);
    for following in chain.following_chains() {
        assert_eq!(following.lookahead_size(), 20);
    }

    assert!(matches!(
        KeyChainGroup::builder(mainnet(), test_config())
            .from_seed(test_seed(), ScriptType::P2pkh, &mut rng)
            .unwrap()
            .lookahead_threshold(10)
            .build(),
        Err(KeyChainError::LookaheadThresholdTooLarge { threshold: 10, size: 10 })
    ));
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn merge_chains(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let mut group = seed_group(test_config(), ScriptType::P2pkh, &mut rng);
    let other = KeyChainGroup::new_random(mainnet(), test_config(), &mut rng).unwrap();
    let other_active = other.active_key_chain().unwrap();

    group.current_key(KeyPurpose::ReceiveFunds).unwrap();
    group.merge_active_key_chains(&other, 0).unwrap();
    let chains = group.deterministic_key_chains().unwrap();
    assert_eq!(chains.len(), 1 + 2);
    assert!(Arc::ptr_eq(&group.active_key_chain().unwrap(), &other_active));

    // The current key comes from the new active chain now
    let current = group.current_key(KeyPurpose::ReceiveFunds).unwrap();
    assert!(other_active.has_key(current.public_key()));

    let crypter = KeyCrypter::new_with_rng(&mut rng, TEST_KDF_CONFIG);
    let aes_key = crypter.derive_key("hunter2").unwrap();
    let mut encrypted = seed_group(test_config(), ScriptType::P2pkh, &mut rng);
    encrypted.encrypt(crypter, &aes_key, &mut rng).unwrap();
    assert!(matches!(
        encrypted.merge_active_key_chains(&other, 0),
        Err(KeyChainError::IllegalArgument(_))
    ));
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn listeners(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let mut group = seed_group(test_config(), ScriptType::P2pkh, &mut rng);

    let events = Arc::new(Mutex::new(Vec::new()));
    let events_clone = Arc::clone(&events);
    let id = group.add_listener_with_executor(
        Arc::new(move |event| {
            let KeyChainEvent::KeysAdded(keys) = event;
            events_clone.lock().push(keys);
        }),
        Arc::new(SameThreadExecutor),
    );

    let imported = WalletKey::new_random(&mut rng, CREATION_TIME);
    group.import_keys(vec![imported.clone()]).unwrap();
    assert_eq!(events.lock().as_slice(), [vec![imported.public_key().clone()]]);

    group.fresh_keys(KeyPurpose::ReceiveFunds, 4).unwrap();
    assert_eq!(events.lock().len(), 2);

    // Chains added later tell the same listeners
    let chain = Arc::new(
        DeterministicKeyChain::new(
            DeterministicKeyChainConfig::new(ChainSource::random(CREATION_TIME))
                .with_lookahead_size(10),
            &mut rng,
        )
        .unwrap(),
    );
    group.add_and_activate_hd_chain(Arc::clone(&chain)).unwrap();
    group.fresh_keys(KeyPurpose::Change, 4).unwrap();
    assert_eq!(events.lock().len(), 3);
    assert!(events.lock()[2].iter().all(|key| chain.has_key(key)));

    assert!(group.remove_listener(id));
    assert!(!group.remove_listener(id));
    group.fresh_keys(KeyPurpose::Change, 20).unwrap();
    assert_eq!(events.lock().len(), 3);
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn listeners_on_configured_executor(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let user_thread = Arc::new(UserThread::new().unwrap());
    let config = test_config().with_executor(Arc::clone(&user_thread) as Arc<dyn Executor>);
    let group = seed_group(config, ScriptType::P2pkh, &mut rng);

    let caller = std::thread::current().id();
    let events = Arc::new(Mutex::new(Vec::new()));
    let events_clone = Arc::clone(&events);
    group.add_listener(Arc::new(move |event| {
        let KeyChainEvent::KeysAdded(keys) = event;
        events_clone.lock().push((std::thread::current().id(), keys.len()));
    }));

    let imported = WalletKey::new_random(&mut rng, CREATION_TIME);
    group.import_keys(vec![imported]).unwrap();
    group.fresh_keys(KeyPurpose::ReceiveFunds, 30).unwrap();
    user_thread.wait_for_all_events();

    let events = events.lock();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].1, 1);
    assert!(events.iter().all(|(thread, _)| *thread != caller));

    // Without an executor of their own listeners run on the calling thread
    let group = seed_group(test_config(), ScriptType::P2pkh, &mut rng);
    let threads = Arc::new(Mutex::new(Vec::new()));
    let threads_clone = Arc::clone(&threads);
    group.add_listener(Arc::new(move |_| threads_clone.lock().push(std::thread::current().id())));
    group.import_keys(vec![WalletKey::new_random(&mut rng, CREATION_TIME)]).unwrap();
    assert_eq!(threads.lock().as_slice(), [caller]);
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn describe_group(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let mut group = seed_group(test_config(), ScriptType::P2pkh, &mut rng);
    let imported = WalletKey::new_random(&mut rng, CREATION_TIME);
    assert_eq!(group.import_keys(vec![imported.clone()]).unwrap(), 1);
    let address = Address::from_public_key(
        group.chain_config(),
        imported.public_key(),
        test_config().output_script_type(),
    )
    .unwrap();
    let chain = group.active_key_chain().unwrap();

    let description = group.describe(false, false, None).unwrap();
    assert!(description.contains(&format!(
        "  addr:{address}  hash160:{}  (imported)",
        imported.pubkey_hash()
    )));
    assert!(description.ends_with(&chain.describe(group.chain_config(), false, false, None).unwrap()));
    assert!(!description.contains("priv:"));
    assert_eq!(group.to_string(), description);

    let private_key = imported.private_key(None).unwrap();
    let private = group.describe(true, true, None).unwrap();
    assert!(private.contains(&format!("  priv:{}", hex::encode(private_key.to_bytes()))));
    assert!(private.contains(MNEMONIC));

    let crypter = KeyCrypter::new_with_rng(&mut rng, TEST_KDF_CONFIG);
    let aes_key = crypter.derive_key("hunter2").unwrap();
    group.encrypt(crypter.clone(), &aes_key, &mut rng).unwrap();
    assert_eq!(
        group.describe(false, true, None),
        Err(KeyChainError::EncryptionKeyRequired)
    );
    let wrong_key = crypter.derive_key("hunter3").unwrap();
    assert_eq!(
        group.describe(false, true, Some(&wrong_key)),
        Err(KeyChainError::BadPassword)
    );
    assert_eq!(group.describe(true, true, Some(&aes_key)).unwrap(), private);
    assert!(group.to_string().contains("Seed is encrypted"));
}
