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

use crypto::random::Rng;
use rstest::rstest;
use test_utils::random::{make_seedable_rng, Seed};

use super::*;
use super::bloom_filter::{MAX_FILTER_SIZE_BYTES, MAX_HASH_FUNCS};

fn insert_reference_items(filter: &mut BloomFilter) {
    for item in [
        "99108ad8ed9bb6274d3980bab5a85c048f0950c8",
        "b5a2c786d9ef4658287ced5914b37a1b4aa32eee",
        "b9300670b4c5366e95b2699e8b18bc75e5f729c5",
    ] {
        filter.insert(&hex::decode(item).unwrap());
    }
}

#[test]
fn murmur3_vectors() {
    assert_eq!(murmur3_32(0, b""), 0);
    assert_eq!(murmur3_32(1, b""), 0x514e28b7);
    assert_eq!(murmur3_32(0, &[0, 0, 0, 0]), 0x2362f9de);
    assert_eq!(murmur3_32(0x9747b28c, b"Hello, world!"), 0x24884cba);
}

#[test]
fn reference_filter_serialization() {
    let mut filter = BloomFilter::new(3, 0.01, 0, BloomUpdate::All);
    assert_eq!(filter.hash_funcs(), 5);

    filter.insert(&hex::decode("99108ad8ed9bb6274d3980bab5a85c048f0950c8").unwrap());
    assert!(filter.contains(&hex::decode("99108ad8ed9bb6274d3980bab5a85c048f0950c8").unwrap()));
    assert!(!filter.contains(&hex::decode("19108ad8ed9bb6274d3980bab5a85c048f0950c8").unwrap()));

    let mut filter = BloomFilter::new(3, 0.01, 0, BloomUpdate::All);
    insert_reference_items(&mut filter);
    assert_eq!(hex::encode(filter.to_bytes()), "03614e9b050000000000000001");

    let decoded = BloomFilter::from_bytes(&filter.to_bytes()).unwrap();
    assert_eq!(decoded, filter);
}

#[test]
fn reference_filter_with_tweak() {
    let mut filter = BloomFilter::new(3, 0.01, 2147483649, BloomUpdate::All);
    insert_reference_items(&mut filter);
    assert_eq!(hex::encode(filter.to_bytes()), "03ce4299050000000100008001");
}

#[test]
fn size_is_capped() {
    let filter = BloomFilter::new(1_000_000, 0.000001, 0, BloomUpdate::None);
    assert_eq!(filter.data().len(), MAX_FILTER_SIZE_BYTES);
    assert!(filter.hash_funcs() <= MAX_HASH_FUNCS);
}

#[test]
fn malformed_encodings() {
    assert_eq!(BloomFilter::from_bytes(&[]), Err(BloomFilterError::Truncated));
    assert_eq!(
        BloomFilter::from_bytes(&hex::decode("03614e9b0500000000000000").unwrap()),
        Err(BloomFilterError::Truncated)
    );
    assert_eq!(
        BloomFilter::from_bytes(&hex::decode("03614e9b050000000000000007").unwrap()),
        Err(BloomFilterError::UnknownUpdateFlag(7))
    );
    assert_eq!(
        BloomFilter::from_bytes(&hex::decode("03614e9b330000000000000001").unwrap()),
        Err(BloomFilterError::TooManyHashFuncs(0x33))
    );
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn inserted_items_are_found(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let tweak = rng.gen::<u32>();

    let items: Vec<[u8; 32]> = (0..200).map(|_| rng.gen()).collect();
    let mut filter = BloomFilter::new(items.len(), 0.001, tweak, BloomUpdate::P2PubkeyOnly);
    items.iter().for_each(|item| filter.insert(item));

    assert!(items.iter().all(|item| filter.contains(item)));
    assert!(!filter.matches_all());

    let false_positives = (0..10_000)
        .map(|_| rng.gen::<[u8; 20]>())
        .filter(|item| filter.contains(item))
        .count();
    // About 10 are expected
    assert!(false_positives < 60, "too many false positives: {false_positives}");
    assert!(filter.false_positive_rate(items.len()) < 0.002);
}

#[rstest]
#[trace]
#[case(Seed::from_entropy())]
fn merge(#[case] seed: Seed) {
    let mut rng = make_seedable_rng(seed);
    let tweak = rng.gen::<u32>();

    let mut left = BloomFilter::new(20, 0.01, tweak, BloomUpdate::All);
    let mut right = BloomFilter::new(20, 0.01, tweak, BloomUpdate::All);
    let left_items: Vec<[u8; 20]> = (0..10).map(|_| rng.gen()).collect();
    let right_items: Vec<[u8; 20]> = (0..10).map(|_| rng.gen()).collect();
    left_items.iter().for_each(|item| left.insert(item));
    right_items.iter().for_each(|item| right.insert(item));

    left.merge(&right).unwrap();
    assert!(left_items.iter().chain(right_items.iter()).all(|item| left.contains(item)));

    let other_shape = BloomFilter::new(500, 0.01, tweak, BloomUpdate::All);
    assert_eq!(left.merge(&other_shape), Err(BloomFilterError::IncompatibleMerge));
    let other_tweak = BloomFilter::new(20, 0.01, tweak.wrapping_add(1), BloomUpdate::All);
    assert_eq!(left.merge(&other_tweak), Err(BloomFilterError::IncompatibleMerge));
}
