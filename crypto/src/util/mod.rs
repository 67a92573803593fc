// Copyright (c) 2022 RBB S.r.l
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

//! HMAC-SHA512 as used by BIP32 derivation

use hmac::{Hmac, Mac};
use sha2::Sha512;
use zeroize::{Zeroize, Zeroizing};

use crate::key::hdkd::{
    chain_code::{ChainCode, CHAINCODE_LENGTH},
    derivable::DerivationError,
};

pub type HmacSha512 = Hmac<Sha512>;

/// HMAC-SHA512 keyed with `key` over the concatenation of `parts`
pub fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> HmacSha512 {
    let mut mac = HmacSha512::new_from_slice(key).expect("HMAC can take key of any size");
    for part in parts {
        mac.update(part);
    }
    mac
}

/// The left half of the output is a secret key (or tweak), the right half the chain code
pub fn split_derivation_output(
    mac: HmacSha512,
) -> Result<(secp256k1::SecretKey, ChainCode), DerivationError> {
    let mut digest = mac.finalize().into_bytes();
    let mut output = Zeroizing::new([0u8; 64]);
    output.copy_from_slice(digest.as_slice());
    digest.as_mut_slice().zeroize();

    let (key_bytes, chain_code_bytes) = output.split_at(CHAINCODE_LENGTH);
    let secret_key = secp256k1::SecretKey::from_slice(key_bytes)
        .map_err(|_| DerivationError::KeyDerivationError)?;
    let chain_code: [u8; CHAINCODE_LENGTH] =
        chain_code_bytes.try_into().map_err(|_| DerivationError::KeyDerivationError)?;
    Ok((secret_key, ChainCode::from(chain_code)))
}
