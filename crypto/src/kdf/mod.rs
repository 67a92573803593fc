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

//! Password based key derivation

use parity_scale_codec::{Decode, Encode};
use zeroize::Zeroizing;

use crate::random::{CryptoRng, Rng};

pub mod argon2;

/// Salts shorter than this are refused by Argon2
pub const MIN_SALT_LEN: usize = 8;

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum KdfError {
    #[error("Argon2 hashing error: {0}")]
    Argon2HashingFailed(#[from] ::argon2::Error),
    #[error("Salt of {0} bytes is too short")]
    SaltTooShort(usize),
}

/// Work factor of a password based key derivation function
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub enum KdfConfig {
    #[codec(index = 0)]
    Argon2id {
        m_cost_memory_size: u32,
        t_cost_iterations: u32,
        p_cost_parallelism: u32,
    },
}

impl KdfConfig {
    /// Stretch `password` into `N` key bytes
    pub fn derive<const N: usize>(
        &self,
        salt: &[u8],
        password: &[u8],
    ) -> Result<Zeroizing<[u8; N]>, KdfError> {
        if salt.len() < MIN_SALT_LEN {
            return Err(KdfError::SaltTooShort(salt.len()));
        }

        let mut out = Zeroizing::new([0u8; N]);
        match self {
            KdfConfig::Argon2id {
                m_cost_memory_size,
                t_cost_iterations,
                p_cost_parallelism,
            } => argon2::argon2id_into(
                argon2::Argon2idParams {
                    m_cost: *m_cost_memory_size,
                    t_cost: *t_cost_iterations,
                    p_cost: *p_cost_parallelism,
                },
                salt,
                password,
                out.as_mut_slice(),
            )?,
        }
        Ok(out)
    }
}

pub fn make_salt(rng: &mut (impl Rng + CryptoRng), len: usize) -> Vec<u8> {
    let mut salt = vec![0u8; len];
    rng.fill(salt.as_mut_slice());
    salt
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use test_utils::random::{make_seedable_rng, Seed};

    use super::*;

    const CHEAP: KdfConfig = KdfConfig::Argon2id {
        m_cost_memory_size: 200,
        t_cost_iterations: 2,
        p_cost_parallelism: 2,
    };

    #[rstest]
    #[trace]
    #[case(Seed::from_entropy())]
    fn password_and_salt_both_matter(#[case] seed: Seed) {
        let mut rng = make_seedable_rng(seed);
        let salt = make_salt(&mut rng, 16);
        assert_eq!(salt.len(), 16);
        let password = b"correct horse battery staple";

        let key = CHEAP.derive::<32>(&salt, password).unwrap();
        assert_eq!(*key, *CHEAP.derive::<32>(&salt, password).unwrap());
        assert_ne!(*key, *CHEAP.derive::<32>(&salt, b"wrong").unwrap());

        let other_salt = make_salt(&mut rng, 16);
        assert_ne!(salt, other_salt);
        assert_ne!(*key, *CHEAP.derive::<32>(&other_salt, password).unwrap());
    }

    #[test]
    fn short_salt() {
        assert_eq!(
            CHEAP.derive::<32>(b"salt", b"pw").unwrap_err(),
            KdfError::SaltTooShort(4)
        );
    }
}
