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

use argon2::{Algorithm, Argon2, Params, Version};

use super::KdfError;

#[derive(Debug, Clone, Copy)]
pub struct Argon2idParams {
    /// Memory in KiB
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

/// Argon2id v1.3 of `password`, filling all of `out`
pub fn argon2id_into(
    params: Argon2idParams,
    salt: &[u8],
    password: &[u8],
    out: &mut [u8],
) -> Result<(), KdfError> {
    let params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(out.len()))?;
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params).hash_password_into(
        password, salt, out,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    // Reference values from https://argon2.online/
    #[rstest]
    #[case(700, 16, 2, "some salt", "password", "0b549350ae93d48747c5b3a676589279a3cce4a7b9de79494e2f0b7193d0ae9b")]
    #[case(400, 16, 2, "some salt", "password", "f6acd6dc507655ef500975881f6ba642eb03d04ce71d3b3a139e04b321daa88a")]
    #[case(700, 16, 4, "some salt", "password", "6e7833c72c1eaa5388b389f1cb657ee27858f062a164763d041c880fe7ced6d7")]
    #[case(500, 16, 2, "some salt", "another password", "1e67dcc183faab8ef49c5dcad921656d")]
    fn reference_hashes(
        #[case] m_cost: u32,
        #[case] t_cost: u32,
        #[case] p_cost: u32,
        #[case] salt: &str,
        #[case] password: &str,
        #[case] expected: &str,
    ) {
        let mut out = vec![0u8; expected.len() / 2];
        let params = Argon2idParams {
            m_cost,
            t_cost,
            p_cost,
        };
        argon2id_into(params, salt.as_bytes(), password.as_bytes(), &mut out).unwrap();
        assert_eq!(hex::encode(out), expected);
    }
}
