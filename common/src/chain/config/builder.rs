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

use crypto::key::{extended::VersionBytes, hdkd::child_number::ChildNumber};

use super::{ChainConfig, ChainType};

/// Builder for [ChainConfig], starting from the defaults of a [ChainType].
pub struct Builder {
    chain_type: ChainType,
    bip44_coin_type: ChildNumber,
    p2pkh_address_version: u8,
    p2sh_address_version: u8,
    bech32_hrp: String,
    bip32_public_version: VersionBytes,
    bip32_private_version: VersionBytes,
}

impl Builder {
    pub fn new(chain_type: ChainType) -> Self {
        Self {
            chain_type,
            bip44_coin_type: chain_type.default_bip44_coin_type(),
            p2pkh_address_version: chain_type.default_p2pkh_address_version(),
            p2sh_address_version: chain_type.default_p2sh_address_version(),
            bech32_hrp: chain_type.default_bech32_hrp().to_owned(),
            bip32_public_version: chain_type.default_bip32_public_version(),
            bip32_private_version: chain_type.default_bip32_private_version(),
        }
    }

    pub fn build(self) -> ChainConfig {
        let Self {
            chain_type,
            bip44_coin_type,
            p2pkh_address_version,
            p2sh_address_version,
            bech32_hrp,
            bip32_public_version,
            bip32_private_version,
        } = self;

        ChainConfig {
            chain_type,
            bip44_coin_type,
            p2pkh_address_version,
            p2sh_address_version,
            bech32_hrp,
            bip32_public_version,
            bip32_private_version,
        }
    }

    pub fn bip44_coin_type(mut self, coin_type: ChildNumber) -> Self {
        self.bip44_coin_type = coin_type;
        self
    }

    pub fn p2pkh_address_version(mut self, version: u8) -> Self {
        self.p2pkh_address_version = version;
        self
    }

    pub fn p2sh_address_version(mut self, version: u8) -> Self {
        self.p2sh_address_version = version;
        self
    }

    pub fn bech32_hrp(mut self, hrp: impl Into<String>) -> Self {
        self.bech32_hrp = hrp.into();
        self
    }

    pub fn bip32_versions(mut self, public: VersionBytes, private: VersionBytes) -> Self {
        self.bip32_public_version = public;
        self.bip32_private_version = private;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides() {
        let config = Builder::new(ChainType::Regtest)
            .bech32_hrp("sb")
            .p2pkh_address_version(0x3f)
            .bip44_coin_type(ChildNumber::ZERO_HARDENED)
            .bip32_versions([0x04, 0x5f, 0x1c, 0xf6], [0x04, 0x5f, 0x18, 0xbc])
            .build();
        assert_eq!(config.chain_type(), &ChainType::Regtest);
        assert_eq!(config.bech32_hrp(), "sb");
        assert_eq!(config.p2pkh_address_version(), 0x3f);
        assert_eq!(config.p2sh_address_version(), 0xc4);
        assert_eq!(config.bip44_coin_type(), ChildNumber::ZERO_HARDENED);
        assert_eq!(config.bip32_public_version(), [0x04, 0x5f, 0x1c, 0xf6]);
        assert_eq!(config.bip32_private_version(), [0x04, 0x5f, 0x18, 0xbc]);
    }
}
