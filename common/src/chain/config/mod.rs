// Copyright (c) 2021 RBB S.r.l
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

mod builder;

use std::str::FromStr;

use crypto::key::{extended::VersionBytes, hdkd::child_number::ChildNumber};

pub use builder::Builder;

/// BIP44 coin type of Bitcoin mainnet
pub const BITCOIN_COIN_TYPE: ChildNumber = ChildNumber::ZERO_HARDENED;
/// BIP44 coin type shared by all test networks
pub const BITCOIN_COIN_TYPE_TEST: ChildNumber = ChildNumber::ONE_HARDENED;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChainType {
    Mainnet,
    Testnet,
    Regtest,
}

impl ChainType {
    pub const fn name(&self) -> &'static str {
        match self {
            ChainType::Mainnet => "mainnet",
            ChainType::Testnet => "testnet",
            ChainType::Regtest => "regtest",
        }
    }

    const fn default_p2pkh_address_version(&self) -> u8 {
        match self {
            ChainType::Mainnet => 0x00,
            ChainType::Testnet | ChainType::Regtest => 0x6f,
        }
    }

    const fn default_p2sh_address_version(&self) -> u8 {
        match self {
            ChainType::Mainnet => 0x05,
            ChainType::Testnet | ChainType::Regtest => 0xc4,
        }
    }

    const fn default_bech32_hrp(&self) -> &'static str {
        match self {
            ChainType::Mainnet => "bc",
            ChainType::Testnet => "tb",
            ChainType::Regtest => "bcrt",
        }
    }

    /// `xpub` on mainnet, `tpub` elsewhere
    const fn default_bip32_public_version(&self) -> VersionBytes {
        match self {
            ChainType::Mainnet => [0x04, 0x88, 0xb2, 0x1e],
            ChainType::Testnet | ChainType::Regtest => [0x04, 0x35, 0x87, 0xcf],
        }
    }

    /// `xprv` on mainnet, `tprv` elsewhere
    const fn default_bip32_private_version(&self) -> VersionBytes {
        match self {
            ChainType::Mainnet => [0x04, 0x88, 0xad, 0xe4],
            ChainType::Testnet | ChainType::Regtest => [0x04, 0x35, 0x83, 0x94],
        }
    }

    const fn default_bip44_coin_type(&self) -> ChildNumber {
        match self {
            ChainType::Mainnet => BITCOIN_COIN_TYPE,
            ChainType::Testnet | ChainType::Regtest => BITCOIN_COIN_TYPE_TEST,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown chain type: {0}")]
pub struct ChainTypeParseError(String);

impl FromStr for ChainType {
    type Err = ChainTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [ChainType::Mainnet, ChainType::Testnet, ChainType::Regtest]
            .into_iter()
            .find(|chain_type| chain_type.name() == s)
            .ok_or_else(|| ChainTypeParseError(s.to_owned()))
    }
}

/// Network parameters that affect how keys are presented: address encodings and the
/// coin type used in BIP44-style account paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    chain_type: ChainType,
    bip44_coin_type: ChildNumber,
    p2pkh_address_version: u8,
    p2sh_address_version: u8,
    bech32_hrp: String,
    bip32_public_version: VersionBytes,
    bip32_private_version: VersionBytes,
}

impl ChainConfig {
    pub fn chain_type(&self) -> &ChainType {
        &self.chain_type
    }

    /// The coin type component (always hardened) of `m/purpose'/coin'/account'` paths
    pub fn bip44_coin_type(&self) -> ChildNumber {
        self.bip44_coin_type
    }

    pub fn p2pkh_address_version(&self) -> u8 {
        self.p2pkh_address_version
    }

    pub fn p2sh_address_version(&self) -> u8 {
        self.p2sh_address_version
    }

    /// Human readable part of segwit addresses
    pub fn bech32_hrp(&self) -> &str {
        &self.bech32_hrp
    }

    /// Version bytes of serialized extended public keys
    pub fn bip32_public_version(&self) -> VersionBytes {
        self.bip32_public_version
    }

    pub fn bip32_private_version(&self) -> VersionBytes {
        self.bip32_private_version
    }

    /// Account index 0 as a hardened child number
    pub fn default_account_index(&self) -> ChildNumber {
        ChildNumber::ZERO_HARDENED
    }
}

pub fn create_mainnet() -> ChainConfig {
    Builder::new(ChainType::Mainnet).build()
}

pub fn create_testnet() -> ChainConfig {
    Builder::new(ChainType::Testnet).build()
}

pub fn create_regtest() -> ChainConfig {
    Builder::new(ChainType::Regtest).build()
}
