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

//! Textual addresses: Base58Check for P2PKH/P2SH, segwit v0 bech32 for P2WPKH.

mod hash;

use std::fmt::Display;

use bech32::{segwit, Hrp};
use crypto::key::PublicKey;
use script::{Script, ScriptType};

use crate::chain::{ChainConfig, Destination};

pub use hash::{HashLengthError, PublicKeyHash, ScriptHash};

#[derive(thiserror::Error, Debug, Eq, PartialEq, Clone)]
pub enum AddressError {
    #[error("Base58Check decoding error: {0}")]
    Base58(String),
    #[error("Bech32 decoding error: {0}")]
    Bech32Decoding(String),
    #[error("Bech32 encoding error: {0}")]
    Bech32Encoding(String),
    #[error("Address belongs to a different network (prefix {0})")]
    WrongNetwork(String),
    #[error("Unknown address version byte {0:#04x}")]
    UnknownVersion(u8),
    #[error("Unsupported witness version {0}")]
    UnsupportedWitnessVersion(u8),
    #[error("Invalid address payload length {0}")]
    InvalidPayloadLength(usize),
    #[error("A single public key cannot be turned into a {0} address")]
    UnsupportedScriptType(ScriptType),
}

impl From<HashLengthError> for AddressError {
    fn from(err: HashLengthError) -> Self {
        AddressError::InvalidPayloadLength(err.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    destination: Destination,
    address: String,
}

impl Address {
    pub fn new(cfg: &ChainConfig, destination: Destination) -> Result<Self, AddressError> {
        let address = match &destination {
            Destination::PublicKeyHash(hash) => {
                base58check(cfg.p2pkh_address_version(), hash.as_bytes())
            }
            Destination::ScriptHash(hash) => {
                base58check(cfg.p2sh_address_version(), hash.as_bytes())
            }
            Destination::WitnessPublicKeyHash(hash) => {
                let hrp = Hrp::parse(cfg.bech32_hrp())
                    .map_err(|e| AddressError::Bech32Encoding(e.to_string()))?;
                segwit::encode(hrp, segwit::VERSION_0, hash.as_bytes())
                    .map_err(|e| AddressError::Bech32Encoding(e.to_string()))?
            }
        };
        Ok(Self {
            destination,
            address,
        })
    }

    pub fn from_public_key(
        cfg: &ChainConfig,
        public_key: &PublicKey,
        script_type: ScriptType,
    ) -> Result<Self, AddressError> {
        let destination = Destination::from_public_key(public_key, script_type)
            .ok_or(AddressError::UnsupportedScriptType(script_type))?;
        Self::new(cfg, destination)
    }

    pub fn from_redeem_script(cfg: &ChainConfig, redeem_script: &Script) -> Result<Self, AddressError> {
        Self::new(cfg, Destination::from_redeem_script(redeem_script))
    }

    pub fn from_str(cfg: &ChainConfig, address: &str) -> Result<Self, AddressError> {
        let segwit_prefix = format!("{}1", cfg.bech32_hrp());
        let destination = if address.to_ascii_lowercase().starts_with(&segwit_prefix) {
            decode_segwit(cfg, address)?
        } else {
            decode_base58(cfg, address)?
        };
        Self::new(cfg, destination)
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn script_type(&self) -> ScriptType {
        self.destination.script_type()
    }

    pub fn get(&self) -> &str {
        &self.address
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.address.fmt(f)
    }
}

fn base58check(version: u8, payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(payload.len() + 1);
    data.push(version);
    data.extend_from_slice(payload);
    bs58::encode(data).with_check().into_string()
}

fn decode_base58(cfg: &ChainConfig, address: &str) -> Result<Destination, AddressError> {
    let data = bs58::decode(address)
        .with_check(None)
        .into_vec()
        .map_err(|e| AddressError::Base58(e.to_string()))?;
    let (&version, payload) = data.split_first().ok_or(AddressError::InvalidPayloadLength(0))?;

    if version == cfg.p2pkh_address_version() {
        Ok(Destination::PublicKeyHash(payload.try_into()?))
    } else if version == cfg.p2sh_address_version() {
        Ok(Destination::ScriptHash(payload.try_into()?))
    } else {
        Err(AddressError::UnknownVersion(version))
    }
}

fn decode_segwit(cfg: &ChainConfig, address: &str) -> Result<Destination, AddressError> {
    let (hrp, version, program) =
        segwit::decode(address).map_err(|e| AddressError::Bech32Decoding(e.to_string()))?;
    if !hrp.as_str().eq_ignore_ascii_case(cfg.bech32_hrp()) {
        return Err(AddressError::WrongNetwork(hrp.to_string()));
    }
    if version != segwit::VERSION_0 {
        return Err(AddressError::UnsupportedWitnessVersion(version.to_u8()));
    }
    Ok(Destination::WitnessPublicKeyHash(program.as_slice().try_into()?))
}
