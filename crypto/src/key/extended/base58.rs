// Copyright (c) 2024 RBB S.r.l
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

//! BIP32 serialization of extended keys. The 78 bytes of version, depth, parent fingerprint,
//! child number, chain code and key data are Base58Check encoded, giving the familiar
//! `xpub`/`xprv` strings on mainnet and `tpub`/`tprv` ones on the test networks.

use zeroize::Zeroizing;

use super::{ExtendedPrivateKey, ExtendedPublicKey, Fingerprint, FINGERPRINT_LENGTH};
use crate::key::hdkd::{
    chain_code::{ChainCode, CHAINCODE_LENGTH},
    child_number::ChildNumber,
    derivable::{Derivable, DerivationError},
    derivation_path::DerivationPath,
};
use crate::key::{KeyError, PrivateKey, PublicKey, PUBLIC_KEY_LENGTH};

pub const SERIALIZED_EXTENDED_KEY_LENGTH: usize = 78;

/// The four bytes a serialized extended key starts with, they tell networks and key kinds apart
pub type VersionBytes = [u8; 4];

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum ExtendedKeyEncodingError {
    #[error("Base58 decoding failed: {0}")]
    Base58(String),
    #[error("Extended key of {0} bytes, expected {SERIALIZED_EXTENDED_KEY_LENGTH}")]
    InvalidLength(usize),
    #[error("Unexpected version bytes {0:02x?}")]
    UnknownVersion(VersionBytes),
    #[error("Depth {depth} does not fit below the parent path {parent}")]
    DepthMismatch { depth: u8, parent: DerivationPath },
    #[error("A master key needs a zero parent fingerprint and child number")]
    InvalidMasterKey,
    #[error("Private key data must start with a zero byte")]
    InvalidPrivateKeyPrefix,
    #[error("Invalid key data: {0}")]
    Key(#[from] KeyError),
    #[error("Derivation error: {0}")]
    Derivation(#[from] DerivationError),
}

/// The fields of a serialized key, key data aside
struct Header {
    depth: u8,
    parent_fingerprint: Fingerprint,
    child_number: ChildNumber,
    chain_code: ChainCode,
}

impl Header {
    fn of(path: &DerivationPath, parent_fingerprint: Fingerprint, chain_code: ChainCode) -> Self {
        Self {
            // Derivation paths never get longer than u8::MAX
            depth: u8::try_from(path.len()).unwrap_or(u8::MAX),
            parent_fingerprint,
            child_number: path.last().unwrap_or(ChildNumber::ZERO),
            chain_code,
        }
    }

    /// The path of the key. Without the parent path, a key below the master key only knows its
    /// own child number, so its path is cut to that single step.
    fn path(&self, parent_path: Option<&DerivationPath>) -> Result<DerivationPath, ExtendedKeyEncodingError> {
        match parent_path {
            Some(parent) => {
                if parent.len() + 1 != usize::from(self.depth) {
                    return Err(ExtendedKeyEncodingError::DepthMismatch {
                        depth: self.depth,
                        parent: parent.clone(),
                    });
                }
                Ok(parent.child(self.child_number)?)
            }
            None if self.depth == 0 => {
                if self.parent_fingerprint != Fingerprint::ZERO
                    || self.child_number != ChildNumber::ZERO
                {
                    return Err(ExtendedKeyEncodingError::InvalidMasterKey);
                }
                Ok(DerivationPath::empty())
            }
            None => Ok(DerivationPath::empty().child(self.child_number)?),
        }
    }
}

fn encode(version: VersionBytes, header: &Header, key_data: &[u8; PUBLIC_KEY_LENGTH]) -> String {
    let mut data = Zeroizing::new(Vec::with_capacity(SERIALIZED_EXTENDED_KEY_LENGTH));
    data.extend_from_slice(&version);
    data.push(header.depth);
    data.extend_from_slice(header.parent_fingerprint.as_bytes());
    data.extend_from_slice(&header.child_number.into_encoded_be_bytes());
    data.extend_from_slice(header.chain_code.as_bytes());
    data.extend_from_slice(key_data);
    bs58::encode(data.as_slice()).with_check().into_string()
}

fn take<'a, const N: usize>(input: &mut &'a [u8]) -> Option<&'a [u8; N]> {
    let (head, tail) = input.split_first_chunk::<N>()?;
    *input = tail;
    Some(head)
}

fn decode(
    encoded: &str,
    version: VersionBytes,
) -> Result<(Header, Zeroizing<[u8; PUBLIC_KEY_LENGTH]>), ExtendedKeyEncodingError> {
    let data = Zeroizing::new(
        bs58::decode(encoded)
            .with_check(None)
            .into_vec()
            .map_err(|e| ExtendedKeyEncodingError::Base58(e.to_string()))?,
    );
    if data.len() != SERIALIZED_EXTENDED_KEY_LENGTH {
        return Err(ExtendedKeyEncodingError::InvalidLength(data.len()));
    }

    let truncated = || ExtendedKeyEncodingError::InvalidLength(data.len());
    let mut input = data.as_slice();
    let found_version = *take::<4>(&mut input).ok_or_else(truncated)?;
    if found_version != version {
        return Err(ExtendedKeyEncodingError::UnknownVersion(found_version));
    }
    let [depth] = *take::<1>(&mut input).ok_or_else(truncated)?;
    let parent_fingerprint = Fingerprint(*take::<FINGERPRINT_LENGTH>(&mut input).ok_or_else(truncated)?);
    let child_number =
        ChildNumber::from_index_with_hardened_bit(u32::from_be_bytes(*take::<4>(&mut input).ok_or_else(truncated)?));
    let chain_code = ChainCode::from(*take::<CHAINCODE_LENGTH>(&mut input).ok_or_else(truncated)?);
    let key_data = Zeroizing::new(*take::<PUBLIC_KEY_LENGTH>(&mut input).ok_or_else(truncated)?);
    let header = Header {
        depth,
        parent_fingerprint,
        child_number,
        chain_code,
    };
    Ok((header, key_data))
}

impl ExtendedPublicKey {
    pub fn to_base58(&self, version: VersionBytes) -> String {
        let header = Header::of(&self.derivation_path, self.parent_fingerprint, self.chain_code);
        encode(version, &header, &self.public_key.to_bytes())
    }

    /// Parse a serialized public key. `parent_path` is the path of the parent of the key, the
    /// path of the key is cut to its child number when it is not known.
    pub fn from_base58(
        encoded: &str,
        version: VersionBytes,
        parent_path: Option<&DerivationPath>,
    ) -> Result<Self, ExtendedKeyEncodingError> {
        let (header, key_data) = decode(encoded, version)?;
        let public_key = PublicKey::from_bytes(key_data.as_slice())?;
        Ok(Self::from_parts(header.path(parent_path)?, header.chain_code, public_key)
            .with_parent_fingerprint(header.parent_fingerprint))
    }
}

impl ExtendedPrivateKey {
    pub fn to_base58(&self, version: VersionBytes) -> String {
        let header = Header::of(
            self.get_derivation_path(),
            self.parent_fingerprint,
            self.chain_code,
        );
        let mut key_data = Zeroizing::new([0; PUBLIC_KEY_LENGTH]);
        key_data[1..].copy_from_slice(&self.private_key.to_bytes());
        encode(version, &header, &key_data)
    }

    /// Parse a serialized private key, see [ExtendedPublicKey::from_base58]
    pub fn from_base58(
        encoded: &str,
        version: VersionBytes,
        parent_path: Option<&DerivationPath>,
    ) -> Result<Self, ExtendedKeyEncodingError> {
        let (header, key_data) = decode(encoded, version)?;
        let (&prefix, secret) = key_data
            .split_first()
            .ok_or(ExtendedKeyEncodingError::InvalidPrivateKeyPrefix)?;
        if prefix != 0 {
            return Err(ExtendedKeyEncodingError::InvalidPrivateKeyPrefix);
        }
        let private_key = PrivateKey::from_bytes(secret)?;
        Ok(Self::from_parts(header.path(parent_path)?, header.chain_code, private_key)
            .with_parent_fingerprint(header.parent_fingerprint))
    }
}
