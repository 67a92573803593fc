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

pub mod extended;
pub mod hdkd;

use parity_scale_codec::{Decode, Encode, Error as CodecError, Input, Output};
use secp256k1::{ecdsa, Message, SECP256K1};
use zeroize::Zeroize;

use crate::hash::sha256;
use crate::random::{CryptoRng, Rng};

pub const PRIVATE_KEY_LENGTH: usize = 32;
pub const PUBLIC_KEY_LENGTH: usize = 33;

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum KeyError {
    #[error("Invalid private key data")]
    InvalidPrivateKey,
    #[error("Invalid public key data")]
    InvalidPublicKey,
    #[error("Invalid signature data")]
    InvalidSignature,
}

/// A secp256k1 private key
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PrivateKey {
    data: secp256k1::SecretKey,
}

/// A secp256k1 public key, always serialized in compressed form
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct PublicKey {
    data: secp256k1::PublicKey,
}

/// A DER-serializable ECDSA signature
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Signature {
    data: ecdsa::Signature,
}

impl PrivateKey {
    pub fn new_from_rng(rng: &mut (impl Rng + CryptoRng)) -> (PrivateKey, PublicKey) {
        let data = secp256k1::SecretKey::new(rng);
        let private_key = PrivateKey { data };
        let public_key = private_key.public_key();
        (private_key, public_key)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let data =
            secp256k1::SecretKey::from_slice(bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self { data })
    }

    /// The big-endian secret scalar
    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_LENGTH] {
        self.data.secret_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            data: self.data.public_key(SECP256K1),
        }
    }

    /// Sign the SHA-256 digest of the given message
    pub fn sign_message(&self, msg: &[u8]) -> Signature {
        let digest = Message::from_digest(sha256(msg));
        Signature {
            data: SECP256K1.sign_ecdsa(&digest, &self.data),
        }
    }
}

impl PublicKey {
    /// Parse a compressed or uncompressed SEC1 public key
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let data =
            secp256k1::PublicKey::from_slice(bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { data })
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.data.serialize()
    }

    pub fn verify_message(&self, signature: &Signature, msg: &[u8]) -> bool {
        let digest = Message::from_digest(sha256(msg));
        SECP256K1.verify_ecdsa(&digest, &signature.data, &self.data).is_ok()
    }
}

impl From<&PrivateKey> for PublicKey {
    fn from(private_key: &PrivateKey) -> Self {
        private_key.public_key()
    }
}

impl Signature {
    pub fn from_der(bytes: &[u8]) -> Result<Self, KeyError> {
        let data = ecdsa::Signature::from_der(bytes).map_err(|_| KeyError::InvalidSignature)?;
        Ok(Self { data })
    }

    pub fn to_der(&self) -> Vec<u8> {
        self.data.serialize_der().to_vec()
    }
}

impl Encode for PrivateKey {
    fn size_hint(&self) -> usize {
        PRIVATE_KEY_LENGTH
    }

    fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
        let mut bytes = self.to_bytes();
        dest.write(&bytes);
        bytes.zeroize();
    }
}

impl Decode for PrivateKey {
    fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
        let mut bytes = [0u8; PRIVATE_KEY_LENGTH];
        input.read(&mut bytes)?;
        let result = Self::from_bytes(&bytes).map_err(|_| CodecError::from("Invalid private key"));
        bytes.zeroize();
        result
    }
}

impl Encode for PublicKey {
    fn size_hint(&self) -> usize {
        PUBLIC_KEY_LENGTH
    }

    fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
        dest.write(&self.to_bytes());
    }
}

impl Decode for PublicKey {
    fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
        let mut bytes = [0u8; PUBLIC_KEY_LENGTH];
        input.read(&mut bytes)?;
        Self::from_bytes(&bytes).map_err(|_| CodecError::from("Invalid public key"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;
    use test_utils::random::{make_seedable_rng, Seed};

    #[rstest]
    #[trace]
    #[case(Seed::from_entropy())]
    fn sign_and_verify(#[case] seed: Seed) {
        let mut rng = make_seedable_rng(seed);
        let (sk, pk) = PrivateKey::new_from_rng(&mut rng);
        assert_eq!(sk.public_key(), pk);

        let msg_size = 1 + rng.gen::<usize>() % 1000;
        let msg: Vec<u8> = (0..msg_size).map(|_| rng.gen::<u8>()).collect();
        let sig = sk.sign_message(&msg);
        assert!(pk.verify_message(&sig, &msg));

        let sig = Signature::from_der(&sig.to_der()).unwrap();
        assert!(pk.verify_message(&sig, &msg));

        let (_, other_pk) = PrivateKey::new_from_rng(&mut rng);
        assert!(!other_pk.verify_message(&sig, &msg));
    }

    #[rstest]
    #[trace]
    #[case(Seed::from_entropy())]
    fn bytes_round_trip(#[case] seed: Seed) {
        let mut rng = make_seedable_rng(seed);
        let (sk, pk) = PrivateKey::new_from_rng(&mut rng);
        assert_eq!(PrivateKey::from_bytes(&sk.to_bytes()).unwrap(), sk);
        assert_eq!(PublicKey::from_bytes(&pk.to_bytes()).unwrap(), pk);
        assert_eq!(PrivateKey::decode(&mut sk.encode().as_slice()).unwrap(), sk);
        assert_eq!(PublicKey::decode(&mut pk.encode().as_slice()).unwrap(), pk);
    }

    #[test]
    fn invalid_bytes() {
        assert_eq!(PrivateKey::from_bytes(&[0u8; 32]), Err(KeyError::InvalidPrivateKey));
        assert_eq!(PrivateKey::from_bytes(&[1u8; 31]), Err(KeyError::InvalidPrivateKey));
        assert_eq!(PublicKey::from_bytes(&[2u8; 12]), Err(KeyError::InvalidPublicKey));
    }

    #[test]
    fn known_public_key() {
        let sk = PrivateKey::from_bytes(&hex::decode(
            "e81fa7bb95cc6bee975bf675bfebbab4044c1390e6a00ae246e55c07e3cf835e",
        ).unwrap())
        .unwrap();
        assert_eq!(
            hex::encode(sk.public_key().to_bytes()),
            "026666422d00f1b308fc7527198749f06fedb028b979c09f60d0348ef79c985e41"
        );
    }
}
