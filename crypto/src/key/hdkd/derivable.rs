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

use super::{child_number::ChildNumber, derivation_path::DerivationPath};

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum DerivationError {
    #[error("Invalid child number {0}")]
    InvalidChildNumber(u32),
    #[error("Malformed child number format")]
    InvalidChildNumberFormat,
    #[error("Malformed derivation path format")]
    InvalidDerivationPathFormat,
    #[error("Derivation path is too long")]
    PathTooLong,
    #[error("Cannot derive hardened child {0} from a public key")]
    CannotDeriveHardenedKeyFromPublicKey(ChildNumber),
    #[error("Path {0} is not a descendant of {1}")]
    InvalidDerivationPath(DerivationPath, DerivationPath),
    #[error("Key derivation produced an invalid key")]
    KeyDerivationError,
}

pub trait Derivable: Sized {
    /// Derive a descendant key following the given child numbers, relative to this key
    fn derive_relative(self, path: &[ChildNumber]) -> Result<Self, DerivationError> {
        path.iter().try_fold(self, |key, num| key.derive_child(*num))
    }

    /// Derive the key at an absolute path, which must start with the path of this key
    fn derive_absolute_path(self, path: &DerivationPath) -> Result<Self, DerivationError> {
        let own_path = self.get_derivation_path();
        if !own_path.is_prefix_of(path) {
            return Err(DerivationError::InvalidDerivationPath(
                path.clone(),
                own_path.clone(),
            ));
        }
        let remaining = path.as_slice()[own_path.len()..].to_vec();
        self.derive_relative(&remaining)
    }

    fn derive_child(self, num: ChildNumber) -> Result<Self, DerivationError>;

    fn get_derivation_path(&self) -> &DerivationPath;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct DummyDerivable(DerivationPath);

    impl Derivable for DummyDerivable {
        fn derive_child(self, num: ChildNumber) -> Result<Self, DerivationError> {
            Ok(DummyDerivable(self.0.child(num)?))
        }

        fn get_derivation_path(&self) -> &DerivationPath {
            &self.0
        }
    }

    #[test]
    fn derivation_trait() {
        let dummy = DummyDerivable::default();
        let path = DerivationPath::from_str("m/1'/2'/3").unwrap();
        let derived = dummy.clone().derive_absolute_path(&path).unwrap();
        assert_eq!(derived.0, path);

        let derived = derived.derive_child(ChildNumber::from_str("4").unwrap()).unwrap();
        assert_eq!(derived.0, DerivationPath::from_str("m/1'/2'/3/4").unwrap());

        let other = DerivationPath::from_str("m/7").unwrap();
        assert_eq!(
            derived.clone().derive_absolute_path(&other),
            Err(DerivationError::InvalidDerivationPath(other, derived.0.clone()))
        );
    }
}
