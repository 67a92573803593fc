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

mod internal;

use ripemd::Ripemd160;
use sha2::Sha256;

pub const SHA256_LENGTH: usize = 32;
pub const HASH160_LENGTH: usize = 20;

pub fn sha256<T: AsRef<[u8]>>(data: T) -> [u8; SHA256_LENGTH] {
    internal::hash::<Sha256, _>(data).into()
}

/// SHA-256 applied twice
pub fn sha256d<T: AsRef<[u8]>>(data: T) -> [u8; SHA256_LENGTH] {
    sha256(sha256(data))
}

/// RIPEMD-160 of SHA-256, the digest behind public key hashes and script hashes
pub fn hash160<T: AsRef<[u8]>>(data: T) -> [u8; HASH160_LENGTH] {
    internal::hash::<Ripemd160, _>(sha256(data)).into()
}
