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

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Push data runs past the end of the script")]
    TruncatedPushData,
    #[error("A multisig script needs between 1 and {max} keys, got {0}", max = crate::standard::MAX_MULTISIG_KEYS)]
    InvalidMultisigKeyCount(usize),
    #[error("Multisig threshold {threshold} is not in 1..={keys}")]
    InvalidMultisigThreshold { threshold: usize, keys: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
