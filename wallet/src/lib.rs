// Copyright (c) 2023 RBB S.r.l
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

//! Wallet key management: standalone keys, deterministic key chains and the key chain group
//! combining them into the key bag of a wallet.

pub mod key_chain;

pub use bip39::{Language, Mnemonic};
pub use key_chain::{
    FoundKey, KeyChainConfig, KeyChainError, KeyChainEvent, KeyChainGroup, KeyChainGroupBuilder,
    KeyChainResult, KeyPurpose,
};
