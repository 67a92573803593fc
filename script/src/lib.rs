// Copyright (c) 2021 RBB S.r.l
// opensource@mintlayer.org
// SPDX-License-Identifier: MIT
// Licensed under the MIT License;
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// 	http://spdx.org/licenses/MIT
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// Author(s): L. Kuklinek

//! Bitcoin script construction for the standard output templates a wallet hands out.
//!
//! ## Example
//!
//! ```
//! use script::{opcodes::all as opc, Builder};
//!
//! // OP_2 OP_3 OP_ADD
//! let script = Builder::new()
//!         .push_int(2)
//!         .push_int(3)
//!         .push_opcode(opc::OP_ADD)
//!         .into_script();
//!
//! assert_eq!(script.as_bytes(), &[0x52, 0x53, 0x93]);
//! ```

mod error;
pub mod opcodes;
pub mod script;
pub mod standard;

pub use crate::script::{Builder, Instruction, Script};
pub use error::{Error, Result};
pub use standard::ScriptType;
