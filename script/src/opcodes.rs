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

//! Opcodes used by the standard script templates.

use std::fmt;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Opcode(u8);

impl Opcode {
    pub const fn from_u8(code: u8) -> Self {
        Opcode(code)
    }

    pub const fn into_u8(self) -> u8 {
        self.0
    }

    /// The small integer pushed by OP_0 and OP_1..OP_16, if this is one of them
    pub fn small_int(self) -> Option<u8> {
        match self {
            all::OP_0 => Some(0),
            Opcode(c) if (all::OP_1.0..=all::OP_16.0).contains(&c) => Some(c - all::OP_1.0 + 1),
            _ => None,
        }
    }

    /// OP_0 for zero, OP_1..OP_16 otherwise
    pub fn for_small_int(n: u8) -> Option<Self> {
        match n {
            0 => Some(all::OP_0),
            1..=16 => Some(Opcode(all::OP_1.0 + n - 1)),
            _ => None,
        }
    }
}

impl fmt::Debug for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.small_int() {
            Some(n) => write!(f, "OP_{n}"),
            None => write!(f, "OP_{:#04x}", self.0),
        }
    }
}

pub mod all {
    use super::Opcode;

    pub const OP_0: Opcode = Opcode(0x00);
    pub const OP_PUSHDATA1: Opcode = Opcode(0x4c);
    pub const OP_PUSHDATA2: Opcode = Opcode(0x4d);
    pub const OP_PUSHDATA4: Opcode = Opcode(0x4e);
    pub const OP_1NEGATE: Opcode = Opcode(0x4f);
    pub const OP_1: Opcode = Opcode(0x51);
    pub const OP_2: Opcode = Opcode(0x52);
    pub const OP_3: Opcode = Opcode(0x53);
    pub const OP_16: Opcode = Opcode(0x60);
    pub const OP_DUP: Opcode = Opcode(0x76);
    pub const OP_EQUAL: Opcode = Opcode(0x87);
    pub const OP_EQUALVERIFY: Opcode = Opcode(0x88);
    pub const OP_ADD: Opcode = Opcode(0x93);
    pub const OP_HASH160: Opcode = Opcode(0xa9);
    pub const OP_CHECKSIG: Opcode = Opcode(0xac);
    pub const OP_CHECKMULTISIG: Opcode = Opcode(0xae);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_ints() {
        assert_eq!(Opcode::for_small_int(0), Some(all::OP_0));
        assert_eq!(Opcode::for_small_int(3), Some(all::OP_3));
        assert_eq!(Opcode::for_small_int(16), Some(all::OP_16));
        assert_eq!(Opcode::for_small_int(17), None);
        assert_eq!(all::OP_2.small_int(), Some(2));
        assert_eq!(all::OP_CHECKSIG.small_int(), None);
        assert_eq!(format!("{:?}", all::OP_HASH160), "OP_0xa9");
    }
}
