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

use std::fmt;

use parity_scale_codec::{Decode, Encode};

use crate::{
    error::{Error, Result},
    opcodes::{all as opc, Opcode},
};

/// Serialized script, as it appears in an output or as a redeem script.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Encode, Decode)]
pub struct Script(Vec<u8>);

impl Script {
    pub fn new() -> Self {
        Script(Vec::new())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Script(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// HASH160 of the script, the payload of a P2SH output that commits to it
    pub fn script_hash(&self) -> [u8; crypto::hash::HASH160_LENGTH] {
        crypto::hash::hash160(&self.0)
    }

    pub fn instructions(&self) -> Instructions<'_> {
        Instructions { data: &self.0 }
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({})", hex::encode(&self.0))
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for instr in self.instructions() {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            match instr {
                Ok(Instruction::PushBytes(data)) => write!(f, "PUSH[{}]", hex::encode(data))?,
                Ok(Instruction::Op(op)) => write!(f, "{op:?}")?,
                Err(_) => f.write_str("<truncated>")?,
            }
        }
        Ok(())
    }
}

/// A single parsed script element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction<'a> {
    PushBytes(&'a [u8]),
    Op(Opcode),
}

/// Iterator over the instructions of a script. Stops after the first error.
pub struct Instructions<'a> {
    data: &'a [u8],
}

impl<'a> Instructions<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.data.len() < n {
            self.data = &[];
            return Err(Error::TruncatedPushData);
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn take_len(&mut self, width: usize) -> Result<usize> {
        let bytes = self.take(width)?;
        Ok(bytes.iter().rev().fold(0usize, |acc, b| (acc << 8) | usize::from(*b)))
    }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<Instruction<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let (&code, rest) = self.data.split_first()?;
        self.data = rest;

        let len = match Opcode::from_u8(code) {
            op if op > opc::OP_0 && op < opc::OP_PUSHDATA1 => Ok(usize::from(code)),
            opc::OP_PUSHDATA1 => self.take_len(1),
            opc::OP_PUSHDATA2 => self.take_len(2),
            opc::OP_PUSHDATA4 => self.take_len(4),
            op => return Some(Ok(Instruction::Op(op))),
        };
        Some(len.and_then(|len| self.take(len)).map(Instruction::PushBytes))
    }
}

/// Minimal little-endian sign-magnitude encoding of a script number.
pub fn build_scriptint(n: i64) -> Vec<u8> {
    if n == 0 {
        return Vec::new();
    }

    let negative = n < 0;
    let mut abs = n.unsigned_abs();
    let mut out = Vec::new();
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }

    // The top bit is the sign, add a byte if the magnitude already uses it
    match out.last_mut() {
        Some(last) if *last & 0x80 != 0 => out.push(if negative { 0x80 } else { 0x00 }),
        Some(last) if negative => *last |= 0x80,
        _ => {}
    }
    out
}

/// Incremental script construction.
#[derive(Debug, Default, Clone)]
pub struct Builder(Vec<u8>);

impl Builder {
    pub fn new() -> Self {
        Builder(Vec::new())
    }

    pub fn push_opcode(mut self, op: Opcode) -> Self {
        self.0.push(op.into_u8());
        self
    }

    /// Push an integer using the shortest encoding: OP_1NEGATE, OP_0..OP_16 or a number push.
    pub fn push_int(self, n: i64) -> Self {
        if n == -1 {
            return self.push_opcode(opc::OP_1NEGATE);
        }
        match u8::try_from(n).ok().and_then(Opcode::for_small_int) {
            Some(op) => self.push_opcode(op),
            None => self.push_slice(&build_scriptint(n)),
        }
    }

    /// Push data with the shortest push prefix for its length.
    pub fn push_slice(mut self, data: &[u8]) -> Self {
        let len = data.len();
        if len < usize::from(opc::OP_PUSHDATA1.into_u8()) {
            self.0.push(len as u8);
        } else if let Ok(len) = u8::try_from(len) {
            self.0.push(opc::OP_PUSHDATA1.into_u8());
            self.0.push(len);
        } else if let Ok(len) = u16::try_from(len) {
            self.0.push(opc::OP_PUSHDATA2.into_u8());
            self.0.extend_from_slice(&len.to_le_bytes());
        } else {
            self.0.push(opc::OP_PUSHDATA4.into_u8());
            self.0.extend_from_slice(&(len as u32).to_le_bytes());
        }
        self.0.extend_from_slice(data);
        self
    }

    pub fn into_script(self) -> Script {
        Script(self.0)
    }
}
