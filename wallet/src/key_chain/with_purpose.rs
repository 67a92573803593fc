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

use crypto::key::hdkd::child_number::ChildNumber;

/// One of the two leaf branches below an account key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Branch {
    External,
    Internal,
}

impl Branch {
    pub const ALL: [Branch; 2] = [Branch::External, Branch::Internal];

    pub const fn child_number(self) -> ChildNumber {
        match self {
            Branch::External => ChildNumber::ZERO,
            Branch::Internal => ChildNumber::ONE,
        }
    }

    pub fn from_child_number(num: ChildNumber) -> Option<Self> {
        Self::ALL.into_iter().find(|branch| branch.child_number() == num)
    }
}

/// A value kept separately for the external and the internal branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WithPurpose<T> {
    pub external: T,
    pub internal: T,
}

impl<T> WithPurpose<T> {
    pub fn new(external: T, internal: T) -> Self {
        Self { external, internal }
    }

    pub fn get_for(&self, branch: Branch) -> &T {
        match branch {
            Branch::External => &self.external,
            Branch::Internal => &self.internal,
        }
    }

    pub fn mut_for(&mut self, branch: Branch) -> &mut T {
        match branch {
            Branch::External => &mut self.external,
            Branch::Internal => &mut self.internal,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Branch, &T)> {
        [(Branch::External, &self.external), (Branch::Internal, &self.internal)].into_iter()
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> WithPurpose<U> {
        WithPurpose {
            external: f(self.external),
            internal: f(self.internal),
        }
    }

    pub fn try_map<U, E>(self, mut f: impl FnMut(T) -> Result<U, E>) -> Result<WithPurpose<U>, E> {
        Ok(WithPurpose {
            external: f(self.external)?,
            internal: f(self.internal)?,
        })
    }
}
