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

use std::{sync::Arc, time::Duration};

use crate::primitives::time;

pub type TimeGetterFn = dyn Fn() -> Duration + Send + Sync;

/// Source of the current time, so that code stamping creation times can be given a fixed clock
#[derive(Clone)]
pub struct TimeGetter {
    f: Arc<TimeGetterFn>,
}

impl TimeGetter {
    pub fn new(f: Arc<TimeGetterFn>) -> Self {
        Self { f }
    }

    /// A clock that always reads `now`
    pub fn fixed(now: Duration) -> Self {
        Self::new(Arc::new(move || now))
    }

    pub fn get_time(&self) -> Duration {
        (self.f)()
    }

    pub fn get_time_secs(&self) -> time::Seconds {
        self.get_time().as_secs()
    }
}

impl Default for TimeGetter {
    fn default() -> Self {
        Self::new(Arc::new(time::get_time))
    }
}

impl std::fmt::Debug for TimeGetter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TimeGetter")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock() {
        let getter = TimeGetter::fixed(Duration::from_secs(1337));
        assert_eq!(getter.get_time_secs(), 1337);
        assert_eq!(getter.clone().get_time(), Duration::from_secs(1337));
        assert!(TimeGetter::default().get_time_secs() > 1337);
    }
}
