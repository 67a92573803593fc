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

use std::time::{Duration, SystemTime};

/// Seconds since the Unix epoch, the resolution key creation times are kept in.
pub type Seconds = u64;

/// Current system time since the Unix epoch. A clock before 1970 reads as the epoch.
pub fn get_time() -> Duration {
    SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or(Duration::ZERO)
}

pub fn millis_to_seconds(millis: u64) -> Seconds {
    millis / 1000
}

pub fn seconds_to_millis(seconds: Seconds) -> u64 {
    seconds.saturating_mul(1000)
}
