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

pub use log;

static INITIALIZE_LOGGER_ONCE_FLAG: std::sync::Once = std::sync::Once::new();

/// Install `env_logger` as the global logger, filtered by `RUST_LOG` (default `info`).
/// Calling it more than once is harmless.
pub fn init_logging() {
    INITIALIZE_LOGGER_ONCE_FLAG.call_once(|| {
        let env = env_logger::Env::default().default_filter_or("info");
        // Someone else may have installed a logger already
        let _ = env_logger::Builder::from_env(env).try_init();
    });
}

/// Logger for unit tests, the output is captured by the test harness
pub fn init_test_logging() {
    INITIALIZE_LOGGER_ONCE_FLAG.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}
