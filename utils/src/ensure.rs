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

//! Early returns on failed preconditions.

/// Return early from the enclosing function unless `cond` holds.
///
/// * `ensure!(cond)` returns [`None`] from a function producing an [Option]
/// * `ensure!(cond, err)` returns [`Err`]`(err)` from a function producing a [Result]
///
/// ```
/// # use utils::ensure;
/// #[derive(PartialEq, Eq, Debug)]
/// enum LookaheadError {
///     ThresholdTooLarge,
/// }
///
/// fn checked_threshold(threshold: u32, size: u32) -> Result<u32, LookaheadError> {
///     ensure!(threshold < size, LookaheadError::ThresholdTooLarge);
///     Ok(threshold)
/// }
///
/// assert_eq!(checked_threshold(33, 100), Ok(33));
/// assert_eq!(checked_threshold(100, 100), Err(LookaheadError::ThresholdTooLarge));
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr $(,)?) => {
        $cond.then_some(())?
    };
    ($cond:expr, $err:expr $(,)?) => {
        $cond.then_some(()).ok_or_else(|| $err)?
    };
}
