// MIT License
//
// Copyright (c) 2020 Gregory Meyer
//
// Permission is hereby granted, free of charge, to any person
// obtaining a copy of this software and associated documentation files
// (the "Software"), to deal in the Software without restriction,
// including without limitation the rights to use, copy, modify, merge,
// publish, distribute, sublicense, and/or sell copies of the Software,
// and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be
// included in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
// MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS
// BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN
// ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Errors reported by fallible growth.

use std::collections::TryReserveError;

use thiserror::Error;

/// The error type for [`HashMap::try_reserve`].
///
/// [`HashMap::try_reserve`]: crate::HashMap::try_reserve
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// The requested bucket count does not fit in a `usize`.
    #[error("bucket count of shard {shard} overflows with {requested} more entries")]
    CapacityOverflow { shard: usize, requested: usize },

    /// The allocator refused to provide a new bucket array.
    #[error("failed to allocate a bucket array")]
    Alloc(#[from] TryReserveError),
}
