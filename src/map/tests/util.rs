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

//! Helpers shared by the map tests.

use std::{
    borrow::Borrow,
    hash::{BuildHasherDefault, Hash, Hasher},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

/// Routes logs to the test harness when `RUST_LOG` is set.
pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Counts how many times the [`Tracked`] values it handed out were dropped.
#[derive(Debug, Default)]
pub(crate) struct DropTracker {
    drops: AtomicUsize,
}

impl DropTracker {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn track<T>(self: &Arc<Self>, value: T) -> Tracked<T> {
        Tracked {
            tracker: Arc::clone(self),
            value,
        }
    }

    /// True once the tracked value has been dropped. Panics on a double drop
    /// are raised by the value itself.
    pub(crate) fn was_dropped(&self) -> bool {
        self.drops.load(Ordering::Relaxed) == 1
    }
}

/// A key or value that reports its drop to a [`DropTracker`].
///
/// Compares, hashes and borrows as the wrapped value, so a map keyed by
/// `Tracked<usize>` can be queried with a plain `&usize`.
#[derive(Debug)]
pub(crate) struct Tracked<T> {
    tracker: Arc<DropTracker>,
    pub(crate) value: T,
}

impl<T> Drop for Tracked<T> {
    fn drop(&mut self) {
        let previous = self.tracker.drops.fetch_add(1, Ordering::Relaxed);
        assert_eq!(previous, 0, "value dropped twice");
    }
}

impl<T: PartialEq> PartialEq for Tracked<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: PartialEq> PartialEq<T> for Tracked<T> {
    fn eq(&self, other: &T) -> bool {
        &self.value == other
    }
}

impl<T: Eq> Eq for Tracked<T> {}

impl<T: Hash> Hash for Tracked<T> {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.value.hash(hasher);
    }
}

impl<T> Borrow<T> for Tracked<T> {
    fn borrow(&self) -> &T {
        &self.value
    }
}

/// Hashes every key to 7, forcing all keys into one shard and one bucket.
#[derive(Debug, Default)]
pub(crate) struct ConstantHasher;

impl Hasher for ConstantHasher {
    fn finish(&self) -> u64 {
        7
    }

    fn write(&mut self, _: &[u8]) {}
}

pub(crate) type ConstantBuildHasher = BuildHasherDefault<ConstantHasher>;
