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

//! A sharded hash set with insertion-ordered iteration.

use crate::{
    map::{DefaultHashBuilder, HashMap, Iter, DEFAULT_NUM_SHARDS},
    policy::{Concurrent, Policy},
};

use std::{
    borrow::Borrow,
    hash::{BuildHasher, Hash},
};

/// A hash set implemented as a [`HashMap`] whose values are `()`.
///
/// Shares the map's sharding, growth and ordering behavior. See the
/// [`HashMap`] documentation for details.
///
/// [`HashMap`]: ../map/struct.HashMap.html
pub struct HashSet<T, S = DefaultHashBuilder, P: Policy = Concurrent> {
    map: HashMap<T, (), S, P>,
}

impl<T> HashSet<T, DefaultHashBuilder, Concurrent> {
    /// Creates an empty `HashSet` with the default number of shards.
    pub fn new() -> Self {
        Self::with_shards_and_hasher(DEFAULT_NUM_SHARDS, DefaultHashBuilder::default())
    }

    /// Creates an empty `HashSet` sized so that `capacity` values fit without
    /// a resize.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
        }
    }

    /// Creates an empty `HashSet` with `num_shards` shards.
    ///
    /// # Panics
    ///
    /// Panics if `num_shards` is 0.
    pub fn with_shards(num_shards: usize) -> Self {
        Self::with_shards_and_hasher(num_shards, DefaultHashBuilder::default())
    }
}

impl<T, S> HashSet<T, S, Concurrent> {
    /// Creates an empty `HashSet` that will use `build_hasher` to hash values.
    pub fn with_hasher(build_hasher: S) -> Self {
        Self::with_shards_and_hasher(DEFAULT_NUM_SHARDS, build_hasher)
    }

    /// Creates an empty `HashSet` with `num_shards` shards that will use
    /// `build_hasher` to hash values.
    ///
    /// # Panics
    ///
    /// Panics if `num_shards` is 0.
    pub fn with_shards_and_hasher(num_shards: usize, build_hasher: S) -> Self {
        Self {
            map: HashMap::with_shards_and_hasher(num_shards, build_hasher),
        }
    }
}

impl<T, P: Policy> HashSet<T, DefaultHashBuilder, P> {
    /// Creates an empty `HashSet` with `num_shards` shards that locks
    /// according to `policy`.
    ///
    /// # Panics
    ///
    /// Panics if `num_shards` is 0.
    pub fn with_shards_and_policy(num_shards: usize, policy: P) -> Self {
        Self {
            map: HashMap::with_shards_and_policy(num_shards, policy),
        }
    }
}

impl<T, S: Default, P: Policy> Default for HashSet<T, S, P> {
    fn default() -> Self {
        Self {
            map: HashMap::default(),
        }
    }
}

impl<T, S, P: Policy> HashSet<T, S, P> {
    /// Returns the number of values in the set.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the set contains no values.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns an iterator over copies of every value in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_
    where
        T: Clone,
    {
        Values { inner: self.map.iter() }
    }
}

impl<T: Hash + Eq, S: BuildHasher, P: Policy> HashSet<T, S, P> {
    /// Returns true if the set contains `value`.
    pub fn contains<Q: ?Sized + Hash + Eq>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
    {
        self.map.contains_key(value)
    }

    /// Returns a copy of the stored value equal to `value`.
    pub fn get<Q: ?Sized + Hash + Eq>(&self, value: &Q) -> Option<T>
    where
        T: Borrow<Q> + Clone,
    {
        self.map.get_key_value_and(value, |k, _| k.clone())
    }

    /// Adds `value` to the set, returning true if it was not already present.
    ///
    /// A value already present is left in place.
    pub fn insert(&self, value: T) -> bool {
        self.map.insert(value, ()).is_none()
    }

    /// Removes `value` from the set, returning true if it was present.
    pub fn remove<Q: ?Sized + Hash + Eq>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
    {
        self.map.remove(value).is_some()
    }

    /// Removes and returns the stored value equal to `value`.
    pub fn take<Q: ?Sized + Hash + Eq>(&self, value: &Q) -> Option<T>
    where
        T: Borrow<Q>,
    {
        self.map.remove_entry(value).map(|(k, _)| k)
    }
}

struct Values<'a, T, S, P: Policy> {
    inner: Iter<'a, T, (), S, P>,
}

impl<'a, T: Clone, S, P: Policy> Iterator for Values<'a, T, S, P> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.inner.next().map(|(value, _)| value)
    }
}
