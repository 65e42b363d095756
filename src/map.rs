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

//! A sharded hash map with per-shard growth and insertion-ordered cursors.

mod chain;
mod cursor;
mod node;
mod shard;


pub use cursor::{Cursor, Iter};

use node::{Entry, Node};
use shard::{Global, Shard, INITIAL_BUCKETS};

use crate::{
    error::Error,
    policy::{Concurrent, Local, Policy},
};

use std::{
    borrow::Borrow,
    hash::{BuildHasher, Hash},
    sync::atomic::{AtomicUsize, Ordering},
};

/// Default hasher for `HashMap`.
///
/// This is currently [aHash], a hashing algorithm designed around acceleration
/// by the [AES-NI] instruction set on x86 processors. aHash is not
/// cryptographically secure, but is fast and resistant to DoS attacks.
///
/// [aHash]: https://docs.rs/ahash
/// [AES-NI]: https://en.wikipedia.org/wiki/AES_instruction_set
pub type DefaultHashBuilder = ahash::RandomState;

/// Number of shards a `HashMap` is created with unless told otherwise.
pub const DEFAULT_NUM_SHARDS: usize = 256;

/// A `HashMap` that is confined to one thread at a time.
pub type LocalHashMap<K, V, S = DefaultHashBuilder> = HashMap<K, V, S, Local>;

/// A hash map split into a fixed number of independently locked shards, each
/// of which grows on its own.
///
/// Keys are routed to shard `hash % num_shards`. Each shard is an array of
/// buckets holding chains of entries; when more than 80% of a shard's buckets
/// are occupied, the shard doubles its bucket array and rehashes. Only that
/// shard's traffic waits for the rehash; every other shard stays available.
///
/// Entries are additionally kept in global insertion order, which [`begin`],
/// [`end`] and [`iter`] traverse. Entries inserted into different shards by
/// different threads at the same time may appear in either order.
///
/// The thread-safety policy `P` is chosen at the type level. The default,
/// [`Concurrent`], makes the map `Sync` and suitable for sharing through an
/// [`Arc`]. [`Local`] removes all blocking; see [`LocalHashMap`].
///
/// The default hashing algorithm is [aHash]. The hashing algorithm to be used
/// can be chosen on a per-`HashMap` basis using the [`with_hasher`],
/// [`with_shards_and_hasher`] and [`with_shards_capacity_and_hasher`] methods.
///
/// Key types must implement [`Hash`] and [`Eq`]. Operations that return a key
/// or value by copy require [`Clone`]; the `_and` variants instead invoke a
/// closure while the entry is locked. Those closures must not access the same
/// map: under [`Concurrent`] this can deadlock, and under [`Local`] it panics.
///
/// [`begin`]: #method.begin
/// [`end`]: #method.end
/// [`iter`]: #method.iter
/// [`Arc`]: https://doc.rust-lang.org/std/sync/struct.Arc.html
/// [aHash]: https://docs.rs/ahash
/// [`with_hasher`]: #method.with_hasher
/// [`with_shards_and_hasher`]: #method.with_shards_and_hasher
/// [`with_shards_capacity_and_hasher`]: #method.with_shards_capacity_and_hasher
/// [`Hash`]: https://doc.rust-lang.org/std/hash/trait.Hash.html
/// [`Eq`]: https://doc.rust-lang.org/std/cmp/trait.Eq.html
/// [`Clone`]: https://doc.rust-lang.org/std/clone/trait.Clone.html
pub struct HashMap<K, V, S = DefaultHashBuilder, P: Policy = Concurrent> {
    shards: Box<[Shard<K, V, P>]>,
    global: Global<P>,
    build_hasher: S,
    next_id: AtomicUsize,
}

impl<K, V> HashMap<K, V, DefaultHashBuilder, Concurrent> {
    /// Creates an empty `HashMap` with [`DEFAULT_NUM_SHARDS`] shards.
    ///
    /// [`DEFAULT_NUM_SHARDS`]: constant.DEFAULT_NUM_SHARDS.html
    pub fn new() -> Self {
        Self::with_shards_capacity_and_hasher(
            DEFAULT_NUM_SHARDS,
            0,
            DefaultHashBuilder::default(),
        )
    }

    /// Creates an empty `HashMap` sized so that `capacity` entries, spread
    /// evenly across the shards, fit without a resize.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_shards_capacity_and_hasher(
            DEFAULT_NUM_SHARDS,
            capacity,
            DefaultHashBuilder::default(),
        )
    }

    /// Creates an empty `HashMap` with `num_shards` shards.
    ///
    /// # Panics
    ///
    /// Panics if `num_shards` is 0.
    pub fn with_shards(num_shards: usize) -> Self {
        Self::with_shards_capacity_and_hasher(num_shards, 0, DefaultHashBuilder::default())
    }

    /// Creates an empty `HashMap` with `num_shards` shards, sized so that
    /// `capacity` entries spread evenly across them fit without a resize.
    ///
    /// # Panics
    ///
    /// Panics if `num_shards` is 0.
    pub fn with_shards_and_capacity(num_shards: usize, capacity: usize) -> Self {
        Self::with_shards_capacity_and_hasher(
            num_shards,
            capacity,
            DefaultHashBuilder::default(),
        )
    }
}

impl<K, V, S> HashMap<K, V, S, Concurrent> {
    /// Creates an empty `HashMap` that will use `build_hasher` to hash keys.
    pub fn with_hasher(build_hasher: S) -> Self {
        Self::with_shards_capacity_and_hasher(DEFAULT_NUM_SHARDS, 0, build_hasher)
    }

    /// Creates an empty `HashMap` with `num_shards` shards that will use
    /// `build_hasher` to hash keys.
    ///
    /// # Panics
    ///
    /// Panics if `num_shards` is 0.
    pub fn with_shards_and_hasher(num_shards: usize, build_hasher: S) -> Self {
        Self::with_shards_capacity_and_hasher(num_shards, 0, build_hasher)
    }

    /// Creates an empty `HashMap` with `num_shards` shards that will use
    /// `build_hasher` to hash keys, sized so that `capacity` entries spread
    /// evenly across the shards fit without a resize.
    ///
    /// # Panics
    ///
    /// Panics if `num_shards` is 0 or if the capacity overflows.
    pub fn with_shards_capacity_and_hasher(
        num_shards: usize,
        capacity: usize,
        build_hasher: S,
    ) -> Self {
        Self::build(num_shards, capacity, build_hasher)
    }
}

impl<K, V, P: Policy> HashMap<K, V, DefaultHashBuilder, P> {
    /// Creates an empty `HashMap` with [`DEFAULT_NUM_SHARDS`] shards that
    /// locks according to `policy`.
    ///
    /// ```
    /// use dyna::{policy::Local, HashMap};
    ///
    /// let map = HashMap::with_policy(Local);
    /// map.set("foo", 5);
    ///
    /// assert_eq!(map.get("foo"), Some(5));
    /// ```
    ///
    /// [`DEFAULT_NUM_SHARDS`]: constant.DEFAULT_NUM_SHARDS.html
    pub fn with_policy(policy: P) -> Self {
        Self::with_shards_capacity_hasher_and_policy(
            DEFAULT_NUM_SHARDS,
            0,
            DefaultHashBuilder::default(),
            policy,
        )
    }

    /// Creates an empty `HashMap` with `num_shards` shards that locks
    /// according to `policy`.
    ///
    /// # Panics
    ///
    /// Panics if `num_shards` is 0.
    pub fn with_shards_and_policy(num_shards: usize, policy: P) -> Self {
        Self::with_shards_capacity_hasher_and_policy(
            num_shards,
            0,
            DefaultHashBuilder::default(),
            policy,
        )
    }
}

impl<K, V, S, P: Policy> HashMap<K, V, S, P> {
    /// Creates an empty `HashMap` from every construction parameter.
    ///
    /// # Panics
    ///
    /// Panics if `num_shards` is 0 or if the capacity overflows.
    pub fn with_shards_capacity_hasher_and_policy(
        num_shards: usize,
        capacity: usize,
        build_hasher: S,
        _policy: P,
    ) -> Self {
        Self::build(num_shards, capacity, build_hasher)
    }
}

impl<K, V, S: Default, P: Policy> Default for HashMap<K, V, S, P> {
    fn default() -> Self {
        Self::build(DEFAULT_NUM_SHARDS, 0, S::default())
    }
}

impl<K, V, S, P: Policy> HashMap<K, V, S, P> {
    fn build(num_shards: usize, capacity: usize, build_hasher: S) -> Self {
        assert!(num_shards > 0);

        let per_shard = capacity / num_shards + usize::from(capacity % num_shards != 0);
        let num_buckets =
            shard::buckets_for(per_shard, INITIAL_BUCKETS).expect("capacity overflow");

        let shards = (0..num_shards)
            .map(|index| Shard::new(index, num_shards, num_buckets))
            .collect();

        Self {
            shards,
            global: Global::new(),
            build_hasher,
            next_id: AtomicUsize::new(0),
        }
    }

    /// Returns the number of entries in the map.
    ///
    /// Insertions and removals still in progress on other threads are not
    /// counted.
    pub fn len(&self) -> usize {
        self.global.len()
    }

    /// Returns true if the map contains no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of shards, which is fixed at construction.
    ///
    /// This is not a bound on the number of entries.
    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Returns the total number of buckets across all shards.
    ///
    /// Intended for diagnostics; it says nothing about how many more entries
    /// fit before some shard resizes.
    pub fn num_buckets(&self) -> usize {
        self.shards.iter().map(Shard::capacity).sum()
    }

    /// Returns the number of entries stored in the `index`-th shard.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not less than [`num_shards`](#method.num_shards).
    pub fn shard_len(&self, index: usize) -> usize {
        self.shards[index].len()
    }

    /// Returns the number of buckets in the `index`-th shard.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not less than [`num_shards`](#method.num_shards).
    pub fn shard_capacity(&self, index: usize) -> usize {
        self.shards[index].capacity()
    }

    /// Returns a cursor at the oldest entry, or [`end`](#method.end) if the map
    /// is empty.
    pub fn begin(&self) -> Cursor<'_, K, V, S, P> {
        let global = self.global.order.lock();

        Cursor::new(self, global.head().and_then(|index| cursor::position(&global, index)))
    }

    /// Returns the past-the-end cursor.
    pub fn end(&self) -> Cursor<'_, K, V, S, P> {
        Cursor::new(self, None)
    }

    /// Returns an iterator over copies of every entry in insertion order.
    pub fn iter(&self) -> Iter<'_, K, V, S, P> {
        Iter::new(self)
    }
}

impl<K: Hash + Eq, V, S: BuildHasher, P: Policy> HashMap<K, V, S, P> {
    /// Returns the index of the shard that `key` is stored in.
    pub fn shard_index<Q: ?Sized + Hash>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
    {
        self.shard_index_from_hash(node::hash(&self.build_hasher, key))
    }

    fn shard_index_from_hash(&self, hash: u64) -> usize {
        (hash % self.shards.len() as u64) as usize
    }

    fn shard_for(&self, hash: u64) -> &Shard<K, V, P> {
        &self.shards[self.shard_index_from_hash(hash)]
    }

    fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns a copy of the value corresponding to `key`.
    ///
    /// `Q` can be any borrowed form of `K`, but [`Hash`] and [`Eq`] on `Q`
    /// *must* match that of `K`.
    ///
    /// [`Hash`]: https://doc.rust-lang.org/std/hash/trait.Hash.html
    /// [`Eq`]: https://doc.rust-lang.org/std/cmp/trait.Eq.html
    pub fn get<Q: ?Sized + Hash + Eq>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        V: Clone,
    {
        self.get_key_value_and(key, |_, v| v.clone())
    }

    /// Returns a copy of the key and value corresponding to `key`.
    pub fn get_key_value<Q: ?Sized + Hash + Eq>(&self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q> + Clone,
        V: Clone,
    {
        self.get_key_value_and(key, |k, v| (k.clone(), v.clone()))
    }

    /// Invokes `with_value` with a reference to the value corresponding to
    /// `key`.
    ///
    /// `with_value` is only invoked if `key` is present. It runs while the
    /// entry's bucket is locked.
    pub fn get_and<Q: ?Sized + Hash + Eq, F: FnOnce(&V) -> T, T>(
        &self,
        key: &Q,
        with_value: F,
    ) -> Option<T>
    where
        K: Borrow<Q>,
    {
        self.get_key_value_and(key, move |_, v| with_value(v))
    }

    /// Invokes `with_entry` with a reference to the key and value
    /// corresponding to `key`.
    pub fn get_key_value_and<Q: ?Sized + Hash + Eq, F: FnOnce(&K, &V) -> T, T>(
        &self,
        key: &Q,
        with_entry: F,
    ) -> Option<T>
    where
        K: Borrow<Q>,
    {
        let hash = node::hash(&self.build_hasher, key);

        self.shard_for(hash)
            .get_and(hash, key, move |node| with_entry(&node.key, &node.value))
    }

    /// Returns true if the map contains an entry for `key`.
    pub fn contains_key<Q: ?Sized + Hash + Eq>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
    {
        self.get_key_value_and(key, |_, _| ()).is_some()
    }

    /// Returns a cursor at the entry for `key`, or [`end`](#method.end) if
    /// there is none. Never modifies the map.
    pub fn find<Q: ?Sized + Hash + Eq>(&self, key: &Q) -> Cursor<'_, K, V, S, P>
    where
        K: Borrow<Q>,
    {
        let hash = node::hash(&self.build_hasher, key);
        let shard = self.shard_index_from_hash(hash);

        let position = self.shards[shard].get_and(hash, key, |node| cursor::Position {
            index: node.global,
            entry: Entry {
                shard,
                order: node.order,
                id: node.id,
                hash,
            },
        });

        Cursor::new(self, position)
    }

    /// Inserts a key-value pair, replacing the value of an existing entry.
    pub fn set(&self, key: K, value: V) {
        self.insert(key, value);
    }

    /// Inserts a key-value pair, then returns the value previously associated
    /// with `key`.
    ///
    /// An existing entry keeps its key and its place in insertion order; only
    /// its value is replaced. If the key was not present, [`None`] is returned
    /// and the entry becomes the newest.
    ///
    /// [`None`]: https://doc.rust-lang.org/std/option/enum.Option.html#variant.None
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let hash = node::hash(&self.build_hasher, &key);
        let node = Node {
            key,
            value,
            hash,
            id: self.next_id(),
            order: 0,
            global: 0,
        };

        self.shard_for(hash).insert(node, &self.global)
    }

    /// Invokes `with_value` with a mutable reference to the value stored under
    /// `key`, first inserting the value returned by `make_value` if there is
    /// none.
    ///
    /// Racing calls for the same absent key insert exactly one entry, and
    /// `make_value` is invoked only by the call that inserts it.
    pub fn get_or_insert_with_and<G, F, T>(&self, key: K, make_value: G, with_value: F) -> T
    where
        G: FnOnce() -> V,
        F: FnOnce(&mut V) -> T,
    {
        let hash = node::hash(&self.build_hasher, &key);
        let id = self.next_id();

        self.shard_for(hash).get_or_insert_and(
            hash,
            key,
            id,
            make_value,
            &self.global,
            with_value,
        )
    }

    /// Invokes `with_value` with a mutable reference to the value stored under
    /// `key`, inserting `V::default()` first if there is none.
    ///
    /// Unlike [`get`](#method.get) and [`find`](#method.find), reading a
    /// missing key this way stores it.
    pub fn get_or_default_and<F: FnOnce(&mut V) -> T, T>(&self, key: K, with_value: F) -> T
    where
        V: Default,
    {
        self.get_or_insert_with_and(key, V::default, with_value)
    }

    /// Returns a copy of the value stored under `key`, inserting and returning
    /// `V::default()` if there is none.
    pub fn get_or_default(&self, key: K) -> V
    where
        V: Default + Clone,
    {
        self.get_or_default_and(key, |v| v.clone())
    }

    /// Invokes `with_value` with a mutable reference to the value
    /// corresponding to `key`, if there is one.
    pub fn modify<Q: ?Sized + Hash + Eq, F: FnOnce(&mut V) -> T, T>(
        &self,
        key: &Q,
        with_value: F,
    ) -> Option<T>
    where
        K: Borrow<Q>,
    {
        let hash = node::hash(&self.build_hasher, key);

        self.shard_for(hash)
            .modify_and(hash, key, move |node| with_value(&mut node.value))
    }

    /// Removes the entry for `key` and returns its value.
    ///
    /// If `key` is absent, [`None`] is returned and the map is unchanged.
    ///
    /// [`None`]: https://doc.rust-lang.org/std/option/enum.Option.html#variant.None
    pub fn remove<Q: ?Sized + Hash + Eq>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes the entry for `key` and returns its key and value.
    pub fn remove_entry<Q: ?Sized + Hash + Eq>(&self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
    {
        let hash = node::hash(&self.build_hasher, key);
        self.shard_for(hash)
            .remove(hash, key, &self.global)
            .map(|node| (node.key, node.value))
    }

    /// Grows every shard so that its share of `additional` more entries, spread
    /// evenly across the shards, fits without a resize.
    ///
    /// Shards are grown one at a time; if one fails, the shards before it keep
    /// their new size and the rest are left alone.
    pub fn try_reserve(&self, additional: usize) -> Result<(), Error> {
        let num_shards = self.shards.len();
        let per_shard = additional / num_shards + usize::from(additional % num_shards != 0);

        self.shards
            .iter()
            .try_for_each(|shard| shard.reserve(per_shard))
    }
}

impl<'a, K: Clone, V: Clone, S, P: Policy> IntoIterator for &'a HashMap<K, V, S, P> {
    type Item = (K, V);
    type IntoIter = Iter<'a, K, V, S, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
