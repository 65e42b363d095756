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

//! A single shard: a chained bucket array that grows on its own.
//!
//! Every operation first waits on the shard's resize barrier, then holds the
//! bucket array lock shared for its whole duration and locks exactly one
//! bucket. A resize raises the barrier, so new arrivals park on it, and then
//! takes the bucket array lock exclusively, which drains the operations that
//! were already inside.

use super::{
    chain::Chain,
    node::{Entry, Location, Node},
};

use crate::{
    error::Error,
    policy::{ChainLock, Policy, ResizeBarrier, RwLock},
};

use std::{
    borrow::Borrow,
    mem,
    sync::atomic::{AtomicUsize, Ordering},
};

use log::{debug, trace, warn};
use parking_lot::lock_api;

/// Number of buckets a shard starts with unless given a capacity hint.
pub(crate) const INITIAL_BUCKETS: usize = 8;

/// Entries per hundred buckets above which a shard doubles.
pub(crate) const LOAD_FACTOR: usize = 80;

pub(crate) type Bucket<K, V> = Chain<Node<K, V>>;

/// State shared by every shard of a map: the global insertion order and the
/// number of entries linked into it.
pub(crate) struct Global<P: Policy> {
    pub(crate) order: ChainLock<P, Chain<Entry>>,
    pub(crate) len: AtomicUsize,
}

impl<P: Policy> Global<P> {
    pub(crate) fn new() -> Self {
        Self {
            order: lock_api::Mutex::new(Chain::new()),
            len: AtomicUsize::new(0),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }
}

pub(crate) struct Shard<K, V, P: Policy> {
    index: usize,
    stride: u64,
    barrier: P::Barrier,
    buckets: RwLock<P, Box<[RwLock<P, Bucket<K, V>>]>>,
    order: ChainLock<P, Chain<Location>>,
    occupied: AtomicUsize,
}

impl<K, V, P: Policy> Shard<K, V, P> {
    /// Creates the `index`-th of `num_shards` shards.
    pub(crate) fn new(index: usize, num_shards: usize, num_buckets: usize) -> Self {
        assert!(num_buckets > 0);

        Self {
            index,
            stride: num_shards as u64,
            barrier: P::Barrier::default(),
            buckets: lock_api::RwLock::new(new_buckets::<K, V, P>(num_buckets)),
            order: lock_api::Mutex::new(Chain::new()),
            occupied: AtomicUsize::new(0),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.occupied.load(Ordering::Relaxed)
    }

    pub(crate) fn capacity(&self) -> usize {
        self.barrier.wait();

        self.buckets.read().len()
    }

    /// The low bits of `hash` already chose this shard, so buckets are picked
    /// from the bits above them.
    fn bucket_index(&self, hash: u64, num_buckets: usize) -> usize {
        ((hash / self.stride) % num_buckets as u64) as usize
    }

    /// Invokes `with_node` on the node stored at the `order`-th link of this
    /// shard's insertion-order chain, if it still holds node `id`.
    pub(crate) fn at_and<F: FnOnce(&Node<K, V>) -> T, T>(
        &self,
        order: usize,
        id: usize,
        with_node: F,
    ) -> Option<T> {
        self.barrier.wait();

        let buckets = self.buckets.read();
        let location = self.locate(order, id)?;
        let bucket = buckets.get(location.bucket)?.read();

        bucket
            .get(location.slot)
            .filter(|node| node.id == id)
            .map(with_node)
    }

    pub(crate) fn at_mut_and<F: FnOnce(&mut Node<K, V>) -> T, T>(
        &self,
        order: usize,
        id: usize,
        with_node: F,
    ) -> Option<T> {
        self.barrier.wait();

        let buckets = self.buckets.read();
        let location = self.locate(order, id)?;
        let mut bucket = buckets.get(location.bucket)?.write();

        bucket
            .get_mut(location.slot)
            .filter(|node| node.id == id)
            .map(with_node)
    }

    fn locate(&self, order: usize, id: usize) -> Option<Location> {
        self.order
            .lock()
            .get(order)
            .copied()
            .filter(|location| location.id == id)
    }

    /// Appends `node` to `bucket`, this shard's insertion order and the global
    /// order, and counts it. The caller holds the bucket's lock exclusively.
    fn link<'b>(
        &self,
        bucket: &'b mut Bucket<K, V>,
        bucket_index: usize,
        mut node: Node<K, V>,
        global: &Global<P>,
    ) -> &'b mut Node<K, V> {
        let slot = bucket.vacant_index();

        node.order = self.order.lock().push_back(Location {
            bucket: bucket_index,
            slot,
            id: node.id,
        });
        node.global = global.order.lock().push_back(Entry {
            shard: self.index,
            order: node.order,
            id: node.id,
            hash: node.hash,
        });

        let stored = bucket.push_back(node);
        debug_assert_eq!(stored, slot);

        self.occupied.fetch_add(1, Ordering::Relaxed);
        global.len.fetch_add(1, Ordering::Relaxed);

        &mut bucket[stored]
    }

    /// Doubles the bucket array if the load factor has been exceeded.
    ///
    /// Must be called without holding any of this shard's locks.
    fn grow_if_overloaded(&self) {
        if !is_overloaded(self.len(), self.capacity()) {
            return;
        }

        if !self.barrier.raise() {
            trace!("shard {} is already being resized", self.index);

            return;
        }

        let result = self.rehash(|occupied, num_buckets| {
            if !is_overloaded(occupied, num_buckets) {
                return Ok(None);
            }

            num_buckets
                .checked_mul(2)
                .map(Some)
                .ok_or(Error::CapacityOverflow {
                    shard: self.index,
                    requested: 1,
                })
        });

        self.barrier.lower();

        if let Err(e) = result {
            warn!("shard {} was not resized: {}", self.index, e);
        }
    }

    /// Grows the bucket array until `additional` more entries fit without
    /// exceeding the load factor.
    pub(crate) fn reserve(&self, additional: usize) -> Result<(), Error> {
        while !self.barrier.raise() {
            self.barrier.wait();
        }

        let result = self.rehash(|occupied, num_buckets| {
            let overflow = Error::CapacityOverflow {
                shard: self.index,
                requested: additional,
            };
            let grown = occupied
                .checked_add(additional)
                .and_then(|total| buckets_for(total, num_buckets))
                .ok_or(overflow)?;

            Ok(Some(grown).filter(|&grown| grown != num_buckets))
        });

        self.barrier.lower();

        result
    }

    /// Rebuilds the bucket array with the length chosen by `resize`.
    ///
    /// `resize` sees the occupancy and bucket count once the array is locked
    /// and returns `Ok(None)` to leave the shard as it is. The new array is
    /// allocated before any node moves, so a failed allocation leaves the shard
    /// untouched. The caller must have raised the barrier.
    fn rehash<F>(&self, resize: F) -> Result<(), Error>
    where
        F: FnOnce(usize, usize) -> Result<Option<usize>, Error>,
    {
        let mut buckets = self.buckets.write();

        let num_buckets = match resize(self.len(), buckets.len())? {
            Some(num_buckets) => num_buckets,
            None => return Ok(()),
        };

        let mut rehashed = Vec::new();
        rehashed.try_reserve_exact(num_buckets)?;
        rehashed.resize_with(num_buckets, || lock_api::RwLock::new(Chain::new()));

        let mut order = self.order.lock();
        let mut moved = 0;
        let mut current = order.head();

        while let Some(index) = current {
            current = order.next(index);

            let location = &mut order[index];

            if let Some(node) = buckets[location.bucket].get_mut().remove(location.slot) {
                let bucket_index = self.bucket_index(node.hash, num_buckets);

                location.bucket = bucket_index;
                location.slot = rehashed[bucket_index].get_mut().push_back(node);
                moved += 1;
            }
        }

        self.occupied.store(moved, Ordering::Relaxed);

        let previous = mem::replace(&mut *buckets, rehashed.into_boxed_slice());

        debug!(
            "shard {}: rehashed {} nodes from {} to {} buckets",
            self.index,
            moved,
            previous.len(),
            num_buckets
        );

        Ok(())
    }
}

impl<K: Eq, V, P: Policy> Shard<K, V, P> {
    pub(crate) fn get_and<Q, F, T>(&self, hash: u64, key: &Q, with_node: F) -> Option<T>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
        F: FnOnce(&Node<K, V>) -> T,
    {
        self.barrier.wait();

        let buckets = self.buckets.read();
        let bucket = buckets[self.bucket_index(hash, buckets.len())].read();

        bucket
            .iter()
            .map(|(_, node)| node)
            .find(|node| node.matches(hash, key))
            .map(with_node)
    }

    pub(crate) fn modify_and<Q, F, T>(&self, hash: u64, key: &Q, with_node: F) -> Option<T>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
        F: FnOnce(&mut Node<K, V>) -> T,
    {
        self.barrier.wait();

        let buckets = self.buckets.read();
        let mut bucket = buckets[self.bucket_index(hash, buckets.len())].write();
        let slot = find_slot(&bucket, hash, key)?;

        Some(with_node(&mut bucket[slot]))
    }

    /// Stores `node`, or overwrites the value of the node already stored under
    /// its key and returns the previous value.
    pub(crate) fn insert(&self, node: Node<K, V>, global: &Global<P>) -> Option<V> {
        let previous = {
            self.barrier.wait();

            let buckets = self.buckets.read();
            let bucket_index = self.bucket_index(node.hash, buckets.len());
            let mut bucket = buckets[bucket_index].write();

            match find_slot(&bucket, node.hash, &node.key) {
                Some(slot) => Some(mem::replace(&mut bucket[slot].value, node.value)),
                None => {
                    self.link(&mut bucket, bucket_index, node, global);

                    None
                }
            }
        };

        if previous.is_none() {
            self.grow_if_overloaded();
        }

        previous
    }

    /// Invokes `with_value` on the value stored under `key`, first storing
    /// `make_value()` if there is none.
    ///
    /// The lookup and the insertion happen under one exclusive bucket lock, so
    /// racing callers for the same absent key store exactly one node.
    pub(crate) fn get_or_insert_and<G, F, T>(
        &self,
        hash: u64,
        key: K,
        id: usize,
        make_value: G,
        global: &Global<P>,
        with_value: F,
    ) -> T
    where
        G: FnOnce() -> V,
        F: FnOnce(&mut V) -> T,
    {
        let (result, inserted) = {
            self.barrier.wait();

            let buckets = self.buckets.read();
            let bucket_index = self.bucket_index(hash, buckets.len());
            let mut bucket = buckets[bucket_index].write();

            match find_slot(&bucket, hash, &key) {
                Some(slot) => (with_value(&mut bucket[slot].value), false),
                None => {
                    let node = Node {
                        key,
                        value: make_value(),
                        hash,
                        id,
                        order: 0,
                        global: 0,
                    };
                    let node = self.link(&mut bucket, bucket_index, node, global);

                    (with_value(&mut node.value), true)
                }
            }
        };

        if inserted {
            self.grow_if_overloaded();
        }

        result
    }

    /// Unlinks the node stored under `key` from all three chains and uncounts
    /// it before the bucket is unlocked.
    pub(crate) fn remove<Q>(&self, hash: u64, key: &Q, global: &Global<P>) -> Option<Node<K, V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        self.barrier.wait();

        let buckets = self.buckets.read();
        let mut bucket = buckets[self.bucket_index(hash, buckets.len())].write();
        let slot = find_slot(&bucket, hash, key)?;
        let node = bucket.remove(slot)?;

        self.order.lock().remove(node.order);
        global.order.lock().remove(node.global);
        self.occupied.fetch_sub(1, Ordering::Relaxed);
        global.len.fetch_sub(1, Ordering::Relaxed);

        Some(node)
    }
}

fn new_buckets<K, V, P: Policy>(len: usize) -> Box<[RwLock<P, Bucket<K, V>>]> {
    (0..len).map(|_| lock_api::RwLock::new(Chain::new())).collect()
}

fn find_slot<K, V, Q>(bucket: &Bucket<K, V>, hash: u64, key: &Q) -> Option<usize>
where
    K: Borrow<Q>,
    Q: ?Sized + Eq,
{
    bucket
        .iter()
        .find(|(_, node)| node.matches(hash, key))
        .map(|(slot, _)| slot)
}

/// The smallest doubling of `num_buckets` that holds `entries` without
/// exceeding the load factor.
pub(crate) fn buckets_for(entries: usize, mut num_buckets: usize) -> Option<usize> {
    let scaled = entries.checked_mul(100)?;
    let wanted = scaled / LOAD_FACTOR + usize::from(scaled % LOAD_FACTOR != 0);

    while num_buckets < wanted {
        num_buckets = num_buckets.checked_mul(2)?;
    }

    Some(num_buckets)
}

fn is_overloaded(occupied: usize, num_buckets: usize) -> bool {
    occupied.saturating_mul(100) / num_buckets > LOAD_FACTOR
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::policy::{Concurrent, Local};

    fn node(key: u64, id: usize) -> Node<u64, u64> {
        Node {
            key,
            value: key * 10,
            hash: key,
            id,
            order: 0,
            global: 0,
        }
    }

    fn global<P: Policy>() -> Global<P> {
        Global::new()
    }

    fn keys_in_order<P: Policy>(shard: &Shard<u64, u64, P>) -> Vec<u64> {
        let links: Vec<_> = shard
            .order
            .lock()
            .iter()
            .map(|(index, location)| (index, location.id))
            .collect();

        links
            .into_iter()
            .map(|(index, id)| {
                shard
                    .at_and(index, id, |node| node.key)
                    .expect("order chain points at a missing node")
            })
            .collect()
    }

    #[test]
    fn load_factor_threshold() {
        assert!(!is_overloaded(6, 8));
        assert!(is_overloaded(7, 8));
        assert!(!is_overloaded(12, 16));
        assert!(is_overloaded(13, 16));
    }

    #[test]
    fn buckets_for_stays_under_the_load_factor() {
        assert_eq!(buckets_for(0, 8), Some(8));
        assert_eq!(buckets_for(6, 8), Some(8));
        assert_eq!(buckets_for(7, 8), Some(16));
        assert_eq!(buckets_for(100, 8), Some(128));
        assert_eq!(buckets_for(usize::MAX, 8), None);

        for entries in 0..1000 {
            let num_buckets = buckets_for(entries, 8).unwrap();
            assert!(!is_overloaded(entries, num_buckets));
        }
    }

    #[test]
    fn seventh_insert_doubles_eight_buckets() {
        let shard = Shard::<u64, u64, Local>::new(0, 1, INITIAL_BUCKETS);
        let global = global::<Local>();

        for key in 0..6 {
            assert_eq!(shard.insert(node(key, key as usize), &global), None);
        }

        assert_eq!(shard.capacity(), 8);

        assert_eq!(shard.insert(node(6, 6), &global), None);

        assert_eq!(shard.capacity(), 16);
        assert_eq!(shard.len(), 7);
        assert_eq!(global.order.lock().len(), 7);
        assert_eq!(global.len(), 7);
        assert_eq!(keys_in_order(&shard), (0..7).collect::<Vec<_>>());

        for key in 0..7 {
            assert_eq!(shard.get_and(key, &key, |node| node.value), Some(key * 10));
        }
    }

    #[test]
    fn remove_decrements_occupancy() {
        let shard = Shard::<u64, u64, Concurrent>::new(0, 1, INITIAL_BUCKETS);
        let global = global::<Concurrent>();

        for key in 0..6 {
            shard.insert(node(key, key as usize), &global);
        }

        for key in 0..6 {
            let removed = shard.remove(key, &key, &global).map(|node| node.value);
            assert_eq!(removed, Some(key * 10));
        }

        assert_eq!(shard.len(), 0);
        assert!(global.order.lock().head().is_none());
        assert_eq!(global.len(), 0);

        for key in 0..6 {
            shard.insert(node(key, 6 + key as usize), &global);
        }

        assert_eq!(shard.capacity(), 8);
    }

    #[test]
    fn buckets_use_bits_above_the_shard_index() {
        let shard = Shard::<u64, u64, Local>::new(3, 4, INITIAL_BUCKETS);

        assert_eq!(shard.bucket_index(3, 8), 0);
        assert_eq!(shard.bucket_index(7, 8), 1);
        assert_eq!(shard.bucket_index(4 * 9 + 3, 8), 1);
    }

    #[test]
    fn reserve_grows_in_powers_of_two() {
        let shard = Shard::<u64, u64, Local>::new(0, 1, INITIAL_BUCKETS);
        let global = global::<Local>();

        shard.reserve(100).unwrap();
        assert_eq!(shard.capacity(), 128);

        for key in 0..100 {
            shard.insert(node(key, key as usize), &global);
        }

        assert_eq!(shard.capacity(), 128);
        assert_eq!(keys_in_order(&shard), (0..100).collect::<Vec<_>>());

        shard.reserve(0).unwrap();
        assert_eq!(shard.capacity(), 128);

        assert!(matches!(
            shard.reserve(usize::MAX),
            Err(Error::CapacityOverflow { shard: 0, .. })
        ));
        assert_eq!(shard.capacity(), 128);
    }

    #[test]
    fn stale_ids_do_not_resolve() {
        let shard = Shard::<u64, u64, Local>::new(0, 1, INITIAL_BUCKETS);
        let global = global::<Local>();

        shard.insert(node(1, 1), &global);
        let (order, id) = shard.get_and(1, &1, |node| (node.order, node.id)).unwrap();

        shard.remove(1, &1, &global);
        shard.insert(node(1, 2), &global);

        assert_eq!(shard.get_and(1, &1, |node| node.order), Some(order));
        assert_eq!(shard.at_and(order, id, |node| node.key), None);
        assert_eq!(shard.at_and(order, 2, |node| node.key), Some(1));
    }
}
