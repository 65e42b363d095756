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

use std::{
    borrow::Borrow,
    hash::{BuildHasher, Hash, Hasher},
};

/// A stored key-value pair.
///
/// The bucket chain that owns a node is its collision chain; `order` and
/// `global` index the node's links in its shard's insertion-order chain and in
/// the map's global chain. Both of those store a [`Location`] or [`Entry`]
/// pointing back here, tagged with `id` so that a stale index is recognized
/// after its slot has been reused.
pub(crate) struct Node<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) hash: u64,
    pub(crate) id: usize,
    pub(crate) order: usize,
    pub(crate) global: usize,
}

impl<K, V> Node<K, V> {
    pub(crate) fn matches<Q: ?Sized + Eq>(&self, hash: u64, key: &Q) -> bool
    where
        K: Borrow<Q>,
    {
        self.hash == hash && self.key.borrow() == key
    }
}

impl<K: Eq, V> PartialEq for Node<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other.hash, &other.key)
    }
}

/// Item of a shard's insertion-order chain: the bucket and slot a node is
/// stored in. Rewritten whenever the shard rehashes.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Location {
    pub(crate) bucket: usize,
    pub(crate) slot: usize,
    pub(crate) id: usize,
}

/// Item of the map's global chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Entry {
    pub(crate) shard: usize,
    pub(crate) order: usize,
    pub(crate) id: usize,
    pub(crate) hash: u64,
}

pub(crate) fn hash<K: ?Sized + Hash, H: BuildHasher>(build_hasher: &H, key: &K) -> u64 {
    let mut hasher = build_hasher.build_hasher();
    key.hash(&mut hasher);

    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(key: &str, hash: u64, id: usize) -> Node<String, i32> {
        Node {
            key: key.to_string(),
            value: id as i32,
            hash,
            id,
            order: 0,
            global: 0,
        }
    }

    #[test]
    fn equality_is_by_hash_and_key() {
        assert!(node("foo", 1, 0) == node("foo", 1, 1));
        assert!(node("foo", 1, 0) != node("bar", 1, 0));
        assert!(node("foo", 1, 0) != node("foo", 2, 0));
    }

    #[test]
    fn matches_borrowed_keys() {
        let node = node("foo", 7, 0);

        assert!(node.matches(7, "foo"));
        assert!(!node.matches(7, "bar"));
        assert!(!node.matches(8, "foo"));
    }
}
