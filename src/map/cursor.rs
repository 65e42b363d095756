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

//! Traversal of a map's global insertion order.

use super::{chain::Chain, node::Entry, HashMap};

use crate::policy::Policy;

use std::{fmt, ptr};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Position {
    pub(crate) index: usize,
    pub(crate) entry: Entry,
}

pub(crate) fn position(global: &Chain<Entry>, index: usize) -> Option<Position> {
    global
        .get(index)
        .map(|&entry| Position { index, entry })
}

/// A position in a [`HashMap`]'s insertion order.
///
/// A cursor either points at an entry or is past-the-end, the position
/// following the newest entry that [`HashMap::end`] returns. Moving forward
/// from the newest entry reaches past-the-end and moving forward again wraps to
/// the oldest entry; moving backward mirrors this.
///
/// A cursor holds no locks and owns nothing. If its entry is removed, reading
/// through it returns [`None`] and moving it leaves it past-the-end. An entry
/// whose value is replaced by [`insert`] keeps its cursors.
///
/// Two cursors are equal if both are past-the-end or both point at the same
/// entry, which implies the same hash and equal keys.
///
/// [`HashMap`]: struct.HashMap.html
/// [`HashMap::end`]: struct.HashMap.html#method.end
/// [`insert`]: struct.HashMap.html#method.insert
/// [`None`]: https://doc.rust-lang.org/std/option/enum.Option.html#variant.None
pub struct Cursor<'a, K, V, S, P: Policy> {
    map: &'a HashMap<K, V, S, P>,
    position: Option<Position>,
}

impl<'a, K, V, S, P: Policy> Cursor<'a, K, V, S, P> {
    pub(crate) fn new(map: &'a HashMap<K, V, S, P>, position: Option<Position>) -> Self {
        Self { map, position }
    }

    /// Returns true if this cursor is past-the-end.
    pub fn is_end(&self) -> bool {
        self.position.is_none()
    }

    /// Returns the cached hash of the entry, or [`None`] past-the-end.
    ///
    /// [`None`]: https://doc.rust-lang.org/std/option/enum.Option.html#variant.None
    pub fn hash(&self) -> Option<u64> {
        self.position.map(|position| position.entry.hash)
    }

    /// Moves to the next newer entry.
    pub fn move_next(&mut self) {
        let global = self.map.global.order.lock();

        self.position = match self.position {
            Some(current) => live(&global, current)
                .and_then(|index| global.next(index))
                .and_then(|index| position(&global, index)),
            None => global.head().and_then(|index| position(&global, index)),
        };
    }

    /// Moves to the next older entry.
    pub fn move_prev(&mut self) {
        let global = self.map.global.order.lock();

        self.position = match self.position {
            Some(current) => live(&global, current)
                .and_then(|index| global.prev(index))
                .and_then(|index| position(&global, index)),
            None => global.tail().and_then(|index| position(&global, index)),
        };
    }

    /// Moves `n` entries forward.
    pub fn advance(&mut self, n: usize) {
        for _ in 0..n {
            self.move_next();
        }
    }

    /// Moves `n` entries backward.
    pub fn retreat(&mut self, n: usize) {
        for _ in 0..n {
            self.move_prev();
        }
    }

    /// Invokes `with_entry` with references to the key and value of the entry.
    ///
    /// Returns [`None`] without invoking `with_entry` if the cursor is
    /// past-the-end or its entry has been removed.
    ///
    /// [`None`]: https://doc.rust-lang.org/std/option/enum.Option.html#variant.None
    pub fn with<F: FnOnce(&K, &V) -> T, T>(&self, with_entry: F) -> Option<T> {
        let Position { entry, .. } = self.position?;

        self.map.shards[entry.shard].at_and(entry.order, entry.id, |node| {
            with_entry(&node.key, &node.value)
        })
    }

    /// Invokes `with_entry` with a reference to the key and a mutable
    /// reference to the value of the entry.
    pub fn with_mut<F: FnOnce(&K, &mut V) -> T, T>(&self, with_entry: F) -> Option<T> {
        let Position { entry, .. } = self.position?;

        self.map.shards[entry.shard].at_mut_and(entry.order, entry.id, |node| {
            with_entry(&node.key, &mut node.value)
        })
    }

    /// Returns a copy of the entry's key.
    pub fn key(&self) -> Option<K>
    where
        K: Clone,
    {
        self.with(|k, _| k.clone())
    }

    /// Returns a copy of the entry's value.
    pub fn value(&self) -> Option<V>
    where
        V: Clone,
    {
        self.with(|_, v| v.clone())
    }

    /// Returns a copy of the entry's key and value.
    pub fn entry(&self) -> Option<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        self.with(|k, v| (k.clone(), v.clone()))
    }
}

/// The index of `position` if it still refers to the entry it was taken from.
fn live(global: &Chain<Entry>, position: Position) -> Option<usize> {
    global
        .get(position.index)
        .filter(|entry| entry.id == position.entry.id)
        .map(|_| position.index)
}

impl<'a, K, V, S, P: Policy> Clone for Cursor<'a, K, V, S, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, K, V, S, P: Policy> Copy for Cursor<'a, K, V, S, P> {}

impl<'a, K, V, S, P: Policy> PartialEq for Cursor<'a, K, V, S, P> {
    fn eq(&self, other: &Self) -> bool {
        match (self.position, other.position) {
            (None, None) => true,
            (Some(this), Some(that)) => ptr::eq(self.map, other.map) && this == that,
            _ => false,
        }
    }
}

impl<'a, K, V, S, P: Policy> Eq for Cursor<'a, K, V, S, P> {}

impl<'a, K, V, S, P: Policy> fmt::Debug for Cursor<'a, K, V, S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("position", &self.position)
            .finish()
    }
}

/// An iterator over copies of a map's entries in insertion order.
///
/// Created by [`HashMap::iter`]. Each step records the entry that follows the
/// one it yields, so removing entries that were already visited does not
/// disturb the walk. Entries inserted while iterating are visited if they are
/// linked before the iterator reaches the end. If both the entry about to be
/// visited and the last visited entry are removed, iteration ends early.
///
/// [`HashMap::iter`]: struct.HashMap.html#method.iter
pub struct Iter<'a, K, V, S, P: Policy> {
    map: &'a HashMap<K, V, S, P>,
    visited: Option<Position>,
    upcoming: Option<Position>,
    finished: bool,
}

impl<'a, K, V, S, P: Policy> Iter<'a, K, V, S, P> {
    pub(crate) fn new(map: &'a HashMap<K, V, S, P>) -> Self {
        Self {
            map,
            visited: None,
            upcoming: None,
            finished: false,
        }
    }

    /// The global index to visit next.
    ///
    /// Prefers the recorded successor. If it was removed, continues after the
    /// last visited entry instead, and from the head if nothing was visited.
    fn resume(&self, global: &Chain<Entry>) -> Option<usize> {
        if let Some(index) = self.upcoming.and_then(|upcoming| live(global, upcoming)) {
            return Some(index);
        }

        match self.visited {
            Some(visited) => live(global, visited).and_then(|index| global.next(index)),
            None => global.head(),
        }
    }
}

impl<'a, K: Clone, V: Clone, S, P: Policy> Iterator for Iter<'a, K, V, S, P> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let step = {
                let global = self.map.global.order.lock();

                self.resume(&global).and_then(|index| {
                    let successor = global
                        .next(index)
                        .and_then(|index| position(&global, index));

                    position(&global, index).map(|current| (current, successor))
                })
            };

            let (current, successor) = match step {
                Some(step) => step,
                None => {
                    self.finished = true;

                    return None;
                }
            };

            self.visited = Some(current);
            self.upcoming = successor;
            self.finished = successor.is_none();

            let Position { entry, .. } = current;
            let item = self.map.shards[entry.shard].at_and(entry.order, entry.id, |node| {
                (node.key.clone(), node.value.clone())
            });

            if item.is_some() {
                return item;
            }
        }

        None
    }
}
