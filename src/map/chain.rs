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

//! Doubly linked lists threaded through a slab.
//!
//! Every ordering in the map is a `Chain`: the collision chain of a bucket,
//! the insertion order of a shard, and the global insertion order. Links are
//! slab indices rather than pointers, so an entry can be unlinked from one
//! chain without invalidating references held by the others; each of those
//! stores the index and re-validates it.

use std::ops::{Index, IndexMut};

use slab::Slab;

struct Link<T> {
    prev: Option<usize>,
    next: Option<usize>,
    item: T,
}

pub(crate) struct Chain<T> {
    links: Slab<Link<T>>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<T> Chain<T> {
    pub(crate) fn new() -> Self {
        Self {
            links: Slab::new(),
            head: None,
            tail: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.links.len()
    }

    pub(crate) fn head(&self) -> Option<usize> {
        self.head
    }

    pub(crate) fn tail(&self) -> Option<usize> {
        self.tail
    }

    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        self.links.get(index).map(|link| &link.item)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.links.get_mut(index).map(|link| &mut link.item)
    }

    /// The index following `index`, or `None` at the tail or if `index` is
    /// vacant.
    pub(crate) fn next(&self, index: usize) -> Option<usize> {
        self.links.get(index).and_then(|link| link.next)
    }

    pub(crate) fn prev(&self, index: usize) -> Option<usize> {
        self.links.get(index).and_then(|link| link.prev)
    }

    /// The index the next `push_back` will return.
    pub(crate) fn vacant_index(&self) -> usize {
        self.links.vacant_key()
    }

    /// Appends `item` and returns the index it is stored at.
    pub(crate) fn push_back(&mut self, item: T) -> usize {
        let index = self.links.insert(Link {
            prev: self.tail,
            next: None,
            item,
        });

        match self.tail {
            Some(tail) => self.links[tail].next = Some(index),
            None => self.head = Some(index),
        }

        self.tail = Some(index);

        index
    }

    /// Unlinks the item at `index`, patching both neighbors.
    pub(crate) fn remove(&mut self, index: usize) -> Option<T> {
        let Link { prev, next, item } = self.links.try_remove(index)?;

        match prev {
            Some(prev) => self.links[prev].next = next,
            None => self.head = next,
        }

        match next {
            Some(next) => self.links[next].prev = prev,
            None => self.tail = prev,
        }

        Some(item)
    }

    pub(crate) fn iter(&self) -> Iter<'_, T> {
        Iter {
            chain: self,
            current: self.head,
        }
    }
}

impl<T> Index<usize> for Chain<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.links[index].item
    }
}

impl<T> IndexMut<usize> for Chain<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.links[index].item
    }
}

/// Walks a chain from head to tail, yielding each index and item.
pub(crate) struct Iter<'a, T> {
    chain: &'a Chain<T>,
    current: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.current?;
        let link = &self.chain.links[index];
        self.current = link.next;

        Some((index, &link.item))
    }
}
