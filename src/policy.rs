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

//! Thread-safety policies.
//!
//! A [`Policy`] chooses the locks a map is built from. It is a type parameter
//! fixed for the lifetime of a map, so the choice costs nothing at runtime.
//!
//! [`Concurrent`] builds maps from `parking_lot`'s raw locks and a
//! mutex/condvar resize barrier; such maps may be shared between threads.
//!
//! [`Local`] builds maps from [`BorrowFlag`], a lock that never blocks, and a
//! barrier that never waits. `BorrowFlag` is not [`Sync`], so neither is a
//! `Local` map: it can be moved to another thread but not shared, and the
//! compiler enforces single-threaded use.
//!
//! [`Sync`]: https://doc.rust-lang.org/std/marker/trait.Sync.html

use std::{cell::Cell, mem};

use parking_lot::{
    lock_api::{GuardNoSend, RawMutex, RawRwLock},
    Condvar, Mutex,
};

pub(crate) type RwLock<P, T> = parking_lot::lock_api::RwLock<<P as Policy>::RawRwLock, T>;
pub(crate) type ChainLock<P, T> = parking_lot::lock_api::Mutex<<P as Policy>::RawMutex, T>;

/// A locking strategy for [`HashMap`](crate::HashMap).
pub trait Policy: 'static {
    /// Guards the bucket array of a shard and every bucket within it.
    type RawRwLock: RawRwLock;

    /// Guards the insertion-order chains.
    type RawMutex: RawMutex;

    /// Holds a shard's traffic back while it rehashes.
    type Barrier: ResizeBarrier;
}

/// Suspends a shard's operations for the duration of its rehash.
pub trait ResizeBarrier: Default {
    /// Blocks until no resize is in progress.
    fn wait(&self);

    /// Marks a resize as in progress.
    ///
    /// Returns `false` if a resize already was, in which case the caller must
    /// not resize.
    fn raise(&self) -> bool;

    /// Marks the resize as finished and wakes every waiter.
    fn lower(&self);
}

/// Real locks; maps may be shared between threads.
#[derive(Clone, Copy, Debug, Default)]
pub struct Concurrent;

impl Policy for Concurrent {
    type RawRwLock = parking_lot::RawRwLock;
    type RawMutex = parking_lot::RawMutex;
    type Barrier = Gate;
}

/// A resizing flag plus a condition variable to sleep on while it is set.
#[derive(Debug, Default)]
pub struct Gate {
    resizing: Mutex<bool>,
    resized: Condvar,
}

impl ResizeBarrier for Gate {
    fn wait(&self) {
        let mut resizing = self.resizing.lock();

        while *resizing {
            self.resized.wait(&mut resizing);
        }
    }

    fn raise(&self) -> bool {
        !mem::replace(&mut *self.resizing.lock(), true)
    }

    fn lower(&self) {
        *self.resizing.lock() = false;
        self.resized.notify_all();
    }
}

/// No synchronization; maps are confined to one thread at a time.
#[derive(Clone, Copy, Debug, Default)]
pub struct Local;

impl Policy for Local {
    type RawRwLock = BorrowFlag;
    type RawMutex = BorrowFlag;
    type Barrier = LocalGate;
}

const UNUSED: isize = 0;
const WRITING: isize = -1;

/// A lock that tracks borrows like a `RefCell` instead of blocking.
///
/// Acquiring a conflicting borrow panics. Within this crate that can only
/// happen when a callback re-enters the map it was invoked by, which would
/// deadlock under [`Concurrent`].
///
/// The check is not optional: guards hand out `&mut T`, and an unchecked
/// re-entrant borrow would alias it. Each acquire costs one `Cell` read and
/// one write.
#[derive(Debug)]
pub struct BorrowFlag {
    state: Cell<isize>,
}

#[cold]
fn conflicting_borrow() -> ! {
    panic!("map accessed re-entrantly while one of its locks was held")
}

unsafe impl RawRwLock for BorrowFlag {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = BorrowFlag {
        state: Cell::new(UNUSED),
    };

    type GuardMarker = GuardNoSend;

    fn lock_shared(&self) {
        if !self.try_lock_shared() {
            conflicting_borrow();
        }
    }

    fn try_lock_shared(&self) -> bool {
        let state = self.state.get();

        if state == WRITING {
            return false;
        }

        self.state.set(state + 1);

        true
    }

    unsafe fn unlock_shared(&self) {
        self.state.set(self.state.get() - 1);
    }

    fn lock_exclusive(&self) {
        if !self.try_lock_exclusive() {
            conflicting_borrow();
        }
    }

    fn try_lock_exclusive(&self) -> bool {
        if self.state.get() != UNUSED {
            return false;
        }

        self.state.set(WRITING);

        true
    }

    unsafe fn unlock_exclusive(&self) {
        self.state.set(UNUSED);
    }

    fn is_locked(&self) -> bool {
        self.state.get() != UNUSED
    }
}

unsafe impl RawMutex for BorrowFlag {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = BorrowFlag {
        state: Cell::new(UNUSED),
    };

    type GuardMarker = GuardNoSend;

    fn lock(&self) {
        RawRwLock::lock_exclusive(self);
    }

    fn try_lock(&self) -> bool {
        RawRwLock::try_lock_exclusive(self)
    }

    unsafe fn unlock(&self) {
        RawRwLock::unlock_exclusive(self);
    }

    fn is_locked(&self) -> bool {
        RawRwLock::is_locked(self)
    }
}

/// The single-threaded resize barrier: only records whether a resize is running.
#[derive(Debug, Default)]
pub struct LocalGate {
    resizing: Cell<bool>,
}

impl ResizeBarrier for LocalGate {
    fn wait(&self) {
        debug_assert!(!self.resizing.get());
    }

    fn raise(&self) -> bool {
        !self.resizing.replace(true)
    }

    fn lower(&self) {
        self.resizing.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    type FlagLock<T> = parking_lot::lock_api::RwLock<BorrowFlag, T>;

    #[test]
    fn borrow_flag_shares_reads() {
        let lock = FlagLock::new(5);

        let first = lock.read();
        let second = lock.read();

        assert_eq!(*first + *second, 10);
        assert!(lock.try_write().is_none());

        drop(first);
        assert!(lock.try_write().is_none());

        drop(second);
        *lock.write() = 6;

        assert_eq!(*lock.read(), 6);
    }

    #[test]
    #[should_panic(expected = "re-entrantly")]
    fn borrow_flag_rejects_write_during_read() {
        let lock = FlagLock::new(0);

        let _reader = lock.read();
        let _writer = lock.write();
    }

    #[test]
    fn local_gate_raises_once() {
        let gate = LocalGate::default();

        assert!(gate.raise());
        assert!(!gate.raise());

        gate.lower();
        gate.wait();

        assert!(gate.raise());
    }

    #[test]
    fn gate_releases_waiters() {
        let gate = Arc::new(Gate::default());
        let passed = Arc::new(AtomicBool::new(false));

        assert!(gate.raise());
        assert!(!gate.raise());

        let waiter = {
            let gate = gate.clone();
            let passed = passed.clone();

            thread::spawn(move || {
                gate.wait();
                passed.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!passed.load(Ordering::SeqCst));

        gate.lower();

        assert!(waiter.join().is_ok());
        assert!(passed.load(Ordering::SeqCst));
    }
}
