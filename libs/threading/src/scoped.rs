// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;
use core::marker::PhantomData;

use crate::GuardNoSend;
use crate::mutex::RawLock;

/// A stack based object that locks `L` when created and unlocks it when dropped, or, if
/// `INVERTED` is set, the other way around.
///
/// Use the [`ScopedLock`] and [`ScopedUnlock`] aliases instead of naming this type directly.
/// The reverse action runs exactly once, on every exit path of the enclosing scope, including
/// early returns and unwinding.
#[clippy::has_significant_drop]
#[must_use = "if unused the lock action is immediately reversed"]
pub struct ScopedLockT<'a, L: RawLock + ?Sized, const INVERTED: bool> {
    lock: &'a L,
    marker: PhantomData<GuardNoSend>,
}

/// Locks the mutex on creation and unlocks it on drop.
///
/// Precondition: the mutex is not held by this thread.
///
/// ```
/// # use threading::{Mutex, ScopedLock};
/// fn find(mutex: &Mutex, haystack: &[u32], needle: u32) -> bool {
///     let _guard = ScopedLock::new(mutex);
///     for &x in haystack {
///         if x == needle {
///             return true; // the mutex is released here...
///         }
///     }
///     false // ...and here
/// }
/// ```
pub type ScopedLock<'a, L> = ScopedLockT<'a, L, false>;

/// Unlocks the mutex on creation and relocks it on drop.
///
/// Used to temporarily leave a critical section while guaranteeing the mutex is held again
/// before control returns to the enclosing scope.
pub type ScopedUnlock<'a, L> = ScopedLockT<'a, L, true>;

impl<'a, L: RawLock + ?Sized> ScopedLockT<'a, L, false> {
    /// Locks `lock`, blocking until it becomes available.
    #[inline]
    pub fn new(lock: &'a L) -> Self {
        lock.lock();
        Self {
            lock,
            marker: PhantomData,
        }
    }
}

impl<'a, L: RawLock + ?Sized> ScopedLockT<'a, L, true> {
    /// Unlocks `lock`, it will be locked again when the returned guard is dropped.
    ///
    /// # Safety
    ///
    /// The calling thread must hold `lock`.
    #[inline]
    pub unsafe fn new(lock: &'a L) -> Self {
        // Safety: ensured by caller
        unsafe { lock.unlock() };
        Self {
            lock,
            marker: PhantomData,
        }
    }
}

impl<L: RawLock + ?Sized, const INVERTED: bool> Drop for ScopedLockT<'_, L, INVERTED> {
    #[inline]
    fn drop(&mut self) {
        if INVERTED {
            self.lock.lock();
        } else {
            // Safety: the guard acquired the lock in `new` and is the only one to release it
            unsafe { self.lock.unlock() };
        }
    }
}

impl<L: RawLock + ?Sized, const INVERTED: bool> fmt::Debug for ScopedLockT<'_, L, INVERTED> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedLockT")
            .field("inverted", &INVERTED)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;
    use crate::{LazyMutex, Mutex};

    /// Counts lock and unlock calls so tests can check the guards act exactly once.
    struct CountingLock {
        inner: Mutex,
        locks: AtomicUsize,
        unlocks: AtomicUsize,
    }

    impl CountingLock {
        fn new() -> Self {
            Self {
                inner: Mutex::new(),
                locks: AtomicUsize::new(0),
                unlocks: AtomicUsize::new(0),
            }
        }

        fn counts(&self) -> (usize, usize) {
            (
                self.locks.load(Ordering::Relaxed),
                self.unlocks.load(Ordering::Relaxed),
            )
        }
    }

    impl RawLock for CountingLock {
        fn lock(&self) {
            self.inner.lock();
            self.locks.fetch_add(1, Ordering::Relaxed);
        }

        unsafe fn unlock(&self) {
            self.unlocks.fetch_add(1, Ordering::Relaxed);
            // Safety: ensured by caller
            unsafe { self.inner.unlock() };
        }
    }

    /// Whether another thread currently holds `m`. `try_lock` never succeeds while another
    /// thread holds the mutex, so `true` is reliable.
    fn held_elsewhere(m: &Mutex) -> bool {
        thread::scope(|s| {
            s.spawn(|| {
                if m.try_lock() {
                    // Safety: we just acquired the lock
                    unsafe { m.unlock() };
                    false
                } else {
                    true
                }
            })
            .join()
            .unwrap()
        })
    }

    /// Blocks until another thread managed to lock and unlock `m`.
    fn assert_free(m: &Mutex) {
        thread::scope(|s| {
            s.spawn(|| m.with_lock(|| ())).join().unwrap();
        });
    }

    #[test]
    fn scoped_lock_releases_on_early_return() {
        let lock = CountingLock::new();

        fn find(lock: &CountingLock, needle: u32) -> bool {
            let _guard = ScopedLock::new(lock);
            for x in 0..10 {
                if x == needle {
                    return true;
                }
            }
            false
        }

        assert!(find(&lock, 3));
        assert_eq!(lock.counts(), (1, 1));
        assert!(!find(&lock, 42));
        assert_eq!(lock.counts(), (2, 2));
    }

    #[test]
    fn scoped_lock_releases_on_unwind() {
        let lock = CountingLock::new();

        let res = panic::catch_unwind(AssertUnwindSafe(|| {
            let _guard = ScopedLock::new(&lock);
            panic!("boom");
        }));
        assert!(res.is_err());
        assert_eq!(lock.counts(), (1, 1));

        // the underlying mutex is actually free again
        assert_free(&lock.inner);
    }

    #[test]
    fn scoped_lock_holds_mutex() {
        let m = Mutex::new();
        {
            let _guard = ScopedLock::new(&m);
            assert!(held_elsewhere(&m));
        }
        assert_free(&m);
    }

    #[test]
    fn scoped_unlock_reacquires() {
        let lock = CountingLock::new();

        let _outer = ScopedLock::new(&lock);
        {
            // Safety: `_outer` holds the lock
            let _unlocked = unsafe { ScopedUnlock::new(&lock) };
            assert_eq!(lock.counts(), (1, 1));

            // another thread can enter the critical section in the meantime
            thread::scope(|s| {
                s.spawn(|| {
                    let _guard = ScopedLock::new(&lock);
                });
            });
            assert_eq!(lock.counts(), (2, 2));
        }
        assert_eq!(lock.counts(), (3, 2));
        assert!(held_elsewhere(&lock.inner));
    }

    #[test]
    fn scoped_unlock_reacquires_on_early_return() {
        let lock = CountingLock::new();

        fn poll_unlocked(lock: &CountingLock, ready: bool) -> bool {
            // Safety: the caller holds the lock
            let _unlocked = unsafe { ScopedUnlock::new(lock) };
            if ready {
                return true;
            }
            thread::yield_now();
            false
        }

        let _outer = ScopedLock::new(&lock);
        assert!(poll_unlocked(&lock, true));
        assert_eq!(lock.counts(), (2, 1));
        assert!(!poll_unlocked(&lock, false));
        assert_eq!(lock.counts(), (3, 2));
        assert!(held_elsewhere(&lock.inner));
    }

    #[test]
    fn scoped_unlock_reacquires_on_unwind() {
        let lock = CountingLock::new();

        let _outer = ScopedLock::new(&lock);
        let res = panic::catch_unwind(AssertUnwindSafe(|| {
            // Safety: `_outer` holds the lock
            let _unlocked = unsafe { ScopedUnlock::new(&lock) };
            panic!("boom");
        }));
        assert!(res.is_err());

        // relocked exactly once
        assert_eq!(lock.counts(), (2, 1));
        assert!(held_elsewhere(&lock.inner));
    }

    #[test]
    fn works_with_lazy_mutex() {
        // Safety: statics never move
        static LOCK: LazyMutex = unsafe { LazyMutex::new() };

        let guard = ScopedLock::new(&LOCK);
        thread::scope(|s| {
            assert!(!s.spawn(|| LOCK.try_lock()).join().unwrap());
        });
        drop(guard);

        thread::scope(|s| {
            s.spawn(|| LOCK.with_lock(|| ())).join().unwrap();
        });
    }
}
