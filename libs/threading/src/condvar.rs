// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;
use core::marker::PhantomData;
use std::time::{Duration, SystemTime};

use crate::sys;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// A condition variable paired with its own dedicated mutex.
///
/// The bound mutex is never shared with any other lock. All waiting and signaling goes through
/// the [`ConditionGuard`] returned by [`ConditionVariable::lock`], so it is impossible to wait or
/// signal without holding the bound mutex.
///
/// Waits are subject to spurious wakeups, callers must re-check their predicate in a loop (or
/// use [`ConditionGuard::wait_while`]).
///
/// ```
/// # use std::sync::atomic::{AtomicBool, Ordering};
/// # use std::thread;
/// # use threading::ConditionVariable;
/// let cond = ConditionVariable::new();
/// let ready = AtomicBool::new(false);
///
/// thread::scope(|s| {
///     s.spawn(|| {
///         let guard = cond.lock();
///         ready.store(true, Ordering::Relaxed);
///         guard.signal();
///     });
///
///     cond.with_lock(|guard| guard.wait_while(|| !ready.load(Ordering::Relaxed)));
/// });
/// ```
pub struct ConditionVariable {
    handle: Box<sys::CondHandle>,
}

/// Proof that the calling thread holds the mutex bound to a [`ConditionVariable`].
///
/// The mutex is released when the guard is dropped.
///
/// The guard stays on the thread that locked: it is neither `Send` nor `Sync`, so no other
/// thread can wait on (and thereby release) a mutex it does not hold.
///
/// ```compile_fail
/// # use threading::ConditionVariable;
/// let cond = ConditionVariable::new();
/// let guard = cond.lock();
/// std::thread::scope(|s| {
///     s.spawn(|| guard.wait());
/// });
/// ```
#[clippy::has_significant_drop]
#[must_use = "if unused the bound mutex will immediately unlock"]
pub struct ConditionGuard<'a> {
    handle: &'a sys::CondHandle,
    marker: PhantomData<*mut ()>,
}

impl ConditionVariable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handle: Box::new(sys::CondHandle::INIT),
        }
    }

    /// Acquires the bound mutex, blocking until it becomes available.
    #[inline]
    pub fn lock(&self) -> ConditionGuard<'_> {
        self.handle.lock();
        ConditionGuard {
            handle: &self.handle,
            marker: PhantomData,
        }
    }

    /// Runs `critical_section` while holding the bound mutex and returns its result.
    ///
    /// The mutex is released when `critical_section` returns or unwinds.
    #[inline]
    pub fn with_lock<R>(&self, critical_section: impl FnOnce(&ConditionGuard<'_>) -> R) -> R {
        let guard = self.lock();
        critical_section(&guard)
    }
}

impl Default for ConditionVariable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConditionVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionVariable").finish_non_exhaustive()
    }
}

impl ConditionGuard<'_> {
    /// Wakes at least one thread waiting on the condition, if there is any.
    #[inline]
    pub fn signal(&self) {
        self.handle.signal();
    }

    /// Wakes all threads waiting on the condition.
    #[inline]
    pub fn broadcast(&self) {
        self.handle.broadcast();
    }

    /// Blocks until the condition is signaled.
    ///
    /// The bound mutex is released atomically with starting to wait, and reacquired before this
    /// returns. May wake up spuriously.
    #[inline]
    pub fn wait(&self) {
        // Safety: the guard proves we hold the bound mutex
        unsafe { self.handle.wait() }
    }

    /// Blocks until the condition is signaled or `duration` has elapsed.
    ///
    /// Returns `false` if the wait timed out. The duration is rounded up to the resolution of the
    /// wall clock, the wait is never shorter than requested.
    pub fn wait_for(&self, duration: Duration) -> bool {
        let to_wait = ceil_to(duration, sys::CLOCK_RESOLUTION);

        match SystemTime::now().checked_add(to_wait) {
            Some(deadline) => self.wait_until(deadline),
            // A deadline that far out can never be reached.
            None => {
                self.wait();
                true
            }
        }
    }

    /// Blocks until the condition is signaled or the wall clock reaches `deadline`.
    ///
    /// Returns `true` if woken (which includes spurious wakeups) and `false` if the deadline
    /// passed.
    #[inline]
    pub fn wait_until(&self, deadline: SystemTime) -> bool {
        // Safety: the guard proves we hold the bound mutex
        unsafe { self.handle.wait_until(deadline) }
    }

    /// Blocks for as long as `condition` returns `true`, re-checking it after every wakeup.
    pub fn wait_while(&self, mut condition: impl FnMut() -> bool) {
        while condition() {
            self.wait();
        }
    }
}

impl Drop for ConditionGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        // Safety: the guard holds the bound mutex and is the only one to release it
        unsafe { self.handle.unlock() }
    }
}

impl fmt::Debug for ConditionGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionGuard").finish_non_exhaustive()
    }
}

/// Rounds `duration` up to the next multiple of `resolution`, saturating at [`Duration::MAX`].
fn ceil_to(duration: Duration, resolution: Duration) -> Duration {
    let resolution = resolution.as_nanos();
    debug_assert!(resolution > 0);

    let rounded = duration.as_nanos().div_ceil(resolution) * resolution;
    let subsec = u32::try_from(rounded % NANOS_PER_SEC).unwrap_or(0);

    u64::try_from(rounded / NANOS_PER_SEC)
        .map_or(Duration::MAX, |secs| Duration::new(secs, subsec))
}
