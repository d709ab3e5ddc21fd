// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;

use crate::scoped::ScopedLock;
use crate::sys;

/// A lock that can be acquired and released without handing out a guard.
///
/// This is what [`ScopedLockT`](crate::ScopedLockT) operates on.
pub trait RawLock {
    /// Blocks the calling thread until exclusive ownership of the lock is obtained.
    fn lock(&self);

    /// Releases the calling thread's ownership of the lock.
    ///
    /// # Safety
    ///
    /// The calling thread must currently hold the lock.
    unsafe fn unlock(&self);
}

/// A non-recursive mutex backed by the platform's native mutex.
///
/// The mutex protects no data by itself, it marks critical sections. Use [`Mutex::with_lock`] or
/// a [`ScopedLock`] where possible, they guarantee the mutex is released on every exit path
/// including unwinding.
///
/// A *checked* mutex (see [`Mutex::new_checked`]) asks the platform to detect misuse such as a
/// thread locking the mutex twice or unlocking a mutex it doesn't hold. Detected misuse is
/// fatal. An unchecked mutex makes no such effort; relocking it from the owning thread
/// deadlocks.
///
/// Dropping a mutex that is still locked is fatal.
pub struct Mutex {
    handle: Box<sys::MutexHandle>,
    checked: bool,
}

impl Mutex {
    /// Creates a new, unlocked mutex without misuse checking.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handle: sys::MutexHandle::new_boxed(false),
            checked: false,
        }
    }

    /// Creates a new, unlocked mutex that terminates the process when misuse is detected.
    #[must_use]
    pub fn new_checked() -> Self {
        log::debug!("creating error-checking mutex");
        Self {
            handle: sys::MutexHandle::new_boxed(true),
            checked: true,
        }
    }

    /// Whether this mutex was created with [`Mutex::new_checked`].
    #[inline]
    pub fn is_checked(&self) -> bool {
        self.checked
    }

    /// Blocks the calling thread until exclusive ownership of the mutex can be obtained.
    ///
    /// Prior [`unlock`](Self::unlock) operations on the same mutex synchronize-with this lock
    /// operation. Locking a mutex the calling thread already owns is a deadlock for unchecked
    /// mutexes and fatal for checked ones.
    #[inline]
    pub fn lock(&self) {
        self.handle.lock();
    }

    /// Releases the calling thread's ownership of the mutex.
    ///
    /// This synchronizes-with subsequent successful lock operations on the same mutex.
    ///
    /// # Safety
    ///
    /// The calling thread must hold the mutex. (A checked mutex detects the violation and
    /// terminates the process, but callers must not rely on that.)
    #[inline]
    pub unsafe fn unlock(&self) {
        // Safety: ensured by caller
        unsafe { self.handle.unlock() }
    }

    /// Attempts to obtain exclusive ownership of the mutex without blocking.
    ///
    /// Returns `false` if ownership was not obtained. This may fail spuriously even if no other
    /// thread currently owns the mutex, so a `false` result is only a hint of contention. If it
    /// succeeds, prior unlock operations on the same mutex synchronize-with this operation.
    #[inline]
    #[must_use = "if the lock was acquired it must be released again"]
    pub fn try_lock(&self) -> bool {
        self.handle.try_lock()
    }

    /// Runs `critical_section` while holding the mutex and returns its result.
    ///
    /// The mutex is released when `critical_section` returns or unwinds. This can block while
    /// waiting for the mutex to become available.
    ///
    /// ```
    /// # use threading::Mutex;
    /// let mutex = Mutex::new();
    /// let answer = mutex.with_lock(|| 6 * 7);
    /// assert_eq!(answer, 42);
    /// ```
    #[inline]
    pub fn with_lock<R>(&self, critical_section: impl FnOnce() -> R) -> R {
        let _guard = ScopedLock::new(self);
        critical_section()
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("checked", &self.checked)
            .finish_non_exhaustive()
    }
}

impl RawLock for Mutex {
    #[inline]
    fn lock(&self) {
        Mutex::lock(self);
    }

    #[inline]
    unsafe fn unlock(&self) {
        // Safety: ensured by caller
        unsafe { Mutex::unlock(self) }
    }
}

/// A mutex that can be constructed in a `const` context.
///
/// The platform offers a static initializer for mutexes, so unlike [`Mutex`] no allocation or
/// initialization call is required. This makes `LazyMutex` the right choice for `static`s.
/// It never checks for misuse.
///
/// ```
/// # use threading::LazyMutex;
/// // Safety: statics never move
/// static LOCK: LazyMutex = unsafe { LazyMutex::new() };
///
/// LOCK.with_lock(|| {
///     // critical section
/// });
/// ```
pub struct LazyMutex {
    handle: sys::MutexHandle,
}

impl LazyMutex {
    /// Creates a new, unlocked mutex.
    ///
    /// # Safety
    ///
    /// The returned mutex must not be moved once it has been used. Placing it in a `static` is
    /// always fine.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self {
            handle: sys::MutexHandle::INIT,
        }
    }

    /// See [`Mutex::lock`].
    #[inline]
    pub fn lock(&self) {
        self.handle.lock();
    }

    /// See [`Mutex::unlock`].
    ///
    /// # Safety
    ///
    /// The calling thread must hold the mutex.
    #[inline]
    pub unsafe fn unlock(&self) {
        // Safety: ensured by caller
        unsafe { self.handle.unlock() }
    }

    /// See [`Mutex::try_lock`].
    #[inline]
    #[must_use = "if the lock was acquired it must be released again"]
    pub fn try_lock(&self) -> bool {
        self.handle.try_lock()
    }

    /// See [`Mutex::with_lock`].
    #[inline]
    pub fn with_lock<R>(&self, critical_section: impl FnOnce() -> R) -> R {
        let _guard = ScopedLock::new(self);
        critical_section()
    }

    /// Locks the mutex without reporting platform errors.
    ///
    /// Meant for code that runs while the process is already going down (e.g. while reporting
    /// a fatal error) and must not recurse into the fatal error path.
    #[inline]
    pub fn unsafe_lock(&self) {
        self.handle.unsafe_lock();
    }

    /// Unlocks the mutex without reporting platform errors. See [`LazyMutex::unsafe_lock`].
    ///
    /// # Safety
    ///
    /// The calling thread must hold the mutex.
    #[inline]
    pub unsafe fn unsafe_unlock(&self) {
        // Safety: ensured by caller
        unsafe { self.handle.unsafe_unlock() }
    }
}

impl fmt::Debug for LazyMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyMutex").finish_non_exhaustive()
    }
}

impl RawLock for LazyMutex {
    #[inline]
    fn lock(&self) {
        LazyMutex::lock(self);
    }

    #[inline]
    unsafe fn unlock(&self) {
        // Safety: ensured by caller
        unsafe { LazyMutex::unlock(self) }
    }
}
