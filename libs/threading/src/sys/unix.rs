// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::cell::UnsafeCell;
use core::ffi::{c_long, c_void};
use core::mem::{self, MaybeUninit};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Resolution of the wall clock that timed waits are measured against.
pub(crate) const CLOCK_RESOLUTION: Duration = Duration::from_nanos(1);

const NANOS_PER_SEC_MINUS_ONE: c_long = 999_999_999;

// === threads ===

pub(crate) type ThreadHandle = libc::pthread_t;

pub(crate) fn thread_current() -> ThreadHandle {
    // Safety: `pthread_self` has no preconditions.
    unsafe { libc::pthread_self() }
}

pub(crate) fn threads_same(a: ThreadHandle, b: ThreadHandle) -> bool {
    // Safety: `pthread_equal` only compares the two handles.
    unsafe { libc::pthread_equal(a, b) != 0 }
}

pub(crate) fn thread_is_main() -> bool {
    cfg_if::cfg_if! {
        if #[cfg(any(target_os = "linux", target_os = "android"))] {
            // The main thread is the one whose kernel thread id equals the process id.
            // Safety: neither syscall has preconditions.
            unsafe { libc::syscall(libc::SYS_gettid) == c_long::from(libc::getpid()) }
        } else if #[cfg(target_vendor = "apple")] {
            // Safety: `pthread_main_np` has no preconditions.
            unsafe { libc::pthread_main_np() == 1 }
        } else {
            compile_error!("main thread detection is not implemented for this platform")
        }
    }
}

// === mutexes ===

/// A native mutex.
///
/// The handle must not move once it has been used, owners either box it or keep it in a
/// `static`. Dropping the handle destroys it, which is fatal if it is still locked.
#[repr(transparent)]
pub(crate) struct MutexHandle(UnsafeCell<libc::pthread_mutex_t>);

// Safety: pthread mutexes are designed to be shared and operated on from any thread.
unsafe impl Send for MutexHandle {}
// Safety: see above
unsafe impl Sync for MutexHandle {}

impl MutexHandle {
    /// A statically initialized, unchecked mutex.
    #[allow(
        clippy::declare_interior_mutable_const,
        reason = "used to initialize fresh handles by value"
    )]
    pub(crate) const INIT: Self = Self(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));

    /// Allocates a new mutex, with error checking enabled if `checked` is true.
    pub(crate) fn new_boxed(checked: bool) -> Box<Self> {
        let this = Box::new(Self::INIT);

        if checked {
            let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();

            // Safety: `attr` is initialized by `pthread_mutexattr_init` before any other use and
            // destroyed before it goes out of scope. The mutex itself has not been used yet, so
            // reinitializing it is fine.
            unsafe {
                check!(
                    "pthread_mutexattr_init",
                    libc::pthread_mutexattr_init(attr.as_mut_ptr())
                );
                check!(
                    "pthread_mutexattr_settype",
                    libc::pthread_mutexattr_settype(
                        attr.as_mut_ptr(),
                        libc::PTHREAD_MUTEX_ERRORCHECK
                    )
                );
                check!(
                    "pthread_mutex_init",
                    libc::pthread_mutex_init(this.raw(), attr.as_ptr())
                );
                check!(
                    "pthread_mutexattr_destroy",
                    libc::pthread_mutexattr_destroy(attr.as_mut_ptr())
                );
            }
        }

        this
    }

    #[inline]
    fn raw(&self) -> *mut libc::pthread_mutex_t {
        self.0.get()
    }

    #[inline]
    pub(crate) fn lock(&self) {
        // Safety: the handle is initialized and pinned in place (see type docs)
        check!("pthread_mutex_lock", unsafe {
            libc::pthread_mutex_lock(self.raw())
        });
    }

    /// # Safety
    ///
    /// For an unchecked mutex the calling thread must hold the lock. Checked mutexes report the
    /// violation instead.
    #[inline]
    pub(crate) unsafe fn unlock(&self) {
        // Safety: ensured by caller
        check!("pthread_mutex_unlock", unsafe {
            libc::pthread_mutex_unlock(self.raw())
        });
    }

    #[inline]
    pub(crate) fn try_lock(&self) -> bool {
        // Safety: the handle is initialized and pinned in place (see type docs)
        check_or!(libc::EBUSY, "pthread_mutex_trylock", unsafe {
            libc::pthread_mutex_trylock(self.raw())
        })
    }

    /// Locks the mutex, ignoring any error the platform reports.
    #[inline]
    pub(crate) fn unsafe_lock(&self) {
        // Safety: the handle is initialized and pinned in place (see type docs)
        let _ = unsafe { libc::pthread_mutex_lock(self.raw()) };
    }

    /// Unlocks the mutex, ignoring any error the platform reports.
    ///
    /// # Safety
    ///
    /// The calling thread must hold the lock.
    #[inline]
    pub(crate) unsafe fn unsafe_unlock(&self) {
        // Safety: ensured by caller
        let _ = unsafe { libc::pthread_mutex_unlock(self.raw()) };
    }
}

impl Drop for MutexHandle {
    fn drop(&mut self) {
        // Safety: we have exclusive access, nobody can use the handle after this
        check!("pthread_mutex_destroy", unsafe {
            libc::pthread_mutex_destroy(self.raw())
        });
    }
}

// === condition variables ===

/// A native condition variable together with the mutex it is bound to.
///
/// Same placement rules as [`MutexHandle`].
pub(crate) struct CondHandle {
    condition: UnsafeCell<libc::pthread_cond_t>,
    mutex: MutexHandle,
}

// Safety: pthread condition variables are designed to be shared between threads.
unsafe impl Send for CondHandle {}
// Safety: see above
unsafe impl Sync for CondHandle {}

impl CondHandle {
    #[allow(
        clippy::declare_interior_mutable_const,
        reason = "used to initialize fresh handles by value"
    )]
    pub(crate) const INIT: Self = Self {
        condition: UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER),
        mutex: MutexHandle::INIT,
    };

    #[inline]
    pub(crate) fn lock(&self) {
        self.mutex.lock();
    }

    /// # Safety
    ///
    /// The calling thread must hold the bound mutex.
    #[inline]
    pub(crate) unsafe fn unlock(&self) {
        // Safety: ensured by caller
        unsafe { self.mutex.unlock() }
    }

    #[inline]
    pub(crate) fn signal(&self) {
        // Safety: the handle is initialized and pinned in place
        check!("pthread_cond_signal", unsafe {
            libc::pthread_cond_signal(self.condition.get())
        });
    }

    #[inline]
    pub(crate) fn broadcast(&self) {
        // Safety: the handle is initialized and pinned in place
        check!("pthread_cond_broadcast", unsafe {
            libc::pthread_cond_broadcast(self.condition.get())
        });
    }

    /// # Safety
    ///
    /// The calling thread must hold the bound mutex.
    #[inline]
    pub(crate) unsafe fn wait(&self) {
        // Safety: ensured by caller
        check!("pthread_cond_wait", unsafe {
            libc::pthread_cond_wait(self.condition.get(), self.mutex.raw())
        });
    }

    /// Returns `false` if `deadline` passed before the condition was signaled.
    ///
    /// # Safety
    ///
    /// The calling thread must hold the bound mutex.
    #[inline]
    pub(crate) unsafe fn wait_until(&self, deadline: SystemTime) -> bool {
        let ts = deadline_to_timespec(deadline);

        // Safety: ensured by caller
        check_or!(libc::ETIMEDOUT, "pthread_cond_timedwait", unsafe {
            libc::pthread_cond_timedwait(self.condition.get(), self.mutex.raw(), &raw const ts)
        })
    }
}

impl Drop for CondHandle {
    fn drop(&mut self) {
        // Safety: we have exclusive access, nobody can use the handle after this.
        // The bound mutex is destroyed right after by its own drop.
        check!("pthread_cond_destroy", unsafe {
            libc::pthread_cond_destroy(self.condition.get())
        });
    }
}

/// Converts a wall-clock deadline into the absolute `timespec` that `pthread_cond_timedwait`
/// expects.
///
/// Deadlines before the epoch clamp to the epoch (they have passed already), deadlines that don't
/// fit into `time_t` clamp to the largest representable time.
pub(crate) fn deadline_to_timespec(deadline: SystemTime) -> libc::timespec {
    let since_epoch = deadline
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);

    let (tv_sec, tv_nsec) = match libc::time_t::try_from(since_epoch.as_secs()) {
        Ok(secs) => (
            secs,
            c_long::try_from(since_epoch.subsec_nanos()).unwrap_or(NANOS_PER_SEC_MINUS_ONE),
        ),
        Err(_) => (libc::time_t::MAX, NANOS_PER_SEC_MINUS_ONE),
    };

    // Safety: `timespec` is plain old data (some targets carry padding fields), all-zero is valid
    let mut ts: libc::timespec = unsafe { mem::zeroed() };
    ts.tv_sec = tv_sec;
    ts.tv_nsec = tv_nsec;
    ts
}

// === thread-local storage ===

pub(crate) type TlsKey = libc::pthread_key_t;
pub(crate) type TlsDtor = unsafe extern "C" fn(*mut c_void);

/// Allocates a new TLS key. Running out of keys is fatal.
pub(crate) fn tls_alloc(dtor: Option<TlsDtor>) -> TlsKey {
    let mut key = MaybeUninit::<TlsKey>::uninit();

    // Safety: `key` is a valid out pointer
    check!("pthread_key_create", unsafe {
        libc::pthread_key_create(key.as_mut_ptr(), dtor)
    });

    // Safety: `pthread_key_create` succeeded, so it wrote the key
    unsafe { key.assume_init() }
}

/// # Safety
///
/// `key` must have been returned by [`tls_alloc`].
#[inline]
pub(crate) unsafe fn tls_get(key: TlsKey) -> *mut c_void {
    // Safety: ensured by caller
    unsafe { libc::pthread_getspecific(key) }
}

/// # Safety
///
/// `key` must have been returned by [`tls_alloc`].
#[inline]
pub(crate) unsafe fn tls_set(key: TlsKey, value: *mut c_void) {
    // Safety: ensured by caller
    check!("pthread_setspecific", unsafe {
        libc::pthread_setspecific(key, value.cast_const())
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timespec_of_regular_deadline() {
        let deadline = UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789);
        let ts = deadline_to_timespec(deadline);
        assert_eq!(ts.tv_sec, 1_700_000_000);
        assert_eq!(ts.tv_nsec, 123_456_789);
    }

    #[test]
    fn timespec_before_epoch_clamps_to_zero() {
        let deadline = UNIX_EPOCH - Duration::from_secs(10);
        let ts = deadline_to_timespec(deadline);
        assert_eq!(ts.tv_sec, 0);
        assert_eq!(ts.tv_nsec, 0);
    }

    #[test]
    fn try_lock_reports_busy() {
        let handle = MutexHandle::new_boxed(false);
        assert!(handle.try_lock());
        // A second attempt from the same thread sees the mutex as busy, unchecked mutexes don't
        // detect self-deadlock on try-lock.
        assert!(!handle.try_lock());
        // Safety: we hold the lock
        unsafe { handle.unlock() };
    }

    #[test]
    fn tls_keys_are_distinct() {
        let a = tls_alloc(None);
        let b = tls_alloc(None);
        assert_ne!(a, b);
    }
}
