// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::{fmt, mem};

use crate::loom::loom_const_fn;
use crate::loom::sync::atomic::{AtomicU8, Ordering};

/// No thread has started running the action yet.
const STATUS_INCOMPLETE: u8 = 0;
/// Some thread is currently running the action, all other threads need to wait for it to finish.
const STATUS_RUNNING: u8 = 1;
/// The action has completed and all future calls finish immediately.
const STATUS_COMPLETE: u8 = 2;

/// A synchronization primitive for running one-time global initialization.
///
/// `Once` is zero-initialized and needs no constructor to run, so it can be used from any
/// `static` regardless of initialization order. The state only ever moves forward:
/// *incomplete* → *running* → *complete*.
///
/// Threads that lose the race to run the action block (they don't spin) until the winner is
/// done. Completion is published with release ordering, so every caller that returns from
/// [`Once::call_once`] observes all effects of the action.
///
/// A panic escaping the action is fatal: there is no way back to *incomplete*, and waiting
/// threads would otherwise block forever.
///
/// ```
/// # use threading::Once;
/// static INIT: Once = Once::new();
///
/// INIT.call_once(|| {
///     // expensive global setup
/// });
/// assert!(INIT.is_completed());
/// ```
pub struct Once {
    status: AtomicU8,
}

impl Once {
    loom_const_fn! {
        #[inline]
        #[must_use]
        pub const fn new() -> Once {
            Once {
                status: AtomicU8::new(STATUS_INCOMPLETE),
            }
        }
    }

    /// Whether the action of some [`Once::call_once`] call has completed.
    ///
    /// A `true` result synchronizes-with the completion of the action.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.status.load(Ordering::Acquire) == STATUS_COMPLETE
    }

    /// Runs `f` if no action has been run on this `Once` yet.
    ///
    /// If another thread is currently running its action, this blocks until that action has
    /// completed. Either way, when this returns the action has run exactly once.
    #[inline]
    pub fn call_once<F>(&self, f: F)
    where
        F: FnOnce(),
    {
        // Fast path check
        if self.is_completed() {
            return;
        }

        let mut f = Some(f);
        self.call(&mut || {
            if let Some(f) = f.take() {
                f();
            }
        });
    }

    /// Like [`Once::call_once`], but hands `context` to the action.
    ///
    /// `context` is dropped without being used if the action had already run.
    #[inline]
    pub fn call_once_with<C, F>(&self, context: C, f: F)
    where
        F: FnOnce(C),
    {
        self.call_once(|| f(context));
    }

    /// Blocks the calling thread until an action has completed on this `Once`.
    ///
    /// This does not run anything itself, if no thread ever calls [`Once::call_once`] this blocks
    /// forever.
    pub fn wait(&self) {
        if !self.is_completed() {
            self.wait_for_completion();
        }
    }

    #[cold]
    fn call(&self, f: &mut dyn FnMut()) {
        let xchg = self.status.compare_exchange(
            STATUS_INCOMPLETE,
            STATUS_RUNNING,
            Ordering::Acquire,
            Ordering::Acquire,
        );

        match xchg {
            Ok(_) => {
                let unwind_guard = AbortOnUnwind;
                f();
                mem::forget(unwind_guard);

                self.status.store(STATUS_COMPLETE, Ordering::Release);
                wake_waiters();

                log::trace!("once action completed");
            }
            Err(STATUS_COMPLETE) => {}
            Err(STATUS_RUNNING) => self.wait_for_completion(),
            Err(_) => unreachable!("state is never set to invalid values"),
        }
    }
}

impl Default for Once {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Once {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Once")
            .field("completed", &self.is_completed())
            .finish()
    }
}

struct AbortOnUnwind;

impl Drop for AbortOnUnwind {
    fn drop(&mut self) {
        threading_abort::fatal!("Once action panicked, initialization can never complete");
    }
}

cfg_if::cfg_if! {
    if #[cfg(loom)] {
        impl Once {
            fn wait_for_completion(&self) {
                while self.status.load(Ordering::Acquire) != STATUS_COMPLETE {
                    crate::loom::thread::yield_now();
                }
            }
        }

        fn wake_waiters() {}
    } else {
        use crate::sys;

        /// Process-wide parking spot for threads waiting on any `Once` to complete.
        static PARKING: sys::CondHandle = sys::CondHandle::INIT;

        impl Once {
            fn wait_for_completion(&self) {
                PARKING.lock();
                // Completion is published before the winner takes the parking lock to
                // broadcast, so checking under the lock can't miss the wakeup.
                while self.status.load(Ordering::Acquire) != STATUS_COMPLETE {
                    // Safety: we hold the parking mutex
                    unsafe { PARKING.wait() };
                }
                // Safety: we hold the parking mutex
                unsafe { PARKING.unlock() };
            }
        }

        fn wake_waiters() {
            PARKING.lock();
            PARKING.broadcast();
            // Safety: we hold the parking mutex
            unsafe { PARKING.unlock() };
        }
    }
}
