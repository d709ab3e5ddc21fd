// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Synchronization primitives on top of the platform's native threading API.
//!
//! - [`Mutex`] and [`LazyMutex`]: non-recursive mutexes, optionally checking for misuse.
//! - [`ScopedLock`] and [`ScopedUnlock`]: guards that lock (or temporarily unlock) a mutex for the
//!   duration of a scope.
//! - [`ConditionVariable`]: a condition variable paired with its own dedicated mutex, supporting
//!   untimed, relative and absolute-deadline waits.
//! - [`Once`]: run-exactly-once initialization that works from a zero-initialized `static`.
//! - [`ThreadLocal`]: a lazily allocated, process-wide thread-local storage key carrying one
//!   pointer-sized value per thread.
//!
//! # Errors
//!
//! There are exactly two expected "failures": [`Mutex::try_lock`] returning `false` when the
//! mutex is contended and timed waits returning `false` when the deadline passed. Any other
//! error reported by the platform means a precondition was violated (destroying a locked mutex,
//! unlocking a mutex the calling thread doesn't hold, resource exhaustion...) and is reported
//! through [`threading_abort::fatal!`], terminating the process.

mod condvar;
mod loom;
mod mutex;
mod once;
mod scoped;
mod sys;
pub mod thread;
#[cfg(not(loom))]
mod thread_local;

pub use condvar::{ConditionGuard, ConditionVariable};
pub use mutex::{LazyMutex, Mutex, RawLock};
pub use once::Once;
pub use scoped::{ScopedLock, ScopedLockT, ScopedUnlock};
#[cfg(not(loom))]
pub use thread_local::{ThreadLocal, ThreadLocalKey, TlsWord, tls_get, tls_set};

/// Marker type which indicates that the Guard type for a lock is not `Send`.
///
/// Native mutexes must be released by the thread that acquired them.
#[expect(dead_code, reason = "inner pointer is unused")]
pub(crate) struct GuardNoSend(*mut ());
// Safety: the marker carries no data, it only opts guards out of `Send`
unsafe impl Sync for GuardNoSend {}
