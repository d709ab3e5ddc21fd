// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Identity of native threads.

use core::fmt;

use crate::sys;

/// An opaque identifier for a native thread.
///
/// Identifiers can only be compared for equality, the underlying value is *not* a sequential
/// number, nor human-readable, nor guaranteed unique after the thread exited.
#[derive(Clone, Copy)]
pub struct ThreadId(sys::ThreadHandle);

// Safety: the handle is only ever used as an identifier and compared, never dereferenced
unsafe impl Send for ThreadId {}
// Safety: see above
unsafe impl Sync for ThreadId {}

impl ThreadId {
    /// Returns the identifier of the calling thread.
    #[inline]
    #[must_use]
    pub fn current() -> Self {
        Self(sys::thread_current())
    }
}

impl PartialEq for ThreadId {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        sys::threads_same(self.0, other.0)
    }
}

impl Eq for ThreadId {}

impl fmt::Debug for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadId").finish_non_exhaustive()
    }
}

/// Whether the calling thread is the process's main thread.
#[inline]
#[must_use]
pub fn is_main() -> bool {
    sys::thread_is_main()
}
