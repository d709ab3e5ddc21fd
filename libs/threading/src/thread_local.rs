// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::cell::UnsafeCell;
use core::ffi::c_void;
use core::fmt;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr::{self, NonNull};

use crate::Once;
use crate::sys;

/// A process-wide thread-local storage key, allocated on first use.
///
/// The key is allocated exactly once, by whichever thread gets to it first, and never freed.
/// Like [`Once`], a `ThreadLocalKey` needs no constructor to run and can live in a `static`.
pub struct ThreadLocalKey {
    once: Once,
    key: UnsafeCell<MaybeUninit<sys::TlsKey>>,
}

// Safety: `key` is written exactly once, by the thread running the `Once` action, and only read
// after the `Once` completed, which synchronizes-with that write.
unsafe impl Sync for ThreadLocalKey {}

impl ThreadLocalKey {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            once: Once::new(),
            key: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Returns the calling thread's raw value under this key, null if it never stored one.
    #[inline]
    pub fn get_word(&self) -> *mut c_void {
        // Safety: the key was allocated by `ThreadLocalKey::key`
        unsafe { sys::tls_get(self.key()) }
    }

    /// Stores a raw value in the calling thread's cell under this key.
    #[inline]
    pub fn set_word(&self, word: *mut c_void) {
        // Safety: the key was allocated by `ThreadLocalKey::key`
        unsafe { sys::tls_set(self.key(), word) }
    }

    fn key(&self) -> sys::TlsKey {
        self.once.call_once_with(&self.key, |key| {
            let allocated = sys::tls_alloc(None);
            // Safety: we are the only thread running the `Once` action, nobody reads the key
            // before it completes
            unsafe { (*key.get()).write(allocated) };

            log::trace!("allocated thread-local storage key");
        });

        // Safety: the `Once` completed, so the key is initialized and never written again
        unsafe { (*self.key.get()).assume_init() }
    }
}

impl Default for ThreadLocalKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ThreadLocalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadLocalKey")
            .field("allocated", &self.once.is_completed())
            .finish_non_exhaustive()
    }
}

/// Values that fit into a thread-local storage cell.
///
/// `from_word(into_word(v))` must give back `v`, and `from_word(null)` is the value a thread
/// observes before it stored anything.
pub trait TlsWord: Copy {
    fn into_word(self) -> *mut c_void;
    fn from_word(word: *mut c_void) -> Self;
}

impl TlsWord for usize {
    #[inline]
    fn into_word(self) -> *mut c_void {
        ptr::without_provenance_mut(self)
    }

    #[inline]
    fn from_word(word: *mut c_void) -> Self {
        word.addr()
    }
}

impl TlsWord for isize {
    #[inline]
    fn into_word(self) -> *mut c_void {
        usize::from_ne_bytes(self.to_ne_bytes()).into_word()
    }

    #[inline]
    fn from_word(word: *mut c_void) -> Self {
        isize::from_ne_bytes(usize::from_word(word).to_ne_bytes())
    }
}

impl<T> TlsWord for *mut T {
    #[inline]
    fn into_word(self) -> *mut c_void {
        self.cast()
    }

    #[inline]
    fn from_word(word: *mut c_void) -> Self {
        word.cast()
    }
}

impl<T> TlsWord for *const T {
    #[inline]
    fn into_word(self) -> *mut c_void {
        self.cast_mut().cast()
    }

    #[inline]
    fn from_word(word: *mut c_void) -> Self {
        word.cast_const().cast()
    }
}

impl<T> TlsWord for Option<NonNull<T>> {
    #[inline]
    fn into_word(self) -> *mut c_void {
        self.map_or(ptr::null_mut(), |ptr| ptr.as_ptr().cast())
    }

    #[inline]
    fn from_word(word: *mut c_void) -> Self {
        NonNull::new(word.cast())
    }
}

/// One pointer-sized value per thread, stored under a lazily allocated [`ThreadLocalKey`].
///
/// Every thread starts out observing the "null" value of `T` (zero, a null pointer, `None`).
/// No destructor is registered: the slot is a raw carrier and never owns or frees what it holds.
///
/// ```
/// # use threading::ThreadLocal;
/// static DEPTH: ThreadLocal<usize> = ThreadLocal::new();
///
/// assert_eq!(DEPTH.get(), 0);
/// DEPTH.set(3);
/// assert_eq!(DEPTH.get(), 3);
///
/// std::thread::spawn(|| assert_eq!(DEPTH.get(), 0)).join().unwrap();
/// ```
pub struct ThreadLocal<T> {
    key: ThreadLocalKey,
    marker: PhantomData<fn() -> T>,
}

impl<T: TlsWord> ThreadLocal<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            key: ThreadLocalKey::new(),
            marker: PhantomData,
        }
    }

    /// Returns the calling thread's value.
    #[inline]
    pub fn get(&self) -> T {
        T::from_word(self.key.get_word())
    }

    /// Replaces the calling thread's value.
    #[inline]
    pub fn set(&self, value: T) {
        self.key.set_word(value.into_word());
    }
}

impl<T: TlsWord> Default for ThreadLocal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ThreadLocal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadLocal")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

static SLOT: ThreadLocal<*mut c_void> = ThreadLocal::new();

/// Returns the calling thread's value of the process-wide thread-local slot.
///
/// Null if the calling thread never called [`tls_set`].
#[inline]
pub fn tls_get() -> *mut c_void {
    SLOT.get()
}

/// Stores `value` in the calling thread's cell of the process-wide thread-local slot.
///
/// Ownership of whatever `value` points to stays with the caller.
#[inline]
pub fn tls_set(value: *mut c_void) {
    SLOT.set(value);
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use super::*;

    #[test]
    fn not_shared_between_threads() {
        static VALUE: ThreadLocal<usize> = ThreadLocal::new();

        VALUE.set(1);
        thread::spawn(|| {
            assert_eq!(VALUE.get(), 0);
            VALUE.set(2);
            assert_eq!(VALUE.get(), 2);
        })
        .join()
        .unwrap();
        assert_eq!(VALUE.get(), 1);
    }

    #[test]
    fn latest_set_wins() {
        static VALUE: ThreadLocal<isize> = ThreadLocal::new();

        thread::spawn(|| {
            VALUE.set(-5);
            VALUE.set(17);
            assert_eq!(VALUE.get(), 17);
            VALUE.set(-1);
            assert_eq!(VALUE.get(), -1);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn key_allocated_once() {
        const THREADS: usize = 16;
        static KEY: ThreadLocalKey = ThreadLocalKey::new();

        let barrier = Barrier::new(THREADS);
        let keys: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        KEY.key()
                    })
                })
                .collect();

            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(keys.iter().all(|k| *k == keys[0]));
        assert_eq!(KEY.key(), keys[0]);
    }

    #[test]
    fn pointer_payloads() {
        static PTR: ThreadLocal<Option<NonNull<u64>>> = ThreadLocal::new();

        let mut payload = 42_u64;
        thread::scope(|s| {
            s.spawn(|| {
                assert_eq!(PTR.get(), None);
                PTR.set(Some(NonNull::from(&mut payload)));

                let ptr = PTR.get().unwrap();
                // Safety: `payload` outlives the scope and nothing else accesses it meanwhile
                unsafe { *ptr.as_ptr() += 1 };

                PTR.set(None);
                assert_eq!(PTR.get(), None);
            });
        });
        assert_eq!(payload, 43);
    }

    #[test]
    fn process_wide_slot() {
        let mut a = 1_u8;
        let mut b = 2_u8;
        let a_addr = ptr::from_mut(&mut a).addr();
        let b_addr = ptr::from_mut(&mut b).addr();

        let barrier = Barrier::new(2);
        thread::scope(|s| {
            for addr in [a_addr, b_addr] {
                let barrier = &barrier;
                s.spawn(move || {
                    assert!(tls_get().is_null());
                    tls_set(ptr::without_provenance_mut(addr));
                    // both threads have set their value before either reads it back
                    barrier.wait();
                    assert_eq!(tls_get().addr(), addr);
                });
            }
        });
    }

    #[test]
    fn raw_words_through_key() {
        static KEY: ThreadLocalKey = ThreadLocalKey::new();

        assert!(KEY.get_word().is_null());
        KEY.set_word(ptr::without_provenance_mut(0xdead));
        thread::spawn(|| {
            assert!(KEY.get_word().is_null());
            KEY.set_word(ptr::without_provenance_mut(0xbeef));
            assert_eq!(KEY.get_word().addr(), 0xbeef);
        })
        .join()
        .unwrap();
        assert_eq!(KEY.get_word().addr(), 0xdead);
    }
}
