// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Thin layer over the native mutex, condition variable, thread and TLS primitives.
//!
//! Every call into the platform goes through one of two macros: [`check!`] for calls that must
//! succeed, and [`check_or!`] for calls with exactly one expected failure code (`EBUSY` for
//! try-lock, `ETIMEDOUT` for timed waits). Anything else is reported via
//! [`fatal!`](threading_abort::fatal).

/// Evaluates a platform call that must return `0`, terminating the process otherwise.
macro_rules! check {
    ($op:literal, $expr:expr) => {{
        let res: ::core::ffi::c_int = $expr;
        if res != 0 {
            ::threading_abort::fatal!("{} failed with error {}", $op, res);
        }
    }};
}

/// Evaluates a platform call, mapping `0` to `true` and `$false_err` to `false`. Any other
/// result terminates the process.
macro_rules! check_or {
    ($false_err:path, $op:literal, $expr:expr) => {{
        let res: ::core::ffi::c_int = $expr;
        match res {
            0 => true,
            $false_err => false,
            _ => ::threading_abort::fatal!("{} failed with error ({})", $op, res),
        }
    }};
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub(crate) use unix::*;
    } else {
        compile_error!("unsupported target platform");
    }
}
