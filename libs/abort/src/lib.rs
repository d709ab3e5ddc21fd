// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Fatal diagnostics for conditions that must never happen.
//!
//! The synchronization primitives in this workspace treat any unexpected result from the
//! platform as a violated precondition. There is no way to recover from those, so instead of
//! returning an error the failing call reports what happened and takes the process down with
//! [`fatal!`].

use std::fmt;
use std::io::{self, Write};

/// Reports a diagnostic and terminates the process. See [`fatal()`].
///
/// # Example
///
/// ```no_run
/// # use threading_abort::fatal;
/// let res = 22;
/// fatal!("pthread_mutex_lock failed with error {res}");
/// ```
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::fatal(::core::format_args!($($arg)*))
    };
}

/// Reports `args` as a fatal diagnostic and terminates the process.
///
/// The message is emitted through the `log` facade at error level (so it shows up in whatever
/// logger the host application installed) and written straight to stderr, since no logger may
/// be installed at all. Then the process is terminated through [`abort`].
#[cold]
#[inline(never)]
pub fn fatal(args: fmt::Arguments<'_>) -> ! {
    log::error!("{args}");

    // We are about to abort, a failing write to stderr is not worth reporting.
    let _ = write_diagnostic(&mut io::stderr().lock(), args);

    abort()
}

fn write_diagnostic(out: &mut impl Write, args: fmt::Arguments<'_>) -> io::Result<()> {
    out.write_fmt(format_args!("fatal error: {args}\n"))?;
    out.flush()
}

/// Terminates the current execution in an abnormal fashion. This function will never return.
///
/// On hosted targets this takes the form of `std::process::abort`, which raises `SIGABRT` on
/// unix so the termination is visible to the parent process and to debuggers.
///
/// # Breakpoint support
///
/// This function is exported under the unmangled symbol `threading_abort` (plain `abort` would
/// collide with libc) so you can safely put a breakpoint on it as a means to catch the process
/// just before it exits abnormally.
#[unsafe(export_name = "threading_abort")]
#[inline(never)]
pub fn abort() -> ! {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            std::process::abort();
        } else {
            compile_error!("unsupported target platform")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_names_operation_and_code() {
        let mut out = Vec::new();
        let code = 35;
        write_diagnostic(
            &mut out,
            format_args!("pthread_mutex_lock failed with error {code}"),
        )
        .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "fatal error: pthread_mutex_lock failed with error 35\n"
        );
    }
}
