//! Compiler process launching.
//!
//! One contract, two implementations chosen at build time: fork/execv/waitpid
//! on POSIX ([`crate::execute_unix`]) and CreateProcess plus job objects on
//! Windows ([`crate::execute_windows`]).

use crate::cmdline::format_argv_for_logging;
use crate::config::ExecConfig;
use crate::context::ExecContext;
use compcache_common::{ExecError, ExecResult, ExitOutcome};
use std::ffi::OsString;
use std::fs::File;
use tracing::{debug, error};

/// Where the child's stdout and stderr go.
///
/// Files passed here belong to the launcher from then on: they are handed to
/// the child and the launcher's copies are closed as soon as the child owns
/// them.
#[derive(Debug)]
pub enum Redirect {
    /// Share the current process's stdout and stderr.
    Inherit,

    /// Write into these files.
    Files { stdout: File, stderr: File },
}

impl Redirect {
    pub fn files(stdout: File, stderr: File) -> Self {
        Self::Files { stdout, stderr }
    }
}

/// Runs `argv[0]` with `argv` and blocks until it exits.
///
/// `argv[0]` must already be a resolved path (see
/// [`crate::find::find_executable`]); no search is performed.
///
/// # Examples
///
/// ```rust,no_run
/// use compcache_exec::{execute, ExecConfig, ExecContext, Redirect};
/// use std::ffi::OsString;
/// use std::fs::File;
///
/// let ctx = ExecContext::new(ExecConfig::from_env());
/// let argv: Vec<OsString> = ["/usr/bin/cc", "-c", "foo.c", "-o", "foo.o"]
///     .iter()
///     .map(OsString::from)
///     .collect();
/// let redirect = Redirect::files(File::create("cc.out")?, File::create("cc.err")?);
///
/// let outcome = execute(&ctx, &argv, redirect)?;
/// println!("compiler finished: {}", outcome);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn execute(ctx: &ExecContext, argv: &[OsString], redirect: Redirect) -> ExecResult<ExitOutcome> {
    if argv.is_empty() {
        return Err(ExecError::invalid_argument("empty argument vector"));
    }

    debug!("Executing {}", format_argv_for_logging(argv));

    #[cfg(unix)]
    {
        crate::execute_unix::execute(ctx, argv, redirect)
    }

    #[cfg(windows)]
    {
        crate::execute_windows::execute(ctx, argv, redirect)
    }
}

/// Hands the current process over to `argv[0]`.
///
/// On POSIX the process image is replaced; on Windows the child runs to
/// completion and this process exits with its code. Never returns, not even
/// when the launch fails.
pub fn execute_noreturn(config: &ExecConfig, argv: &[OsString]) -> ! {
    if argv.is_empty() {
        error!("Cannot execute an empty argument vector");
        std::process::exit(EXEC_FAILURE_STATUS);
    }

    debug!("Executing {}", format_argv_for_logging(argv));

    #[cfg(unix)]
    {
        let _ = config;
        crate::execute_unix::execute_noreturn(argv)
    }

    #[cfg(windows)]
    {
        crate::execute_windows::execute_noreturn(config, argv)
    }
}

/// Status a process terminates with when the target could not be started.
///
/// This is the `-1` returned by a failed `execv`, seen by a parent as 255.
pub const EXEC_FAILURE_STATUS: i32 = -1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_argv_is_rejected() {
        let ctx = ExecContext::default();
        let err = execute(&ctx, &[], Redirect::Inherit).unwrap_err();
        assert!(matches!(err, ExecError::InvalidArgument { .. }));
        assert!(err.is_fatal());
    }
}
