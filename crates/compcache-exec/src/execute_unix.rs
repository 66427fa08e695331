//! POSIX launcher: fork, redirect, execv, waitpid.

use crate::context::ExecContext;
use crate::execute::{Redirect, EXEC_FAILURE_STATUS};
use crate::signal::SignalBlocker;
use compcache_common::{ExecError, ExecResult, ExitOutcome};
use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{pthread_sigmask, SigmaskHow};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::ffi::{CString, OsString};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use tracing::error;

/// `argv` as NUL-terminated strings plus the pointer array `execv` wants.
///
/// Built before forking so the child does not allocate.
struct PreparedArgv {
    args: Vec<CString>,
    ptrs: Vec<*const libc::c_char>,
}

impl PreparedArgv {
    fn new(argv: &[OsString]) -> ExecResult<Self> {
        let args = argv
            .iter()
            .map(|arg| {
                CString::new(arg.as_bytes()).map_err(|_| {
                    ExecError::invalid_argument(format!(
                        "argument contains a NUL byte: {}",
                        arg.to_string_lossy()
                    ))
                })
            })
            .collect::<ExecResult<Vec<_>>>()?;

        let ptrs = args
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(std::iter::once(std::ptr::null()))
            .collect();

        Ok(Self { args, ptrs })
    }

    fn path(&self) -> &CString {
        &self.args[0]
    }
}

pub(crate) fn execute(
    ctx: &ExecContext,
    argv: &[OsString],
    redirect: Redirect,
) -> ExecResult<ExitOutcome> {
    let prepared = PreparedArgv::new(argv)?;
    let fds = match &redirect {
        Redirect::Inherit => None,
        Redirect::Files { stdout, stderr } => Some((stdout.as_raw_fd(), stderr.as_raw_fd())),
    };

    let blocker = SignalBlocker::new();

    // SAFETY: the child only calls async-signal-safe functions before execv or _exit.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => unsafe { exec_child(&prepared, fds, &blocker) },
        Ok(ForkResult::Parent { child }) => {
            ctx.set_compiler_pid(child.as_raw());
            drop(blocker);

            // The child holds the sinks now.
            drop(redirect);

            let outcome = wait_for_child(child);

            {
                let _blocker = SignalBlocker::new();
                ctx.clear_compiler_pid();
            }

            outcome
        }
        Err(e) => {
            drop(blocker);
            error!("Failed to fork: {}", e);
            Err(ExecError::fork(e.desc()))
        }
    }
}

/// Runs in the forked child. Never returns.
unsafe fn exec_child(prepared: &PreparedArgv, fds: Option<(RawFd, RawFd)>, blocker: &SignalBlocker) -> ! {
    if let Some((stdout, stderr)) = fds {
        install_sinks(stdout, stderr, libc::STDOUT_FILENO, libc::STDERR_FILENO);
    }

    // The compiler must not start with termination signals blocked.
    let _ = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(blocker.previous_mask()), None);

    let result = libc::execv(prepared.path().as_ptr(), prepared.ptrs.as_ptr());
    libc::_exit(result)
}

/// Puts the sinks on `out_target` and `err_target`, open across exec.
unsafe fn install_sinks(stdout: RawFd, stderr: RawFd, out_target: RawFd, err_target: RawFd) {
    // A stderr sink already sitting on the stdout slot would be clobbered.
    let stderr = if stderr == out_target {
        libc::fcntl(stderr, libc::F_DUPFD, out_target.max(err_target) + 1)
    } else {
        stderr
    };
    move_fd(stdout, out_target);
    move_fd(stderr, err_target);
}

unsafe fn move_fd(fd: RawFd, target: RawFd) {
    if fd == target {
        // Sinks are opened close-on-exec; dup2 would have cleared the flag.
        libc::fcntl(fd, libc::F_SETFD, 0);
    } else {
        libc::dup2(fd, target);
        libc::close(fd);
    }
}

/// Waits for `pid` to terminate, retrying when interrupted by a signal.
fn wait_for_child(pid: Pid) -> ExecResult<ExitOutcome> {
    loop {
        match retry_on_eintr(|| waitpid(pid, None)) {
            Ok(status) => {
                if let Some(outcome) = outcome_from_wait_status(status) {
                    return Ok(outcome);
                }
            }
            Err(e) => {
                error!("waitpid failed: {}", e);
                return Err(ExecError::wait(e.desc()));
            }
        }
    }
}

pub(crate) fn retry_on_eintr<T, F>(mut op: F) -> nix::Result<T>
where
    F: FnMut() -> nix::Result<T>,
{
    loop {
        match op() {
            Err(Errno::EINTR) => continue,
            result => return result,
        }
    }
}

/// Terminal outcome for `status`, or `None` if the child is still around.
///
/// Signal death wins over whatever the exit field holds.
pub(crate) fn outcome_from_wait_status(status: WaitStatus) -> Option<ExitOutcome> {
    match status {
        WaitStatus::Signaled(..) => Some(ExitOutcome::Killed),
        WaitStatus::Exited(_, code) => Some(ExitOutcome::Exited(code)),
        _ => None,
    }
}

pub(crate) fn execute_noreturn(argv: &[OsString]) -> ! {
    let prepared = match PreparedArgv::new(argv) {
        Ok(prepared) => prepared,
        Err(e) => {
            error!("Failed to execute {}: {}", argv[0].to_string_lossy(), e);
            std::process::exit(EXEC_FAILURE_STATUS)
        }
    };

    // SAFETY: `ptrs` is NUL-terminated and borrows from `args`, which outlive the call.
    unsafe { libc::execv(prepared.path().as_ptr(), prepared.ptrs.as_ptr()) };

    error!(
        "Failed to execute {}: {}",
        argv[0].to_string_lossy(),
        std::io::Error::last_os_error()
    );
    std::process::exit(EXEC_FAILURE_STATUS)
}
