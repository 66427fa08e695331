//! # compcache exec
//!
//! Runs the real compiler as a child process and finds it on the search path.
//!
//! This crate provides:
//! - Executable resolution that never resolves back to compcache itself
//! - A blocking launcher with file-redirected stdout/stderr
//!   (fork/execv on POSIX, CreateProcess with job objects on Windows)
//! - Win32 command-line quoting with response-file overflow
//! - `sh.exe` detection for shell scripts on Windows

pub mod cmdline;
pub mod config;
pub mod context;
pub mod execute;
pub mod find;
pub mod shell;

#[cfg(unix)]
pub mod signal;

#[cfg(unix)]
mod execute_unix;

#[cfg(windows)]
mod execute_windows;

// Re-export main types
pub use compcache_common::{ExecError, ExecResult, ExitOutcome};
pub use config::ExecConfig;
pub use context::ExecContext;
pub use execute::{execute, execute_noreturn, Redirect, EXEC_FAILURE_STATUS};
pub use find::{find_executable, find_executable_in_path, find_executable_with_env, is_self_executable};

#[cfg(unix)]
pub use signal::SignalBlocker;
