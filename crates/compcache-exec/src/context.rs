//! Per-invocation execution state.

use crate::config::ExecConfig;
use std::sync::atomic::{AtomicI32, Ordering};

/// State shared between the launcher and the caller's signal handling.
///
/// At most one compiler child is tracked at a time. A signal handler may read
/// [`ExecContext::compiler_pid`] to forward termination to the child; the
/// launcher writes it only while termination signals are blocked.
#[derive(Debug, Default)]
pub struct ExecContext {
    pub config: ExecConfig,
    compiler_pid: AtomicI32,
}

impl ExecContext {
    pub fn new(config: ExecConfig) -> Self {
        Self {
            config,
            compiler_pid: AtomicI32::new(0),
        }
    }

    /// Pid of the running compiler child, or `None` when no child is live.
    pub fn compiler_pid(&self) -> Option<i32> {
        match self.compiler_pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    pub(crate) fn set_compiler_pid(&self, pid: i32) {
        self.compiler_pid.store(pid, Ordering::SeqCst);
    }

    pub(crate) fn clear_compiler_pid(&self) {
        self.compiler_pid.store(0, Ordering::SeqCst);
    }
}
