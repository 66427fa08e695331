//! Error types for compiler execution.
//!
//! Errors fall into two classes. Fatal errors (fork failure, wait failure,
//! an argument vector the OS cannot represent) abort the calling context.
//! Recoverable errors (job-object APIs, handle acquisition, process creation)
//! are logged where they happen and surface as a numeric sentinel to callers
//! that still speak the legacy integer contract.
//!
//! ```
//! use compcache_common::{ExecError, ExecResult};
//!
//! fn spawn() -> ExecResult<()> {
//!     Err(ExecError::create_process("cl.exe", 2, "The system cannot find the file specified."))
//! }
//!
//! let err = spawn().unwrap_err();
//! assert!(!err.is_fatal());
//! assert_eq!(err.sentinel(), -1);
//! ```

use thiserror::Error;

/// Result type alias for execution operations.
pub type ExecResult<T> = std::result::Result<T, ExecError>;

/// Errors raised while resolving or launching a compiler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// The argument vector was empty or contained a value the OS cannot carry.
    #[error("Invalid argument vector: {reason}")]
    InvalidArgument { reason: String },

    #[error("Failed to fork: {reason}")]
    Fork { reason: String },

    /// waitpid failed with something other than EINTR.
    #[error("waitpid failed: {reason}")]
    Wait { reason: String },

    /// Waiting for a Windows child or reading its exit code failed.
    #[error("failed to {api}: {message} ({code})")]
    ProcessWait {
        api: &'static str,
        code: i32,
        message: String,
    },

    /// Querying whether the current process already lives in a job failed.
    #[error("failed to {api}: {message} ({code})")]
    JobQuery {
        api: &'static str,
        code: i32,
        message: String,
    },

    /// Creating, configuring or assigning a job object failed.
    #[error("failed to {api}: {message} ({code})")]
    JobObject {
        api: &'static str,
        code: i32,
        message: String,
    },

    /// A standard or redirect handle could not be acquired for the child.
    #[error("invalid {stream} handle: {message}")]
    InvalidHandle { stream: &'static str, message: String },

    #[error("failed to execute {path}: {message} ({code})")]
    CreateProcess {
        path: String,
        code: i32,
        message: String,
    },

    #[error("failed to assign process to job object {path}: {message} ({code})")]
    AssignToJob {
        path: String,
        code: i32,
        message: String,
    },

    /// The oversized-argument response file could not be written.
    #[error("failed to write argument file in {dir}: {reason}")]
    ResponseFile { dir: String, reason: String },
}

impl ExecError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn fork(reason: impl Into<String>) -> Self {
        Self::Fork {
            reason: reason.into(),
        }
    }

    pub fn wait(reason: impl Into<String>) -> Self {
        Self::Wait {
            reason: reason.into(),
        }
    }

    pub fn process_wait(api: &'static str, code: i32, message: impl Into<String>) -> Self {
        Self::ProcessWait {
            api,
            code,
            message: message.into(),
        }
    }

    pub fn job_query(api: &'static str, code: i32, message: impl Into<String>) -> Self {
        Self::JobQuery {
            api,
            code,
            message: message.into(),
        }
    }

    pub fn job_object(api: &'static str, code: i32, message: impl Into<String>) -> Self {
        Self::JobObject {
            api,
            code,
            message: message.into(),
        }
    }

    pub fn invalid_handle(stream: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidHandle {
            stream,
            message: message.into(),
        }
    }

    pub fn create_process(path: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self::CreateProcess {
            path: path.into(),
            code,
            message: message.into(),
        }
    }

    pub fn assign_to_job(path: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self::AssignToJob {
            path: path.into(),
            code,
            message: message.into(),
        }
    }

    pub fn response_file(dir: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResponseFile {
            dir: dir.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors that must abort the calling context.
    ///
    /// A front end exits with the launcher's failure status on these and with
    /// a plain `1` otherwise.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. }
                | Self::Fork { .. }
                | Self::Wait { .. }
                | Self::ProcessWait { .. }
        )
    }

    /// Integer sentinel of the legacy contract.
    ///
    /// Job-membership queries report `0`; every other failure reports `-1`.
    pub fn sentinel(&self) -> i32 {
        match self {
            Self::JobQuery { .. } => 0,
            _ => -1,
        }
    }
}
