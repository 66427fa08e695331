//! Outcome of a compiler run.

use std::fmt;

/// How a launched child finished.
///
/// Signal death is its own variant, so a child killed by a signal can never
/// be mistaken for a clean zero exit even when the raw wait status carries a
/// zero exit field.
///
/// # Example
/// ```
/// use compcache_common::ExitOutcome;
///
/// assert!(ExitOutcome::Exited(0).success());
/// assert_eq!(ExitOutcome::Killed.status_code(), -1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitOutcome {
    /// The child exited on its own with this code.
    Exited(i32),

    /// The child was terminated by a signal.
    Killed,
}

impl ExitOutcome {
    /// Integer reported for signal death.
    pub const KILLED_STATUS: i32 = -1;

    /// Returns the integer status of the legacy contract.
    pub fn status_code(&self) -> i32 {
        match self {
            ExitOutcome::Exited(code) => *code,
            ExitOutcome::Killed => Self::KILLED_STATUS,
        }
    }

    /// True only for a normal exit with code 0.
    pub fn success(&self) -> bool {
        matches!(self, ExitOutcome::Exited(0))
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Exited(code) => write!(f, "exit code {}", code),
            ExitOutcome::Killed => write!(f, "killed by signal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ExitOutcome::Exited(0).status_code(), 0);
        assert_eq!(ExitOutcome::Exited(1).status_code(), 1);
        assert_eq!(ExitOutcome::Exited(255).status_code(), 255);
        assert_eq!(ExitOutcome::Killed.status_code(), ExitOutcome::KILLED_STATUS);
    }

    #[test]
    fn test_killed_is_never_success() {
        assert!(!ExitOutcome::Killed.success());
        assert!(!ExitOutcome::Exited(2).success());
        assert!(ExitOutcome::Exited(0).success());
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitOutcome::Exited(3).to_string(), "exit code 3");
        assert_eq!(ExitOutcome::Killed.to_string(), "killed by signal");
    }
}
