//! Scoped blocking of termination signals.
//!
//! The recorded compiler pid may only be written while the signals that
//! could make a handler read it are blocked. [`SignalBlocker`] brackets that
//! window and restores the previous mask on every exit path.

use nix::sys::signal::{pthread_sigmask, SigSet, SigmaskHow, Signal};
use tracing::warn;

/// Signals whose handlers consult the recorded compiler pid.
pub const TERMINATION_SIGNALS: [Signal; 4] = [
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGHUP,
    Signal::SIGQUIT,
];

/// Blocks [`TERMINATION_SIGNALS`] for the calling thread until dropped.
pub struct SignalBlocker {
    previous: SigSet,
}

impl SignalBlocker {
    pub fn new() -> Self {
        let mut blocked = SigSet::empty();
        for signal in TERMINATION_SIGNALS {
            blocked.add(signal);
        }

        let mut previous = SigSet::empty();
        if let Err(e) = pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&blocked), Some(&mut previous)) {
            warn!("Failed to block signals: {}", e);
        }

        Self { previous }
    }

    /// Mask that was in effect before this guard was created.
    pub fn previous_mask(&self) -> &SigSet {
        &self.previous
    }
}

impl Default for SignalBlocker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SignalBlocker {
    fn drop(&mut self) {
        let _ = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None);
    }
}
