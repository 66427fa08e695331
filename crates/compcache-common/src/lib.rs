//! # compcache common
//!
//! Error taxonomy and outcome types shared by the compcache execution crates.

pub mod errors;
pub mod types;

pub use errors::{ExecError, ExecResult};
pub use types::ExitOutcome;
