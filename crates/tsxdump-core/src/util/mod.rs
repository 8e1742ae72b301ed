//! Utility types and constants used throughout tsxdump.
//!
//! - Constants for the oracle geometry and defaults ([`PAGE_SHIFT`], [`ORACLE_SLOTS`], ...)
//! - Progress reporting helper ([`NamedProgress`])

mod constants;
mod named_progress;

pub use self::constants::*;
pub use self::named_progress::NamedProgress;
