//! # tsxdump
//!
//! Facade over the tsxdump workspace. Re-exports [`tsxdump_core`] and, behind the
//! `rtm` and `sim` cargo features, the hardware and simulated backends.
//!
//! ```toml
//! tsxdump = { version = "0.1", features = ["rtm"] }
//! ```

pub use tsxdump_core::*;

/// Intel TSX/RTM backend.
#[cfg(feature = "rtm")]
pub use tsxdump_rtm as rtm;

/// Simulated cache backend.
#[cfg(feature = "sim")]
pub use tsxdump_sim as sim;
