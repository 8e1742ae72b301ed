//! Intel TSX/RTM hardware backend.
//!
//! This crate implements [`tsxdump_core::primitives::CachePrimitives`] with the real
//! instruction sequences: `clflush`, `mfence`, `lfence`-serialized `rdtsc`, and
//! `xbegin`/`xend` for the fault-suppressing transaction.
//!
//! [`RtmPrimitives::new`] checks the CPU before handing out an instance, so a host
//! without RTM or CLFLUSH fails at startup instead of producing garbage.
//!
//! # Platform Requirements
//!
//! - x86_64 with TSX/RTM enabled (not disabled by microcode or `tsx=off`)
//! - A kernel without KPTI if kernel memory is the target

#![warn(missing_docs)]

mod capability;
#[cfg(target_arch = "x86_64")]
mod rtm;

pub use capability::{CapabilityError, CpuFeature, check_capabilities};
#[cfg(target_arch = "x86_64")]
pub use rtm::RtmPrimitives;
