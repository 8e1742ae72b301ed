//! # tsxdump Core
//!
//! `tsxdump-core` is the platform-independent part of the tsxdump transient read
//! attack. It recovers bytes the process is not permitted to read by reading them
//! inside a hardware transaction, encoding the value into the cache residency of one
//! of 256 oracle slots and timing every slot afterwards.
//!
//! ## Architecture Overview
//!
//! All hardware-specific instruction sequences sit behind a single trait:
//!
//! - [`primitives::CachePrimitives`] - cache line flush, fences, serialized timestamp
//!   reads, transaction begin/end and the raw byte accesses.
//!
//! Backends implement this trait (`tsxdump-rtm` for Intel TSX/RTM hardware,
//! `tsxdump-sim` for a simulated cache used in tests). Everything else in this crate
//! is generic over it.
//!
//! ## Main Components
//!
//! - [`OracleBuffer`] - the page-strided 256-slot probe region.
//! - [`flush_oracle`] - evicts every oracle slot before a round.
//! - [`probe_slot`] / [`probe_all`] - the Flush+Reload receiver.
//! - [`leak`] - the transient gadget, returning a [`LeakSignal`].
//! - [`SampleAggregator`] - rounds of flush, leak, probe and vote, reduced to a
//!   [`ByteEstimate`] by majority vote.
//! - [`Driver`] - walks an address range and forwards estimates to a [`ByteSink`]
//!   such as the [`HexDump`] formatter.
//! - [`LeakConfig`] - the tunable constants, loadable from JSON.
//!
//! ## Platform Support
//!
//! Only x86_64 Linux with RTM is a meaningful target for the hardware backend. The
//! statistics in this crate run anywhere a backend exists.

#![warn(missing_docs)]

mod aggregate;
mod config;
mod driver;
mod dump;
mod flush;
mod gadget;
mod oracle;
pub mod primitives;
mod probe;
mod target;
#[cfg(test)]
mod testing;
pub mod util;

pub use aggregate::{ByteEstimate, RoundStats, SampleAggregator, Votes, fastest_slot};
pub use config::{ConfigError, LeakConfig};
pub use driver::{ByteSink, Driver};
pub use dump::{HexDump, format_line};
pub use flush::flush_oracle;
pub use gadget::{LeakSignal, leak};
pub use oracle::{OracleBuffer, OracleError};
pub use probe::{probe_all, probe_slot};
pub use target::TargetAddress;
