//! Simulated cache backend for testing.
//!
//! This crate provides a [`CachePrimitives`](tsxdump_core::primitives::CachePrimitives)
//! implementation that models cache residency, access latency and transactions in
//! software. It never dereferences a target or oracle address, which makes the whole
//! attack pipeline testable on any machine.
//!
//! # Use Cases
//!
//! - Integration testing of flusher, probe, gadget and aggregator
//! - Exercising noise, aborts and the zero-byte limitation deterministically

#![warn(missing_docs)]

mod sim;

pub use sim::{SimConfig, SimulatedCpu};
