use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

use crate::util::{DEFAULT_ROUNDS, DEFAULT_ZERO_RETRIES, ORACLE_SLOTS, PAGE_SHIFT};

/// Errors that can occur when loading or validating a [`LeakConfig`].
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ConfigError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
    #[error("Oracle must have exactly 256 slots, got {0}")]
    SlotCount(usize),
    #[error("Page shift {0} out of range (12..=21)")]
    PageShift(u32),
    #[error("At least one sample round is required")]
    NoRounds,
    #[error("Oracle geometry ({actual_slots} slots, shift {actual_shift}) does not match config ({slots} slots, shift {page_shift})")]
    OracleMismatch {
        slots: usize,
        page_shift: u32,
        actual_slots: usize,
        actual_shift: u32,
    },
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Tunable constants of the attack.
///
/// Passed explicitly into the oracle, the probe and the aggregator so hosts can be
/// calibrated without recompiling. Missing JSON fields take their default.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeakConfig {
    /// Number of oracle slots. Must cover every byte value, so always 256.
    pub slots: usize,
    /// log2 of the slot stride. Each slot must sit on its own page.
    pub page_shift: u32,
    /// Sample rounds (votes) per recovered byte.
    pub rounds: usize,
    /// How often the gadget re-reads a target that returned zero inside one
    /// transaction. `None` retries forever.
    pub zero_retries: Option<u32>,
}

impl Default for LeakConfig {
    fn default() -> Self {
        Self {
            slots: ORACLE_SLOTS,
            page_shift: PAGE_SHIFT,
            rounds: DEFAULT_ROUNDS,
            zero_retries: Some(DEFAULT_ZERO_RETRIES),
        }
    }
}

impl LeakConfig {
    /// Loads configuration from a JSON file and validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or describes
    /// an invalid configuration.
    pub fn from_jsonfile<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: LeakConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants of the oracle geometry and the sampling.
    pub fn validate(&self) -> Result<()> {
        if self.slots != ORACLE_SLOTS {
            return Err(ConfigError::SlotCount(self.slots));
        }
        // at least one 4 KB page per slot, at most one 2 MB huge page
        if !(12..=21).contains(&self.page_shift) {
            return Err(ConfigError::PageShift(self.page_shift));
        }
        if self.rounds == 0 {
            return Err(ConfigError::NoRounds);
        }
        Ok(())
    }

    /// Slot stride in bytes.
    pub const fn slot_size(&self) -> usize {
        1 << self.page_shift
    }

    /// Total size of the oracle buffer in bytes.
    pub const fn oracle_len(&self) -> usize {
        self.slots << self.page_shift
    }
}
