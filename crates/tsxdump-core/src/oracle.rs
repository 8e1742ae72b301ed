use std::ptr::null_mut;

use libc::{MAP_ANONYMOUS, MAP_POPULATE, MAP_PRIVATE};
use log::debug;
use thiserror::Error;

use crate::config::{ConfigError, LeakConfig};
use crate::util::ORACLE_FILL;

/// Errors that can occur while setting up the oracle buffer.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The configuration describes an invalid oracle geometry
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Mapping the buffer failed
    #[error("Failed to map oracle buffer: {0}")]
    Mmap(#[from] std::io::Error),
}

/// The page-strided probe region encoding a leaked byte as "which slot is cached".
///
/// Holds exactly 256 slots, each `1 << page_shift` bytes wide, so that every byte
/// value maps to its own page and probing one slot does not pull a neighbour into the
/// cache. The buffer is mapped once and reused for every round and every target byte;
/// it is only flushed between rounds and unmapped on drop.
///
/// The raw pointer keeps the buffer `!Send` and `!Sync`: rounds must never touch it
/// concurrently.
#[derive(Debug)]
pub struct OracleBuffer {
    ptr: *mut u8,
    len: usize,
    slots: usize,
    slot_shift: u32,
}

impl OracleBuffer {
    /// Maps a new oracle buffer with the geometry of `config`.
    ///
    /// Every slot is pre-faulted and written, so each one is backed by a distinct
    /// physical page instead of the shared zero page.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or `mmap` fails.
    pub fn new(config: &LeakConfig) -> Result<Self, OracleError> {
        config.validate()?;
        let len = config.oracle_len();
        let p = unsafe {
            libc::mmap(
                null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                MAP_PRIVATE | MAP_ANONYMOUS | MAP_POPULATE,
                -1,
                0,
            )
        };
        if p == libc::MAP_FAILED {
            return Err(OracleError::Mmap(std::io::Error::last_os_error()));
        }
        unsafe { libc::memset(p, ORACLE_FILL as libc::c_int, len) };
        debug!(
            "Mapped oracle buffer at {:p} ({} slots of {} bytes)",
            p,
            config.slots,
            config.slot_size()
        );
        Ok(OracleBuffer {
            ptr: p as *mut u8,
            len,
            slots: config.slots,
            slot_shift: config.page_shift,
        })
    }

    /// Address of the first byte of slot `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`slots()`](OracleBuffer::slots).
    #[inline(always)]
    pub fn slot(&self, index: usize) -> *const u8 {
        assert!(
            index < self.slots,
            "OracleBuffer::slot failed. Index {} >= {}",
            index,
            self.slots
        );
        unsafe { self.ptr.byte_add(index << self.slot_shift) }
    }

    /// Number of slots.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Checks that this buffer was built with the geometry of `config`.
    pub fn check_geometry(&self, config: &LeakConfig) -> Result<(), ConfigError> {
        if self.slots != config.slots || self.slot_shift != config.page_shift {
            return Err(ConfigError::OracleMismatch {
                slots: config.slots,
                page_shift: config.page_shift,
                actual_slots: self.slots,
                actual_shift: self.slot_shift,
            });
        }
        Ok(())
    }
}

impl Drop for OracleBuffer {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.ptr as *mut libc::c_void, self.len) };
    }
}
