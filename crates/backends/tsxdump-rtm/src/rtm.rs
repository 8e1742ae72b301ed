use std::arch::asm;
use std::arch::x86_64::{_mm_clflush, _mm_lfence, _mm_mfence, _rdtsc};
use std::ptr;

use log::info;
use tsxdump_core::LeakConfig;
use tsxdump_core::primitives::CachePrimitives;

use crate::capability::{CapabilityError, check_capabilities};

/// `xbegin` status when the transaction is running.
const XBEGIN_STARTED: u32 = !0;

/// Starts a transaction.
///
/// Encoded as raw bytes (`xbegin rel32` with a zero displacement), so the abort
/// handler is the instruction directly behind it and the assembler needs no RTM
/// target feature. On abort, execution resumes there with `eax` holding the abort
/// status and every register restored.
#[inline(always)]
unsafe fn xbegin() -> u32 {
    let status: u32;
    unsafe {
        asm!(
            "mov eax, 0xffffffff",
            ".byte 0xc7, 0xf8, 0x00, 0x00, 0x00, 0x00",
            out("eax") status,
            options(nostack),
        );
    }
    status
}

/// Commits the running transaction (`xend`).
#[inline(always)]
unsafe fn xend() {
    unsafe { asm!(".byte 0x0f, 0x01, 0xd5", options(nostack)) };
}

/// Hardware primitives of an x86_64 core with TSX/RTM.
///
/// Only obtainable through [`RtmPrimitives::new`], which runs the capability check.
#[derive(Debug)]
pub struct RtmPrimitives {
    _checked: (),
}

impl RtmPrimitives {
    /// Checks the host and returns the primitives.
    ///
    /// # Errors
    ///
    /// Returns a [`CapabilityError`] if the CPU lacks TSC, CLFLUSH or RTM, or if the
    /// slot stride of `config` is not a whole number of pages.
    pub fn new(config: &LeakConfig) -> Result<Self, CapabilityError> {
        check_capabilities(config)?;
        info!("CPU supports RTM, CLFLUSH and TSC");
        Ok(RtmPrimitives { _checked: () })
    }
}

// SAFETY: a fault raised by a load inside an RTM region aborts the transaction and
// is never delivered, so load_byte is sound for any address while one is open.
unsafe impl CachePrimitives for RtmPrimitives {
    #[inline(always)]
    unsafe fn flush(&self, addr: *const u8) {
        unsafe { _mm_clflush(addr) };
    }

    #[inline(always)]
    fn fence(&self) {
        unsafe { _mm_mfence() };
    }

    #[inline(always)]
    fn read_timestamp(&self) -> u64 {
        unsafe {
            _mm_lfence();
            let tsc = _rdtsc();
            _mm_lfence();
            tsc
        }
    }

    #[inline(always)]
    unsafe fn touch(&self, addr: *const u8) {
        let _ = unsafe { ptr::read_volatile(addr) };
    }

    #[inline(always)]
    unsafe fn load_byte(&self, addr: *const u8) -> u8 {
        unsafe { ptr::read_volatile(addr) }
    }

    #[inline(always)]
    unsafe fn begin_transaction(&self) -> bool {
        unsafe { xbegin() == XBEGIN_STARTED }
    }

    #[inline(always)]
    unsafe fn end_transaction(&self) {
        unsafe { xend() };
    }
}
