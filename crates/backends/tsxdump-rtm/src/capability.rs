use log::{debug, error};
use serde::Serialize;
use thiserror::Error;
use tsxdump_core::LeakConfig;

/// CPU features the hardware backend depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CpuFeature {
    /// Time stamp counter (`rdtsc`)
    Tsc,
    /// Cache line flush (`clflush`)
    Clflush,
    /// Restricted transactional memory (`xbegin`/`xend`)
    Rtm,
}

/// Errors returned by the startup capability check.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The CPU does not report one or more required features
    #[error("CPU lacks required features: {0:?}")]
    MissingFeatures(Vec<CpuFeature>),
    /// Oracle slots would share pages
    #[error("Slot stride of {slot_size} bytes is not a multiple of the {page_size} byte page size")]
    PageSize {
        /// Configured slot stride
        slot_size: usize,
        /// Page size reported by the OS
        page_size: usize,
    },
    /// The OS did not report a page size
    #[error("Failed to query page size: {0}")]
    PageSizeQuery(std::io::Error),
    /// Not running on x86_64
    #[error("Only supported on x86_64")]
    UnsupportedArch,
}

const LEAF1_EDX_TSC: u32 = 1 << 4;
const LEAF1_EDX_CLFSH: u32 = 1 << 19;
const LEAF7_EBX_RTM: u32 = 1 << 11;

/// Features missing given the CPUID leaf 1 EDX and leaf 7 (subleaf 0) EBX registers.
fn missing_features(leaf1_edx: u32, leaf7_ebx: u32) -> Vec<CpuFeature> {
    let mut missing = vec![];
    if leaf1_edx & LEAF1_EDX_TSC == 0 {
        missing.push(CpuFeature::Tsc);
    }
    if leaf1_edx & LEAF1_EDX_CLFSH == 0 {
        missing.push(CpuFeature::Clflush);
    }
    if leaf7_ebx & LEAF7_EBX_RTM == 0 {
        missing.push(CpuFeature::Rtm);
    }
    missing
}

fn check_page_size(slot_size: usize, page_size: usize) -> Result<(), CapabilityError> {
    if page_size == 0 || slot_size % page_size != 0 {
        return Err(CapabilityError::PageSize {
            slot_size,
            page_size,
        });
    }
    Ok(())
}

#[cfg(target_arch = "x86_64")]
#[allow(unused_unsafe)]
fn cpuid_registers() -> (u32, u32) {
    use std::arch::x86_64::{__cpuid, __cpuid_count};
    let max_leaf = unsafe { __cpuid(0) }.eax;
    let leaf1_edx = unsafe { __cpuid(1) }.edx;
    let leaf7_ebx = if max_leaf >= 7 {
        unsafe { __cpuid_count(7, 0) }.ebx
    } else {
        0
    };
    (leaf1_edx, leaf7_ebx)
}

/// Verifies that this host can run the attack with `config`.
///
/// Queries CPUID for TSC, CLFLUSH and RTM, and checks that the configured slot stride
/// is a whole number of OS pages.
///
/// # Errors
///
/// Returns an error listing every missing feature, or describing the page size
/// mismatch.
pub fn check_capabilities(config: &LeakConfig) -> Result<(), CapabilityError> {
    #[cfg(not(target_arch = "x86_64"))]
    {
        let _ = config;
        error!("tsxdump requires x86_64");
        return Err(CapabilityError::UnsupportedArch);
    }
    #[cfg(target_arch = "x86_64")]
    {
        let (leaf1_edx, leaf7_ebx) = cpuid_registers();
        debug!(
            "CPUID leaf 1 EDX {:#010x}, leaf 7 EBX {:#010x}",
            leaf1_edx, leaf7_ebx
        );
        let missing = missing_features(leaf1_edx, leaf7_ebx);
        if !missing.is_empty() {
            error!("Missing CPU features: {:?}", missing);
            return Err(CapabilityError::MissingFeatures(missing));
        }
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page_size < 0 {
            return Err(CapabilityError::PageSizeQuery(
                std::io::Error::last_os_error(),
            ));
        }
        check_page_size(config.slot_size(), page_size as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::{CapabilityError, CpuFeature, check_page_size, missing_features};

    #[test]
    fn test_all_present() {
        assert!(missing_features(1 << 4 | 1 << 19, 1 << 11).is_empty());
    }

    #[test]
    fn test_reports_every_missing_feature() {
        assert_eq!(
            missing_features(0, 0),
            vec![CpuFeature::Tsc, CpuFeature::Clflush, CpuFeature::Rtm]
        );
        // TSX disabled by microcode
        assert_eq!(missing_features(1 << 4 | 1 << 19, 0), vec![CpuFeature::Rtm]);
    }

    #[test]
    fn test_page_size() {
        assert!(check_page_size(4096, 4096).is_ok());
        assert!(check_page_size(8192, 4096).is_ok());
        assert!(matches!(
            check_page_size(4096, 16384),
            Err(CapabilityError::PageSize {
                slot_size: 4096,
                page_size: 16384
            })
        ));
    }
}
