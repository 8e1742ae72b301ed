//! Flush+Reload receiver.

use crate::oracle::OracleBuffer;
use crate::primitives::CachePrimitives;

/// Measures the access latency of oracle slot `index` in cycles and flushes it again.
///
/// The load is bracketed by serialized timestamp reads behind a full fence, so neither
/// the preceding probe nor speculative loads leak into the measurement. The slot is
/// evicted right afterwards, leaving it clean for the next round without a full flush.
///
/// The result is only meaningful relative to the other slots of the same scan; there
/// is no fixed hit threshold.
#[inline(always)]
pub fn probe_slot<P: CachePrimitives + ?Sized>(
    primitives: &P,
    oracle: &OracleBuffer,
    index: usize,
) -> u64 {
    let addr = oracle.slot(index);
    primitives.fence();
    let before = primitives.read_timestamp();
    // SAFETY: the slot lies inside the live oracle mapping.
    unsafe { primitives.touch(addr) };
    let after = primitives.read_timestamp();
    unsafe { primitives.flush(addr) };
    after.wrapping_sub(before)
}

/// Probes every oracle slot in order, writing slot `i`'s latency to `timings[i]`.
///
/// # Panics
///
/// Panics if `timings` is shorter than the number of oracle slots.
pub fn probe_all<P: CachePrimitives + ?Sized>(
    primitives: &P,
    oracle: &OracleBuffer,
    timings: &mut [u64],
) {
    assert!(
        timings.len() >= oracle.slots(),
        "timing buffer too small: {} < {}",
        timings.len(),
        oracle.slots()
    );
    for (i, time) in timings.iter_mut().take(oracle.slots()).enumerate() {
        *time = probe_slot(primitives, oracle, i);
    }
}
