use crate::oracle::OracleBuffer;
use crate::primitives::CachePrimitives;

/// Evicts every oracle slot from all cache levels.
///
/// Slots are flushed in order, each preceded by a memory fence, so that any slot
/// found cached afterwards was loaded by the gadget of the current round.
pub fn flush_oracle<P: CachePrimitives + ?Sized>(primitives: &P, oracle: &OracleBuffer) {
    for i in 0..oracle.slots() {
        primitives.fence();
        // SAFETY: every slot lies inside the live oracle mapping.
        unsafe { primitives.flush(oracle.slot(i)) };
    }
}

#[cfg(test)]
mod tests {
    use super::flush_oracle;
    use crate::LeakConfig;
    use crate::oracle::OracleBuffer;
    use crate::testing::{Op, RecordingPrimitives};

    #[test]
    fn test_fence_before_each_flush_in_slot_order() -> anyhow::Result<()> {
        let cpu = RecordingPrimitives::new(true, 0);
        let oracle = OracleBuffer::new(&LeakConfig::default())?;
        flush_oracle(&cpu, &oracle);
        let expected: Vec<Op> = (0..oracle.slots())
            .flat_map(|i| [Op::Fence, Op::Flush(oracle.slot(i) as usize)])
            .collect();
        assert_eq!(cpu.ops(), expected);
        Ok(())
    }
}
