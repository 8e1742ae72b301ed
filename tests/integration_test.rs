use std::collections::HashSet;

use tsxdump::primitives::CachePrimitives;
use tsxdump::{
    ByteEstimate, ConfigError, Driver, HexDump, LeakConfig, LeakSignal, OracleBuffer,
    SampleAggregator, TargetAddress, fastest_slot, flush_oracle, leak, probe_all,
};
use tsxdump_sim::{SimConfig, SimulatedCpu};

const KERNEL_ADDR: usize = 0xffff_ffff_8100_0000;

fn noisy() -> SimConfig {
    SimConfig {
        jitter: 30,
        false_hit_rate: 0.0005,
        abort_rate: 0.02,
        seed: 0x5eed,
        ..Default::default()
    }
}

#[test]
fn test_recover_every_nonzero_byte() -> anyhow::Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let cpu = SimulatedCpu::new(noisy());
    let base = TargetAddress::from(KERNEL_ADDR);
    let secret: Vec<u8> = (1..=255).collect();
    cpu.map_bytes(base, &secret);

    let config = LeakConfig::default();
    let oracle = OracleBuffer::new(&config)?;
    let mut aggregator = SampleAggregator::new(&cpu, &oracle, config)?;
    let correct = secret
        .iter()
        .enumerate()
        .filter(|&(i, &expected)| {
            aggregator.recover(base.offset(i)) == ByteEstimate::Recovered(expected)
        })
        .count();
    assert!(
        correct * 10 >= secret.len() * 9,
        "only {}/{} bytes recovered",
        correct,
        secret.len()
    );
    assert_eq!(aggregator.stats().rounds(), 255 * 3);
    assert!(cpu.denied() > 0);
    Ok(())
}

#[test]
fn test_resident_slot_strictly_faster() -> anyhow::Result<()> {
    let cpu = SimulatedCpu::new(SimConfig {
        jitter: 50,
        seed: 1,
        ..Default::default()
    });
    let oracle = OracleBuffer::new(&LeakConfig::default())?;
    let mut timings = vec![0; oracle.slots()];
    for slot in 0..oracle.slots() {
        flush_oracle(&cpu, &oracle);
        unsafe { cpu.touch(oracle.slot(slot)) };
        probe_all(&cpu, &oracle, &mut timings);
        let resident = timings[slot];
        assert!(
            timings
                .iter()
                .enumerate()
                .all(|(i, &time)| i == slot || resident < time),
            "slot {} not strictly fastest",
            slot
        );
        assert_eq!(fastest_slot(&timings), Some(slot));
    }
    Ok(())
}

#[test]
fn test_probe_leaves_oracle_flushed() -> anyhow::Result<()> {
    let cpu = SimulatedCpu::new(SimConfig::default());
    let oracle = OracleBuffer::new(&LeakConfig::default())?;
    let mut timings = vec![0; oracle.slots()];
    unsafe { cpu.touch(oracle.slot(0x42)) };
    probe_all(&cpu, &oracle, &mut timings);
    assert!((0..oracle.slots()).all(|i| !cpu.is_cached(oracle.slot(i))));
    Ok(())
}

#[test]
fn test_flushed_oracle_has_no_fixed_winner() -> anyhow::Result<()> {
    let cpu = SimulatedCpu::new(SimConfig {
        jitter: 50,
        seed: 2,
        ..Default::default()
    });
    let oracle = OracleBuffer::new(&LeakConfig::default())?;
    let mut timings = vec![0; oracle.slots()];
    let mut winners = HashSet::new();
    for _ in 0..64 {
        flush_oracle(&cpu, &oracle);
        probe_all(&cpu, &oracle, &mut timings);
        winners.insert(fastest_slot(&timings));
    }
    assert!(winners.len() > 1, "slot {:?} always fastest", winners);
    Ok(())
}

#[test]
fn test_gadget_touches_exactly_one_slot() -> anyhow::Result<()> {
    let cpu = SimulatedCpu::new(SimConfig::default());
    let target = TargetAddress::from(KERNEL_ADDR);
    cpu.map_bytes(target, &[0x9c]);
    let oracle = OracleBuffer::new(&LeakConfig::default())?;
    flush_oracle(&cpu, &oracle);
    assert_eq!(leak(&cpu, target, &oracle, Some(16)), LeakSignal::Committed);
    let cached: Vec<usize> = (0..oracle.slots())
        .filter(|&i| cpu.is_cached(oracle.slot(i)))
        .collect();
    assert_eq!(cached, vec![0x9c]);
    Ok(())
}

#[test]
fn test_zero_byte_is_indeterminate() -> anyhow::Result<()> {
    let cpu = SimulatedCpu::new(SimConfig::default());
    let target = TargetAddress::from(KERNEL_ADDR);
    cpu.map_bytes(target, &[0x00]);
    let config = LeakConfig {
        zero_retries: Some(8),
        ..Default::default()
    };
    let oracle = OracleBuffer::new(&config)?;
    let mut aggregator = SampleAggregator::new(&cpu, &oracle, config)?;
    assert_eq!(aggregator.recover(target), ByteEstimate::Indeterminate);
    assert_eq!(aggregator.stats().zero_exhausted, 3);
    assert_eq!(aggregator.stats().committed, 0);
    Ok(())
}

#[test]
fn test_denied_transactions_still_vote() -> anyhow::Result<()> {
    let cpu = SimulatedCpu::new(SimConfig {
        abort_rate: 1.0,
        ..Default::default()
    });
    let target = TargetAddress::from(KERNEL_ADDR);
    cpu.map_bytes(target, b"x");
    let config = LeakConfig::default();
    let oracle = OracleBuffer::new(&config)?;
    let mut aggregator = SampleAggregator::new(&cpu, &oracle, config)?;
    // every slot misses equally, so the earliest slot wins
    assert_eq!(aggregator.recover(target), ByteEstimate::Recovered(0));
    assert_eq!(aggregator.stats().aborted, 3);
    assert_eq!(cpu.transactions(), 0);
    Ok(())
}

#[test]
fn test_more_rounds() -> anyhow::Result<()> {
    let cpu = SimulatedCpu::new(noisy());
    let target = TargetAddress::from(KERNEL_ADDR);
    cpu.map_bytes(target, b"Q");
    let config = LeakConfig {
        rounds: 9,
        ..Default::default()
    };
    let oracle = OracleBuffer::new(&config)?;
    let mut aggregator = SampleAggregator::new(&cpu, &oracle, config)?;
    assert_eq!(aggregator.recover(target), ByteEstimate::Recovered(b'Q'));
    assert_eq!(aggregator.stats().rounds(), 9);
    Ok(())
}

#[test]
fn test_aggregator_rejects_foreign_oracle() -> anyhow::Result<()> {
    let cpu = SimulatedCpu::new(SimConfig::default());
    let oracle = OracleBuffer::new(&LeakConfig {
        page_shift: 13,
        ..Default::default()
    })?;
    let result = SampleAggregator::new(&cpu, &oracle, LeakConfig::default());
    assert!(matches!(result, Err(ConfigError::OracleMismatch { .. })));
    Ok(())
}

#[test]
fn test_dump_known_string() -> anyhow::Result<()> {
    let cpu = SimulatedCpu::new(SimConfig::default());
    let base = TargetAddress::from(KERNEL_ADDR);
    cpu.map_bytes(base, b"TSX leaks bytes!");
    let config = LeakConfig::default();
    let oracle = OracleBuffer::new(&config)?;
    let mut driver = Driver::new(SampleAggregator::new(&cpu, &oracle, config)?, None);
    let mut dump = HexDump::new(Vec::new());
    let indeterminate = driver.run(base, 16, &mut dump)?;
    assert_eq!(indeterminate, 0);
    assert_eq!(
        String::from_utf8(dump.into_inner())?,
        "ffffffff81000000  54 53 58 20 6c 65 61 6b  73 20 62 79 74 65 73 21  |TSX leaks bytes!|\n"
    );
    Ok(())
}

#[test]
fn test_dump_partial_line_and_collect() -> anyhow::Result<()> {
    let cpu = SimulatedCpu::new(SimConfig::default());
    let base = TargetAddress::from(KERNEL_ADDR + 0x10);
    cpu.map_bytes(base, b"kernel\x01data\x7f here!");
    let config = LeakConfig {
        zero_retries: Some(4),
        ..Default::default()
    };
    let oracle = OracleBuffer::new(&config)?;
    let mut driver = Driver::new(SampleAggregator::new(&cpu, &oracle, config)?, None);
    let mut sink = (HexDump::new(Vec::new()), Vec::<ByteEstimate>::new());
    // one byte past the mapped data reads as zero
    let indeterminate = driver.run(base, 19, &mut sink)?;
    assert_eq!(indeterminate, 1);

    let (dump, estimates) = sink;
    assert_eq!(estimates.len(), 19);
    assert_eq!(estimates[6], ByteEstimate::Recovered(0x01));
    assert_eq!(estimates[18], ByteEstimate::Indeterminate);

    let out = String::from_utf8(dump.into_inner())?;
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(
        lines[0],
        "ffffffff81000010  6b 65 72 6e 65 6c 01 64  61 74 61 7f 20 68 65 72  |kernel.data. her|"
    );
    assert!(lines[1].starts_with("ffffffff81000020  65 21 ?? "));
    assert!(lines[1].ends_with("|e!.|"));
    Ok(())
}

#[test]
fn test_byte_stats_reset_per_byte() -> anyhow::Result<()> {
    let cpu = SimulatedCpu::new(SimConfig::default());
    let base = TargetAddress::from(KERNEL_ADDR);
    cpu.map_bytes(base, b"a\0");
    let config = LeakConfig {
        zero_retries: Some(2),
        ..Default::default()
    };
    let oracle = OracleBuffer::new(&config)?;
    let mut aggregator = SampleAggregator::new(&cpu, &oracle, config)?;

    assert_eq!(aggregator.recover(base), ByteEstimate::Recovered(b'a'));
    assert_eq!(aggregator.byte_stats().committed, 3);

    assert_eq!(aggregator.recover(base.offset(1)), ByteEstimate::Indeterminate);
    assert_eq!(aggregator.byte_stats().committed, 0);
    assert_eq!(aggregator.byte_stats().zero_exhausted, 3);
    assert_eq!(aggregator.stats().rounds(), 6);
    Ok(())
}
