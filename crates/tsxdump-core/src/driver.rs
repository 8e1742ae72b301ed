use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{info, warn};

use crate::aggregate::{ByteEstimate, SampleAggregator};
use crate::primitives::CachePrimitives;
use crate::target::TargetAddress;
use crate::util::NamedProgress;

/// Consumer of recovered bytes, fed strictly in address order.
pub trait ByteSink {
    /// Receives the estimate for the byte at `addr`.
    fn push(&mut self, addr: TargetAddress, estimate: ByteEstimate) -> std::io::Result<()>;

    /// Called once after the last byte.
    fn finish(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl ByteSink for Vec<ByteEstimate> {
    fn push(&mut self, _addr: TargetAddress, estimate: ByteEstimate) -> std::io::Result<()> {
        Vec::push(self, estimate);
        Ok(())
    }
}

impl<A: ByteSink, B: ByteSink> ByteSink for (A, B) {
    fn push(&mut self, addr: TargetAddress, estimate: ByteEstimate) -> std::io::Result<()> {
        self.0.push(addr, estimate)?;
        self.1.push(addr, estimate)
    }

    fn finish(&mut self) -> std::io::Result<()> {
        self.0.finish()?;
        self.1.finish()
    }
}

impl<S: ByteSink + ?Sized> ByteSink for &mut S {
    fn push(&mut self, addr: TargetAddress, estimate: ByteEstimate) -> std::io::Result<()> {
        (**self).push(addr, estimate)
    }

    fn finish(&mut self) -> std::io::Result<()> {
        (**self).finish()
    }
}

/// Walks an address range byte by byte.
///
/// Each byte is recovered independently with the aggregator's fixed number of rounds
/// and handed to the sink immediately. There is no retry or backoff across bytes.
pub struct Driver<'a, P: CachePrimitives + ?Sized> {
    aggregator: SampleAggregator<'a, P>,
    progress: Option<MultiProgress>,
}

impl<'a, P: CachePrimitives + ?Sized> Driver<'a, P> {
    /// Creates a driver. With `progress`, a bar over the recovered bytes is shown.
    pub fn new(aggregator: SampleAggregator<'a, P>, progress: Option<MultiProgress>) -> Self {
        Driver {
            aggregator,
            progress,
        }
    }

    /// Recovers `length` bytes starting at `base` into `sink`.
    ///
    /// Returns the number of indeterminate bytes.
    ///
    /// # Errors
    ///
    /// Returns an error only if the sink fails to write.
    pub fn run<S: ByteSink + ?Sized>(
        &mut self,
        base: TargetAddress,
        length: usize,
        sink: &mut S,
    ) -> std::io::Result<usize> {
        info!("Recovering {} bytes starting at {}", length, base);
        let p = self.progress.as_ref().map(|p| {
            let p = p.add(ProgressBar::new(length as u64));
            p.set_style(ProgressStyle::named_bar("Recovered", "bytes"));
            p.enable_steady_tick(Duration::from_secs(1));
            p
        });
        let mut indeterminate = 0;
        for offset in 0..length {
            let addr = base.offset(offset);
            let estimate = self.aggregator.recover(addr);
            if estimate == ByteEstimate::Indeterminate {
                warn!("{}: no round produced a vote", addr);
                indeterminate += 1;
            }
            sink.push(addr, estimate)?;
            if let Some(p) = p.as_ref() {
                p.inc(1);
            }
        }
        if let Some(p) = p {
            p.finish_and_clear();
        }
        sink.finish()?;
        let stats = self.aggregator.stats();
        info!(
            "Done: {} rounds, {} committed, {} aborted, {} zero-exhausted",
            stats.rounds(),
            stats.committed,
            stats.aborted,
            stats.zero_exhausted
        );
        Ok(indeterminate)
    }

    /// The underlying aggregator.
    pub fn aggregator(&self) -> &SampleAggregator<'a, P> {
        &self.aggregator
    }
}
