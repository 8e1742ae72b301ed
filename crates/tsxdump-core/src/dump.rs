//! Hex/ASCII dump of recovered bytes.

use std::fmt::Write as _;
use std::io::Write;

use crate::aggregate::ByteEstimate;
use crate::driver::ByteSink;
use crate::target::TargetAddress;
use crate::util::BYTES_PER_LINE;

const PLACEHOLDER: char = '.';

fn printable(byte: Option<u8>) -> char {
    match byte {
        Some(b @ 0x20..=0x7e) => b as char,
        _ => PLACEHOLDER,
    }
}

/// Renders one dump line.
///
/// Layout: sixteen hex digits of `start`, then up to sixteen two-digit hex values
/// with an extra gap after the eighth, then the printable-ASCII column between bars.
/// Short lines are padded so the ASCII column stays aligned. Indeterminate bytes
/// print as `??`.
///
/// ```
/// use tsxdump_core::{TargetAddress, format_line};
///
/// let line = format_line(TargetAddress::from(0x10usize), &[Some(b'h'), Some(b'i'), None]);
/// assert!(line.starts_with("0000000000000010  68 69 ??"));
/// assert!(line.ends_with("  |hi.|"));
/// ```
pub fn format_line(start: TargetAddress, bytes: &[Option<u8>]) -> String {
    assert!(bytes.len() <= BYTES_PER_LINE);
    let mut line = format!("{:016x} ", start);
    for i in 0..BYTES_PER_LINE {
        if i % 8 == 0 {
            line.push(' ');
        }
        match bytes.get(i) {
            Some(Some(byte)) => {
                let _ = write!(line, "{:02x} ", byte);
            }
            Some(None) => line.push_str("?? "),
            None => line.push_str("   "),
        }
    }
    line.push_str(" |");
    line.extend(bytes.iter().map(|&b| printable(b)));
    line.push('|');
    line
}

/// [`ByteSink`] printing sixteen bytes per line in `hexdump -C` style.
pub struct HexDump<W: Write> {
    writer: W,
    start: Option<TargetAddress>,
    line: Vec<Option<u8>>,
}

impl<W: Write> HexDump<W> {
    /// Dump into `writer`.
    pub fn new(writer: W) -> Self {
        HexDump {
            writer,
            start: None,
            line: Vec::with_capacity(BYTES_PER_LINE),
        }
    }

    fn emit(&mut self) -> std::io::Result<()> {
        if let Some(start) = self.start.take() {
            writeln!(self.writer, "{}", format_line(start, &self.line))?;
            self.line.clear();
        }
        Ok(())
    }

    /// Returns the underlying writer. Pending bytes of a partial line are dropped,
    /// call [`ByteSink::finish`] first.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ByteSink for HexDump<W> {
    fn push(&mut self, addr: TargetAddress, estimate: ByteEstimate) -> std::io::Result<()> {
        self.start.get_or_insert(addr);
        self.line.push(estimate.value());
        if self.line.len() == BYTES_PER_LINE {
            self.emit()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> std::io::Result<()> {
        self.emit()?;
        self.writer.flush()
    }
}
