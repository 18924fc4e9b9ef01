use std::io::{self, BufWriter, Write};
use itertools::Itertools;
use crate::events::AccessKind;
use crate::LineBook;

/// Placed in the trace whenever access recording is switched off, so that
/// post-processing can tell the two sides of a pause apart.
const PAUSE_MARKER: &[u8] = b"0 0\n";

/// Writes the memory-access trace, one text record per line:
///
/// ```text
/// <ip> <addr> <offset> <base> <kind>     access inside a known region
/// <ip> <addr> -1 -1 <kind>               access outside every region
/// 0 0                                    recording paused
/// ```
///
/// `kind` is 1 for reads and 0 for writes. All numbers are decimal.
pub struct TraceWriter<W: Write> {
    out:        BufWriter<W>,
    records:    usize,
}

impl<W: Write> TraceWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out:        BufWriter::with_capacity(8192, out),
            records:    0,
        }
    }

    #[inline]
    pub fn hit(&mut self, ip: u64, addr: u64, offset: u64, base: u64, kind: AccessKind) -> io::Result<()> {
        self.records += 1;
        writeln!(self.out, "{} {} {} {} {}", ip, addr, offset, base, kind.code())
    }

    #[inline]
    pub fn miss(&mut self, ip: u64, addr: u64, kind: AccessKind) -> io::Result<()> {
        self.records += 1;
        writeln!(self.out, "{} {} -1 -1 {}", ip, addr, kind.code())
    }

    pub fn pause(&mut self) -> io::Result<()> {
        self.out.write_all(PAUSE_MARKER)
    }

    /// Access records written so far (pause markers excluded).
    #[inline]
    pub fn records(&self) -> usize {
        self.records
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    /// Flushes and hands the underlying writer back.
    pub fn into_inner(self) -> io::Result<W> {
        self.out.into_inner().map_err(|e| e.into_error())
    }
}

/// Writes `ip location` lines in ascending instruction-pointer order.
pub fn write_sourcelines<L: Write>(out: L, lines: &LineBook) -> io::Result<()> {
    let mut out = BufWriter::new(out);
    for (ip, location) in lines.iter().sorted_unstable_by_key(|(ip, _)| **ip) {
        writeln!(out, "{} {}", ip, location)?;
    }

    out.flush()
}
