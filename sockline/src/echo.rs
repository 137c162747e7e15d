//! Echo presentation and sink plumbing.
//!
//! Everything the connection says about its own traffic goes through an
//! injectable sink instead of being hardwired to stdout: operation banners,
//! per-line text echo with a direction prefix, and a fixed-width hex dump.
//! Sink failures are swallowed - presentation must never change a transport
//! outcome.

use std::fmt;
use std::io::{self, Write};

/// Bytes per hex-dump row.
const HEX_WIDTH: usize = 16;

/// Controls what the connection reports about its own traffic, and where.
pub struct Echo {
    /// Print operation banners (`======== Receiving ... ========`).
    pub headers: bool,
    /// Render per-line with a direction prefix instead of raw passthrough.
    pub per_line: bool,
    /// Echo sent data.
    pub sending: bool,
    /// Echo received data.
    pub recving: bool,
    /// Hex-dump instead of text.
    pub hex: bool,
    enabled: bool,
    out: Box<dyn Write + Send>,
}

impl Echo {
    pub(crate) fn new(enabled: bool) -> Self {
        Echo {
            headers: true,
            per_line: true,
            sending: true,
            recving: true,
            hex: false,
            enabled,
            out: Box::new(io::stdout()),
        }
    }

    /// Redirect all echo output.
    pub fn set_sink(&mut self, sink: Box<dyn Write + Send>) {
        self.out = sink;
    }

    pub fn verbose(&self) -> bool {
        self.enabled
    }

    /// Master switch; returns the previous value so callers can restore it.
    pub fn set_verbose(&mut self, on: bool) -> bool {
        std::mem::replace(&mut self.enabled, on)
    }

    pub(crate) fn header(&mut self, args: fmt::Arguments<'_>) {
        if self.enabled && self.headers {
            let _ = writeln!(self.out, "{args}");
            let _ = self.out.flush();
        }
    }

    pub(crate) fn sent(&mut self, data: &[u8]) {
        if self.enabled && self.sending {
            self.dump(data, ">> ");
        }
    }

    pub(crate) fn recvd(&mut self, data: &[u8]) {
        if self.enabled && self.recving {
            self.dump(data, "<< ");
        }
    }

    fn dump(&mut self, data: &[u8], prefix: &str) {
        if self.per_line {
            if self.hex {
                for line in hex_lines(data, prefix) {
                    let _ = writeln!(self.out, "{line}");
                }
            } else {
                for line in data.split(|b| *b == b'\n') {
                    let _ = writeln!(self.out, "{prefix}{}", String::from_utf8_lossy(line));
                }
            }
        } else if self.hex {
            for byte in data {
                let _ = write!(self.out, "{byte:02x}");
            }
        } else {
            let _ = self.out.write_all(data);
        }
        let _ = self.out.flush();
    }
}

/// 16-byte rows: uppercase hex, padded to a fixed width, then a gutter showing
/// printable characters with `.` substituted for the rest.
pub(crate) fn hex_lines(data: &[u8], prefix: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for chunk in data.chunks(HEX_WIDTH) {
        let mut line = String::from(prefix);
        for (i, byte) in chunk.iter().enumerate() {
            if i > 0 {
                line.push(' ');
            }
            line.push_str(&format!("{byte:02X}"));
        }
        for _ in chunk.len()..HEX_WIDTH {
            line.push_str("   ");
        }
        line.push_str("  |");
        for &byte in chunk {
            if byte == b' ' || byte.is_ascii_graphic() {
                line.push(byte as char);
            } else {
                line.push('.');
            }
        }
        for _ in chunk.len()..HEX_WIDTH {
            line.push(' ');
        }
        line.push('|');
        lines.push(line);
    }
    lines
}

/// Copies every write to each inner sink.
///
/// Lets a caller mirror traffic to several places at once, say a terminal and a
/// session log:
///
/// ```rust,ignore
/// let tee = Tee::new()
///     .push(Box::new(std::io::stdout()))
///     .push(Box::new(logfile));
/// ```
#[derive(Default)]
pub struct Tee {
    sinks: Vec<Box<dyn Write + Send>>,
}

impl Tee {
    pub fn new() -> Self {
        Tee { sinks: Vec::new() }
    }

    pub fn push(mut self, sink: Box<dyn Write + Send>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for sink in &mut self.sinks {
            let _ = sink.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        for sink in &mut self.sinks {
            let _ = sink.flush();
        }
        Ok(())
    }
}
