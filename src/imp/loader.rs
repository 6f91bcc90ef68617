//! Import Loaders
//!
//! A loader consumes the file content of one load pass, block by block. The
//! default block handler splits LF-terminated lines; the number of trailing
//! bytes forming an incomplete line is reported back so the driver carries
//! them into the next block (or, in AddTail mode, into the next file-grow
//! cycle).

use std::any::Any;

/// Parses one load pass. Implementations are single-use: the seed creates a
/// fresh loader per load via its handler.
pub trait ImpLoader: Send + Any {
    /// Consume `buf`; return how many trailing bytes were left unconsumed
    /// (an incomplete record). With `is_eof` the final partial line is
    /// delivered as a line and the return is 0.
    fn on_load_block(&mut self, buf: &[u8], is_eof: bool) -> usize {
        let mut rest = buf;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.on_load_line(trim_cr(&rest[..pos]), false);
            rest = &rest[pos + 1..];
        }
        if is_eof && !rest.is_empty() {
            self.on_load_line(trim_cr(rest), true);
            return 0;
        }
        rest.len()
    }

    /// One record. `is_eof` marks a final line with no terminator.
    fn on_load_line(&mut self, line: &[u8], is_eof: bool);

    /// Downcast support: handlers get their loader back as `dyn ImpLoader`
    /// at completion and recover the concrete type through this.
    fn as_any(&self) -> &dyn Any;
}

fn trim_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

/// Loader collecting every line; the usual test double, also handy for
/// small configuration files read wholesale.
#[derive(Default)]
pub struct LineCollector {
    pub lines: Vec<String>,
}

impl LineCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

impl ImpLoader for LineCollector {
    fn on_load_line(&mut self, line: &[u8], _is_eof: bool) {
        self.lines.push(String::from_utf8_lossy(line).into_owned());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
