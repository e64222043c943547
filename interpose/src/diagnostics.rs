//! Allocation-free structured logging to stderr.
//!
//! Every interposed entry point may be called from inside an allocator, so logging must never
//! itself allocate. `LineBuf` formats a record into a fixed-size stack buffer and writes it with
//! one `write(2)` syscall: a small `fmt::Write` adapter over a fixed sink, reached through macros
//! so call sites read like ordinary `format!`-style logging.

use std::fmt;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU8, Ordering};

const STDERR_FD: RawFd = libc::STDERR_FILENO;
const LINE_CAPACITY: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Severity {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl Severity {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "error" => Some(Self::Error),
            "warn" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

static MIN_SEVERITY: AtomicU8 = AtomicU8::new(Severity::Error as u8);

/// Set the minimum severity that gets written to stderr. Called once during init from the
/// parsed `Config`.
pub fn set_min_severity(severity: Severity) {
    MIN_SEVERITY.store(severity as u8, Ordering::Relaxed);
}

fn enabled(severity: Severity) -> bool {
    severity as u8 <= MIN_SEVERITY.load(Ordering::Relaxed)
}

/// Fixed-capacity stack buffer implementing `fmt::Write`, truncating silently if a record would
/// overflow `LINE_CAPACITY` rather than growing (growing would allocate).
struct LineBuf {
    buf: [u8; LINE_CAPACITY],
    len: usize,
}

impl LineBuf {
    fn new() -> Self {
        Self { buf: [0; LINE_CAPACITY], len: 0 }
    }

    fn as_bytes(&self) -> &[u8] {
        self.buf.get(..self.len).unwrap_or(&[])
    }
}

impl fmt::Write for LineBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let remaining = LINE_CAPACITY.saturating_sub(self.len);
        let take = bytes.len().min(remaining);

        if let (Some(dst), Some(src)) = (self.buf.get_mut(self.len..self.len + take), bytes.get(..take)) {
            dst.copy_from_slice(src);
            self.len += take;
        }

        Ok(())
    }
}

/// Write one already-formatted line to stderr. Never allocates, never panics on a short write.
fn write_line(line: &LineBuf) {
    let bytes = line.as_bytes();

    // Safety: `bytes` is a valid, stack-resident slice for the duration of this call; `STDERR_FD`
    // is always open for the process lifetime of anything calling into this crate.
    unsafe {
        libc::write(STDERR_FD, bytes.as_ptr().cast(), bytes.len());
    }
}

#[doc(hidden)]
pub fn log_helper(severity: Severity, args: fmt::Arguments<'_>) {
    if !enabled(severity) {
        return;
    }

    let mut line = LineBuf::new();
    let _ = fmt::Write::write_fmt(&mut line, format_args!("[bigmaac] {}: ", severity.label()));
    let _ = fmt::Write::write_fmt(&mut line, args);
    let _ = fmt::Write::write_str(&mut line, "\n");
    write_line(&line);
}

#[macro_export]
macro_rules! bigmaac_error {
    ($($arg:tt)*) => {
        $crate::diagnostics::log_helper($crate::diagnostics::Severity::Error, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! bigmaac_warn {
    ($($arg:tt)*) => {
        $crate::diagnostics::log_helper($crate::diagnostics::Severity::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! bigmaac_info {
    ($($arg:tt)*) => {
        $crate::diagnostics::log_helper($crate::diagnostics::Severity::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! bigmaac_debug {
    ($($arg:tt)*) => {
        $crate::diagnostics::log_helper($crate::diagnostics::Severity::Debug, format_args!($($arg)*))
    };
}
