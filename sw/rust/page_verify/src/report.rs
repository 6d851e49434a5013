//! Pass results and the counters that build them.

use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

/// Mismatch records kept per pass unless configured otherwise.
pub const DEFAULT_RECORD_CAP: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassKind {
    PageWrite,
    ByteWrite,
    PageReadVerify,
    ByteReadVerify,
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PassKind::PageWrite => "page write",
            PassKind::ByteWrite => "byte write",
            PassKind::PageReadVerify => "page read-verify",
            PassKind::ByteReadVerify => "byte read-verify",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub page: u32,
    pub offset: u32,
    pub actual: u8,
    pub expected: u8,
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page:{} [{}] = {}, expected {}", self.page, self.offset, self.actual, self.expected)
    }
}

/// Outcome of one pass. Built once when the pass ends; read-only afterwards.
#[derive(Clone, Debug, Serialize)]
pub struct PassReport {
    kind: PassKind,
    pages: u32,
    bytes_processed: u64,
    error_count: u64,
    read_failures: u64,
    write_failures: u64,
    #[serde(rename = "elapsed_secs", serialize_with = "secs_f64")]
    elapsed: Duration,
    throughput: Option<f64>,
    records: Vec<ErrorRecord>,
    dropped_records: u64,
    cancelled: bool,
}

fn secs_f64<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl PassReport {
    pub fn kind(&self) -> PassKind { self.kind }

    /// Pages the pass covered (including pages whose device operation failed).
    pub fn pages(&self) -> u32 { self.pages }

    pub fn bytes_processed(&self) -> u64 { self.bytes_processed }

    /// Content mismatches for read passes, failed writes for write passes.
    pub fn error_count(&self) -> u64 { self.error_count }

    pub fn read_failures(&self) -> u64 { self.read_failures }

    pub fn write_failures(&self) -> u64 { self.write_failures }

    pub fn elapsed(&self) -> Duration { self.elapsed }

    /// Bytes per second, `None` when no time elapsed.
    pub fn throughput(&self) -> Option<f64> { self.throughput }

    /// The first mismatches in pass order, capped; `error_count` stays exact.
    pub fn records(&self) -> &[ErrorRecord] { &self.records }

    pub fn dropped_records(&self) -> u64 { self.dropped_records }

    pub fn cancelled(&self) -> bool { self.cancelled }

    pub fn passed(&self) -> bool {
        !self.cancelled && self.error_count == 0 && self.read_failures == 0 && self.write_failures == 0
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} error(s), Data:{}kb, Time:{}ms, ",
            self.kind,
            self.error_count,
            self.bytes_processed / 1024,
            self.elapsed.as_millis()
        )?;
        match self.throughput {
            Some(t) => write!(f, "{:.2} kb/s", t / 1000.0)?,
            None => f.write_str("n/a kb/s")?,
        }
        if self.read_failures > 0 {
            write!(f, ", {} read failure(s)", self.read_failures)?;
        }
        if self.cancelled {
            f.write_str(" (cancelled)")?;
        }
        Ok(())
    }
}

pub(crate) fn throughput(bytes: u64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { Some(bytes as f64 / secs) } else { None }
}

/// Counters for a pass in progress.
pub(crate) struct PassStats {
    kind: PassKind,
    pages: u32,
    bytes: u64,
    errors: u64,
    read_failures: u64,
    write_failures: u64,
    records: Vec<ErrorRecord>,
    cap: usize,
    dropped: u64,
}

impl PassStats {
    pub(crate) fn new(kind: PassKind, cap: usize) -> Self {
        Self {
            kind,
            pages: 0,
            bytes: 0,
            errors: 0,
            read_failures: 0,
            write_failures: 0,
            records: Vec::new(),
            cap,
            dropped: 0,
        }
    }

    pub(crate) fn page_done(&mut self, page_size: u32) {
        self.pages = self.pages.saturating_add(1);
        self.bytes = self.bytes.saturating_add(page_size as u64);
    }

    pub(crate) fn mismatch(&mut self, rec: ErrorRecord) {
        self.errors = self.errors.saturating_add(1);
        if self.records.len() < self.cap {
            self.records.push(rec);
        } else {
            self.dropped = self.dropped.saturating_add(1);
        }
    }

    pub(crate) fn read_failure(&mut self) {
        self.read_failures = self.read_failures.saturating_add(1);
    }

    /// In write passes a failed write is the error being counted.
    pub(crate) fn write_failure(&mut self) {
        self.write_failures = self.write_failures.saturating_add(1);
        self.errors = self.errors.saturating_add(1);
    }

    pub(crate) fn finish(self, elapsed: Duration, cancelled: bool) -> PassReport {
        PassReport {
            kind: self.kind,
            pages: self.pages,
            bytes_processed: self.bytes,
            error_count: self.errors,
            read_failures: self.read_failures,
            write_failures: self.write_failures,
            elapsed,
            throughput: throughput(self.bytes, elapsed),
            records: self.records,
            dropped_records: self.dropped,
            cancelled,
        }
    }
}
