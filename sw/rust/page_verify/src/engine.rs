use std::borrow::Cow;
use std::time::Instant;

use flash_core::{PageGeometry, PagedStorage};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{Result, VerifyError};
use crate::pattern::PatternSpec;
use crate::report::{ErrorRecord, PassKind, PassReport, PassStats, DEFAULT_RECORD_CAP};

/// Drives write and read-verify sweeps over a device it owns exclusively.
///
/// Pages are visited in increasing order and offsets within a page in
/// increasing order, so mismatch records come out in the same order on every
/// run. Device failures and content mismatches are counted in the returned
/// [`PassReport`]; only invalid page ranges are returned as errors.
pub struct VerificationEngine<D: PagedStorage> {
    device: D,
    geom: PageGeometry,
    pattern: PatternSpec,
    record_cap: usize,
    cancel: Option<CancelToken>,
}

impl<D: PagedStorage> VerificationEngine<D> {
    pub fn new(device: D, pattern: PatternSpec) -> Result<Self> {
        let g = device.geometry();
        let geom = PageGeometry::new(g.page_size, g.page_count)
            .map_err(|e| VerifyError::InvalidGeometry(e.to_string()))?;
        Ok(Self { device, geom, pattern, record_cap: DEFAULT_RECORD_CAP, cancel: None })
    }

    pub fn with_record_cap(mut self, cap: usize) -> Self {
        self.record_cap = cap;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn geometry(&self) -> PageGeometry { self.geom }
    pub fn pattern(&self) -> &PatternSpec { &self.pattern }
    pub fn device(&self) -> &D { &self.device }
    pub fn device_mut(&mut self) -> &mut D { &mut self.device }

    /// Writes every page with its expected content, or with `fill` on every byte.
    /// A failed page write is counted and the sweep moves on.
    pub fn run_write_pass(&mut self, fill: Option<u8>) -> PassReport {
        let pattern = match fill {
            Some(v) => Cow::Owned(self.pattern.clone().with_fill(v)),
            None => Cow::Borrowed(&self.pattern),
        };
        let page_size = self.geom.page_size;
        let mut stats = PassStats::new(PassKind::PageWrite, self.record_cap);
        let mut buf = vec![0u8; page_size as usize];
        let mut cancelled = false;
        let start = Instant::now();

        for p in 0..self.geom.page_count {
            if stop_requested(&self.cancel) {
                cancelled = true;
                break;
            }
            if p % 10 == 0 {
                debug!(page = p, "writing page");
            }
            pattern.fill_page(p, &mut buf);
            if let Err(e) = self.device.write_page(self.geom.page_address(p), &buf) {
                warn!(page = p, error = %e, "page write failed");
                stats.write_failure();
            }
            stats.page_done(page_size);
        }

        finish(stats, start, cancelled)
    }

    /// Reads `pages` pages whole and compares them with the pattern, or with
    /// `expected` on every byte when given. `expected` applies to this pass only.
    pub fn run_read_verify_pass(&mut self, pages: u32, expected: Option<u8>) -> Result<PassReport> {
        self.check_pages(pages)?;
        let page_size = self.geom.page_size;
        let mut stats = PassStats::new(PassKind::PageReadVerify, self.record_cap);
        let mut buf = vec![0u8; page_size as usize];
        let mut cancelled = false;
        let start = Instant::now();

        for p in 0..pages {
            if stop_requested(&self.cancel) {
                cancelled = true;
                break;
            }
            read_progress(p);
            match self.device.read_page(self.geom.page_address(p), &mut buf) {
                Ok(()) => {
                    for (i, &actual) in buf.iter().enumerate() {
                        check_byte(&mut stats, &self.pattern, expected, p, i as u32, actual);
                    }
                }
                Err(e) => {
                    warn!(page = p, error = %e, "page read failed");
                    stats.read_failure();
                }
            }
            stats.page_done(page_size);
        }

        Ok(finish(stats, start, cancelled))
    }

    /// Same comparison as [`run_read_verify_pass`](Self::run_read_verify_pass)
    /// through the device's single-byte read path.
    pub fn run_byte_read_verify_pass(&mut self, pages: u32) -> Result<PassReport> {
        self.run_byte_read_verify_pass_with(pages, None)
    }

    pub fn run_byte_read_verify_pass_with(&mut self, pages: u32, expected: Option<u8>) -> Result<PassReport> {
        self.check_pages(pages)?;
        let page_size = self.geom.page_size;
        let mut stats = PassStats::new(PassKind::ByteReadVerify, self.record_cap);
        let mut cancelled = false;
        let start = Instant::now();

        for p in 0..pages {
            if stop_requested(&self.cancel) {
                cancelled = true;
                break;
            }
            read_progress(p);
            for offset in 0..page_size {
                let addr = self.geom.byte_address(p, offset);
                match self.device.read_byte(addr) {
                    Ok(actual) => check_byte(&mut stats, &self.pattern, expected, p, offset, actual),
                    Err(e) => {
                        warn!(page = p, offset, error = %e, "byte read failed");
                        stats.read_failure();
                    }
                }
            }
            stats.page_done(page_size);
        }

        Ok(finish(stats, start, cancelled))
    }

    /// Writes `page` one byte at a time with `first_value + offset` (wrapping).
    /// A device error or an echo that differs from the written value is a write failure.
    pub fn run_byte_write_pass(&mut self, page: u32, first_value: u8) -> Result<PassReport> {
        self.check_pages(page.saturating_add(1))?;
        let page_size = self.geom.page_size;
        let mut stats = PassStats::new(PassKind::ByteWrite, self.record_cap);
        let start = Instant::now();

        if stop_requested(&self.cancel) {
            return Ok(finish(stats, start, true));
        }
        debug!(page, "writing page byte by byte");
        for offset in 0..page_size {
            let addr = self.geom.byte_address(page, offset);
            let value = first_value.wrapping_add(offset as u8);
            match self.device.write_byte(addr, value) {
                Ok(echo) if echo == value => {}
                Ok(echo) => {
                    warn!(page, offset, value, echo, "byte write echoed a different value");
                    stats.write_failure();
                }
                Err(e) => {
                    warn!(page, offset, error = %e, "byte write failed");
                    stats.write_failure();
                }
            }
        }
        stats.page_done(page_size);

        Ok(finish(stats, start, false))
    }

    /// Fails when `pages` is more than the device holds.
    pub fn check_pages(&self, pages: u32) -> Result<()> {
        if pages > self.geom.page_count {
            return Err(VerifyError::PageRangeExceeded { requested: pages, available: self.geom.page_count });
        }
        Ok(())
    }
}

fn stop_requested(token: &Option<CancelToken>) -> bool {
    token.as_ref().is_some_and(CancelToken::is_cancelled)
}

fn read_progress(page: u32) {
    if page % 50 == 0 || page < 5 {
        debug!(page, "reading page");
    }
}

fn check_byte(stats: &mut PassStats, pattern: &PatternSpec, expected: Option<u8>, page: u32, offset: u32, actual: u8) {
    let expected = expected.unwrap_or_else(|| pattern.expected_byte(page, offset));
    if actual != expected {
        debug!(page, offset, actual, expected, "mismatch");
        stats.mismatch(ErrorRecord { page, offset, actual, expected });
    }
}

fn finish(stats: PassStats, start: Instant, cancelled: bool) -> PassReport {
    let report = stats.finish(start.elapsed(), cancelled);
    if cancelled {
        warn!(pages = report.pages(), "{} cancelled", report.kind());
    }
    info!("{}", report);
    report
}
