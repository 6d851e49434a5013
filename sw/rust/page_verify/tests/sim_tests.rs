#![cfg(feature = "mock")]
use flash_core::PagedStorage;
use flash_mock::{Access, MockStorage};
use page_verify::mock::*;
use page_verify::{CancelToken, PassKind, PatternSpec, VerificationEngine};

#[test]
fn write_then_verify_full_device() {
    let mut eng = new_mock(64, 512).unwrap();
    let w = eng.run_write_pass(None);
    assert_eq!(w.kind(), PassKind::PageWrite);
    assert_eq!(w.error_count(), 0);
    assert_eq!(w.bytes_processed(), 32768);

    let r = eng.run_read_verify_pass(512, None).unwrap();
    assert_eq!(r.error_count(), 0);
    assert_eq!(r.read_failures(), 0);
    assert_eq!(r.bytes_processed(), 32768);
    assert_eq!(r.pages(), 512);
    assert!(r.passed());
}

#[test]
fn written_layout_matches_default_pattern() {
    let mut eng = new_mock(64, 8).unwrap();
    eng.run_write_pass(None);
    let mem = eng.device().contents();
    assert!(mem[2 * 64..3 * 64].iter().all(|&b| b == 129));
    assert!(mem[3 * 64..4 * 64].iter().all(|&b| b == 170));
    for (i, &b) in mem[5 * 64..6 * 64].iter().enumerate() {
        assert_eq!(b, i as u8);
    }
}

#[test]
fn repeated_verify_is_idempotent() {
    let mut eng = new_mock(64, 16).unwrap();
    eng.run_write_pass(None);
    eng.device_mut().stick_byte(100, 0x00).stick_byte(700, 0x13);
    let a = eng.run_read_verify_pass(16, None).unwrap();
    let b = eng.run_read_verify_pass(16, None).unwrap();
    assert_eq!(a.error_count(), 2);
    assert_eq!(a.error_count(), b.error_count());
    assert_eq!(a.bytes_processed(), b.bytes_processed());
    assert_eq!(a.records(), b.records());
}

#[test]
fn override_fill_round_trip() {
    let page_size = 256u32;
    let pages = 8u32;
    let mut eng = new_mock(page_size, pages).unwrap();
    eng.run_write_pass(Some(85));
    let filled = eng.run_read_verify_pass(pages, Some(85)).unwrap();
    assert_eq!(filled.error_count(), 0);

    // Against the default pattern every byte mismatches except where the ramp hits 85.
    let r = eng.run_read_verify_pass(pages, None).unwrap();
    let ramp_pages = pages as u64 - 2;
    let expected = ramp_pages * (page_size as u64 - 1) + 2 * page_size as u64;
    assert_eq!(r.error_count(), expected);
}

#[test]
fn override_on_verify_does_not_leak_into_next_pass() {
    let mut eng = new_mock(32, 8).unwrap();
    eng.run_write_pass(None);
    let with_override = eng.run_read_verify_pass(8, Some(0)).unwrap();
    assert!(with_override.error_count() > 0);
    let plain = eng.run_read_verify_pass(8, None).unwrap();
    assert_eq!(plain.error_count(), 0);
}

#[test]
fn byte_and_page_paths_agree() {
    let mut eng = new_mock(64, 32).unwrap();
    eng.run_write_pass(None);
    eng.device_mut().stick_byte(3 * 64 + 9, 0).stick_byte(20 * 64, 0xEE).stick_byte(31 * 64 + 63, 1);
    let page = eng.run_read_verify_pass(32, None).unwrap();
    let byte = eng.run_byte_read_verify_pass(32).unwrap();
    assert_eq!(byte.kind(), PassKind::ByteReadVerify);
    assert_eq!(page.error_count(), 3);
    assert_eq!(page.error_count(), byte.error_count());
    assert_eq!(page.records(), byte.records());
    assert_eq!(page.bytes_processed(), byte.bytes_processed());
}

#[test]
fn failed_page_read_is_counted_separately() {
    let mut eng = new_mock(64, 32).unwrap();
    eng.run_write_pass(None);
    // One wrong byte per page.
    for p in 0..20u32 {
        eng.device_mut().stick_byte(p * 64 + 1, 0xAA);
    }
    eng.device_mut().fail_page_read(10);

    let r = eng.run_read_verify_pass(20, None).unwrap();
    assert_eq!(r.read_failures(), 1);
    // Page 3 is constant 170 (0xAA), so its stuck byte matches.
    assert_eq!(r.error_count(), 18);
    assert!(r.records().iter().all(|rec| rec.page != 10));
    assert_eq!(r.bytes_processed(), 20 * 64);
}

#[test]
fn byte_read_no_data_is_not_compared() {
    let mut eng = new_mock(16, 4).unwrap();
    eng.run_write_pass(None);
    eng.device_mut().fail_byte_read(5).fail_byte_read(6);
    let r = eng.run_byte_read_verify_pass(4).unwrap();
    assert_eq!(r.read_failures(), 2);
    assert_eq!(r.error_count(), 0);
    assert!(!r.passed());
}

#[test]
fn write_failures_do_not_stop_the_sweep() {
    let mut eng = new_mock(16, 8).unwrap();
    eng.device_mut().fail_page_write(1).fail_page_write(6);
    let w = eng.run_write_pass(None);
    assert_eq!(w.error_count(), 2);
    assert_eq!(w.write_failures(), 2);
    assert_eq!(w.bytes_processed(), 128);
    assert_eq!(eng.device().stats().page_writes, 8);

    // Unwritten pages are still erased and show up as mismatches.
    let r = eng.run_read_verify_pass(8, None).unwrap();
    assert_eq!(r.error_count(), 2 * 16);
}

#[test]
fn passes_visit_pages_and_bytes_in_order() {
    let mut eng = new_mock(4, 3).unwrap();
    eng.device_mut().record_accesses();
    eng.run_write_pass(None);
    eng.run_read_verify_pass(3, None).unwrap();
    eng.run_byte_read_verify_pass(2).unwrap();
    let log = eng.device().accesses();
    let mut expected: Vec<Access> = (0..3).map(|p| Access::WritePage(p * 4)).collect();
    expected.extend((0..3).map(|p| Access::ReadPage(p * 4)));
    expected.extend((0..8).map(Access::ReadByte));
    assert_eq!(log, &expected[..]);
}

#[test]
fn byte_write_pass_then_read_back() {
    let mut eng = new_mock(64, 8).unwrap();
    let w = eng.run_byte_write_pass(2, 129).unwrap();
    assert_eq!(w.kind(), PassKind::ByteWrite);
    assert!(w.passed());
    for i in 0..64u32 {
        assert_eq!(eng.device_mut().read_byte(2 * 64 + i).unwrap(), 129u8.wrapping_add(i as u8));
    }
    assert_eq!(eng.device().stats().byte_writes, 64);
}

#[test]
fn cancelled_before_start_issues_nothing() {
    let token = CancelToken::new();
    let dev = MockStorage::new(64, 16).unwrap();
    let mut eng = VerificationEngine::new(dev, PatternSpec::default()).unwrap().with_cancel_token(token.clone());
    token.cancel();
    let w = eng.run_write_pass(None);
    assert!(w.cancelled());
    assert_eq!(w.pages(), 0);
    assert_eq!(w.bytes_processed(), 0);
    let r = eng.run_read_verify_pass(16, None).unwrap();
    assert!(r.cancelled());
    assert!(!r.passed());
    assert_eq!(eng.device().stats(), Default::default());

    token.reset();
    assert!(eng.run_write_pass(None).passed());
}

/// Sets the token while it is handling the page at `trip_addr`.
struct CancelAt {
    inner: MockStorage,
    token: CancelToken,
    trip_addr: u32,
}

impl CancelAt {
    fn trip(&self, addr: u32) {
        if addr == self.trip_addr {
            self.token.cancel();
        }
    }
}

impl PagedStorage for CancelAt {
    fn geometry(&self) -> flash_core::PageGeometry { self.inner.geometry() }
    fn write_page(&mut self, addr: u32, data: &[u8]) -> anyhow::Result<()> {
        self.trip(addr);
        self.inner.write_page(addr, data)
    }
    fn read_page(&mut self, addr: u32, buf: &mut [u8]) -> anyhow::Result<()> {
        self.trip(addr);
        self.inner.read_page(addr, buf)
    }
    fn write_byte(&mut self, addr: u32, value: u8) -> anyhow::Result<u8> { self.inner.write_byte(addr, value) }
    fn read_byte(&mut self, addr: u32) -> anyhow::Result<u8> {
        self.trip(addr);
        self.inner.read_byte(addr)
    }
}

fn cancelling_engine(trip_page: u32) -> (VerificationEngine<CancelAt>, CancelToken) {
    let token = CancelToken::new();
    let dev = CancelAt { inner: MockStorage::new(64, 16).unwrap(), token: token.clone(), trip_addr: trip_page * 64 };
    let eng = VerificationEngine::new(dev, PatternSpec::default()).unwrap().with_cancel_token(token.clone());
    (eng, token)
}

#[test]
fn cancel_mid_write_stops_at_next_page_boundary() {
    let (mut eng, _token) = cancelling_engine(3);
    let w = eng.run_write_pass(None);
    assert!(w.cancelled());
    assert_eq!(w.pages(), 4);
    assert_eq!(w.bytes_processed(), 4 * 64);
    assert_eq!(eng.device().inner.stats().page_writes, 4);
    assert!(eng.device().inner.contents()[4 * 64..].iter().all(|&b| b == 0xFF));
}

#[test]
fn cancel_mid_read_verify_stops_at_next_page_boundary() {
    let (mut eng, token) = cancelling_engine(5);
    eng.device_mut().trip_addr = u32::MAX;
    assert!(eng.run_write_pass(None).passed());

    eng.device_mut().trip_addr = 5 * 64;
    let r = eng.run_read_verify_pass(16, None).unwrap();
    assert!(r.cancelled());
    assert_eq!(r.pages(), 6);
    assert_eq!(r.bytes_processed(), 6 * 64);
    assert_eq!(r.error_count(), 0);
    assert_eq!(eng.device().inner.stats().page_reads, 6);

    // The byte path finishes the page it was cancelled in, then stops.
    token.reset();
    let b = eng.run_byte_read_verify_pass(16).unwrap();
    assert!(b.cancelled());
    assert_eq!(b.pages(), 6);
    assert_eq!(eng.device().inner.stats().byte_reads, 6 * 64);
}

#[test]
fn record_cap_bounds_retained_mismatches() {
    let dev = MockStorage::new(64, 4).unwrap();
    let mut eng = VerificationEngine::new(dev, PatternSpec::default()).unwrap().with_record_cap(5);
    // Erased device: no expected byte is 0xFF with 64-byte pages.
    let r = eng.run_read_verify_pass(4, None).unwrap();
    assert_eq!(r.error_count(), 256);
    assert_eq!(r.records().len(), 5);
    assert_eq!(r.dropped_records(), 251);
    let first = r.records()[0];
    assert_eq!((first.page, first.offset, first.actual, first.expected), (0, 0, 0xFF, 0));
}

#[test]
fn engine_borrows_device() {
    let mut dev = MockStorage::new(32, 4).unwrap();
    {
        let mut eng = VerificationEngine::new(&mut dev, PatternSpec::sequential()).unwrap();
        assert!(eng.run_write_pass(None).passed());
    }
    assert_eq!(dev.contents()[2 * 32 + 7], 7);
}

#[test]
fn report_serializes_to_json() {
    let mut eng = new_mock(16, 2).unwrap();
    let r = eng.run_read_verify_pass(2, Some(0xFF)).unwrap();
    let v = serde_json::to_value(&r).unwrap();
    assert_eq!(v["kind"], "page-read-verify");
    assert_eq!(v["error_count"], 0);
    assert_eq!(v["bytes_processed"], 32);
}
