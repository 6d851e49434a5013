//! Pattern write and read-verify passes over page-addressable storage.
//!
//! A [`VerificationEngine`] owns a [`flash_core::PagedStorage`] device, writes
//! the pages described by a [`PatternSpec`], reads them back through the page
//! or the single-byte path, and returns a [`PassReport`] per pass.

pub mod cancel;
pub mod engine;
pub mod error;
pub mod pattern;
pub mod report;

pub use cancel::CancelToken;
pub use engine::VerificationEngine;
pub use error::{Result, VerifyError};
pub use pattern::{PageRule, PatternSpec};
pub use report::{ErrorRecord, PassKind, PassReport, DEFAULT_RECORD_CAP};

#[cfg(feature = "mock")]
pub mod mock {
    use super::*;
    use flash_mock::MockStorage;

    /// Engine over a fresh simulated device with the default pattern.
    pub fn new_mock(page_size: u32, page_count: u32) -> anyhow::Result<VerificationEngine<MockStorage>> {
        let dev = MockStorage::new(page_size, page_count)?;
        Ok(VerificationEngine::new(dev, PatternSpec::default())?)
    }
}
