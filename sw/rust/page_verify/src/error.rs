//! Configuration errors. Device and content faults are counted in reports, never raised.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerifyError {
    /// Device reported an unusable geometry.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A pass asked for pages the device does not have.
    #[error("page range exceeded: requested {requested} page(s), device has {available}")]
    PageRangeExceeded {
        /// Pages requested by the caller.
        requested: u32,
        /// Pages on the device.
        available: u32,
    },
}

pub type Result<T> = std::result::Result<T, VerifyError>;
