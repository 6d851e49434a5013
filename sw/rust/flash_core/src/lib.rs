use anyhow::{bail, Result};

/// Raw value a C-style driver returns from a byte read when no data came back.
pub const NO_DATA: i16 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageGeometry {
    pub page_size: u32,
    pub page_count: u32,
}

impl PageGeometry {
    pub fn new(page_size: u32, page_count: u32) -> Result<Self> {
        if page_size == 0 || page_count == 0 {
            bail!("page size and page count must be non-zero ({} x {})", page_size, page_count);
        }
        if page_size as u64 * page_count as u64 > u32::MAX as u64 + 1 {
            bail!("capacity {} x {} exceeds the 32-bit address space", page_size, page_count);
        }
        Ok(Self { page_size, page_count })
    }

    /// Total bytes; u64 because a full 4 GiB device does not fit in u32.
    pub fn capacity(&self) -> u64 { self.page_size as u64 * self.page_count as u64 }

    pub fn page_address(&self, page: u32) -> u32 { page.wrapping_mul(self.page_size) }

    pub fn byte_address(&self, page: u32, offset: u32) -> u32 {
        self.page_address(page).wrapping_add(offset)
    }

    pub fn contains(&self, addr: u32) -> bool { (addr as u64) < self.capacity() }

    /// Splits an address into (page, offset).
    pub fn locate(&self, addr: u32) -> (u32, u32) { (addr / self.page_size, addr % self.page_size) }
}

/// Narrow storage contract consumed by the verifier.
///
/// Failures are reported as `Err`; their cause is only logged by callers.
/// `read_byte` returning `Err` stands in for the driver's "no data" sentinel.
pub trait PagedStorage {
    fn geometry(&self) -> PageGeometry;
    fn write_page(&mut self, addr: u32, data: &[u8]) -> Result<()>;
    fn read_page(&mut self, addr: u32, buf: &mut [u8]) -> Result<()>;
    /// Returns the value the device echoed back.
    fn write_byte(&mut self, addr: u32, value: u8) -> Result<u8>;
    fn read_byte(&mut self, addr: u32) -> Result<u8>;
}

impl<T: PagedStorage + ?Sized> PagedStorage for &mut T {
    fn geometry(&self) -> PageGeometry { (**self).geometry() }
    fn write_page(&mut self, addr: u32, data: &[u8]) -> Result<()> { (**self).write_page(addr, data) }
    fn read_page(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> { (**self).read_page(addr, buf) }
    fn write_byte(&mut self, addr: u32, value: u8) -> Result<u8> { (**self).write_byte(addr, value) }
    fn read_byte(&mut self, addr: u32) -> Result<u8> { (**self).read_byte(addr) }
}

/// Maps a raw `i16` byte-read result (value in 0..=255 or [`NO_DATA`]) onto
/// the `read_byte` contract. Hardware adapters wrapping such drivers use this.
pub fn byte_from_raw(raw: i16) -> Result<u8> {
    match u8::try_from(raw) {
        Ok(b) => Ok(b),
        Err(_) if raw == NO_DATA => bail!("no data"),
        Err(_) => bail!("driver returned out-of-range byte {}", raw),
    }
}
