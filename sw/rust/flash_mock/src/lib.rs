use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Result};
use flash_core::{PageGeometry, PagedStorage};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    ReadPage(u32),
    WritePage(u32),
    ReadByte(u32),
    WriteByte(u32),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessStats {
    pub page_reads: u64,
    pub page_writes: u64,
    pub byte_reads: u64,
    pub byte_writes: u64,
}

/// EEPROM-like in-memory device: erased cells read 0xFF, writes overwrite.
pub struct MockStorage {
    geom: PageGeometry,
    mem: Vec<u8>,
    failing_page_reads: BTreeSet<u32>,
    failing_page_writes: BTreeSet<u32>,
    failing_byte_reads: BTreeSet<u32>,
    stuck: BTreeMap<u32, u8>,
    stats: AccessStats,
    log: Option<Vec<Access>>,
}

impl MockStorage {
    pub fn new(page_size: u32, page_count: u32) -> Result<Self> {
        let geom = PageGeometry::new(page_size, page_count)?;
        Ok(Self {
            geom,
            mem: vec![0xFF; geom.capacity() as usize],
            failing_page_reads: BTreeSet::new(),
            failing_page_writes: BTreeSet::new(),
            failing_byte_reads: BTreeSet::new(),
            stuck: BTreeMap::new(),
            stats: AccessStats::default(),
            log: None,
        })
    }

    pub fn fail_page_read(&mut self, page: u32) -> &mut Self { self.failing_page_reads.insert(page); self }
    pub fn fail_page_write(&mut self, page: u32) -> &mut Self { self.failing_page_writes.insert(page); self }
    pub fn fail_byte_read(&mut self, addr: u32) -> &mut Self { self.failing_byte_reads.insert(addr); self }

    /// Makes `addr` read back `value` on both the page and byte paths, whatever is written.
    pub fn stick_byte(&mut self, addr: u32, value: u8) -> &mut Self { self.stuck.insert(addr, value); self }

    pub fn clear_faults(&mut self) {
        self.failing_page_reads.clear();
        self.failing_page_writes.clear();
        self.failing_byte_reads.clear();
        self.stuck.clear();
    }

    pub fn record_accesses(&mut self) { self.log = Some(Vec::new()); }

    pub fn accesses(&self) -> &[Access] { self.log.as_deref().unwrap_or(&[]) }

    pub fn stats(&self) -> AccessStats { self.stats }

    pub fn contents(&self) -> &[u8] { &self.mem }

    pub fn erase(&mut self) { self.mem.fill(0xFF); }

    fn note(&mut self, access: Access) {
        match access {
            Access::ReadPage(_) => self.stats.page_reads += 1,
            Access::WritePage(_) => self.stats.page_writes += 1,
            Access::ReadByte(_) => self.stats.byte_reads += 1,
            Access::WriteByte(_) => self.stats.byte_writes += 1,
        }
        if let Some(log) = self.log.as_mut() { log.push(access); }
    }

    fn check_page_span(&self, addr: u32, len: usize) -> Result<()> {
        let end = addr as u64 + len as u64;
        if end > self.geom.capacity() { bail!("oob: 0x{:08X}+{}", addr, len); }
        let page_off = (addr % self.geom.page_size) as u64;
        if page_off + len as u64 > self.geom.page_size as u64 {
            bail!("access at 0x{:08X}+{} crosses a page boundary", addr, len);
        }
        Ok(())
    }

    fn cell(&self, addr: u32) -> u8 {
        self.stuck.get(&addr).copied().unwrap_or(self.mem[addr as usize])
    }
}

impl PagedStorage for MockStorage {
    fn geometry(&self) -> PageGeometry { self.geom }

    fn write_page(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.note(Access::WritePage(addr));
        self.check_page_span(addr, data.len())?;
        let (page, _) = self.geom.locate(addr);
        if self.failing_page_writes.contains(&page) { bail!("injected write failure on page {}", page); }
        let a = addr as usize;
        self.mem[a..a + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_page(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.note(Access::ReadPage(addr));
        self.check_page_span(addr, buf.len())?;
        let (page, _) = self.geom.locate(addr);
        if self.failing_page_reads.contains(&page) { bail!("injected read failure on page {}", page); }
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.cell(addr + i as u32);
        }
        Ok(())
    }

    fn write_byte(&mut self, addr: u32, value: u8) -> Result<u8> {
        self.note(Access::WriteByte(addr));
        if !self.geom.contains(addr) { bail!("oob: 0x{:08X}", addr); }
        self.mem[addr as usize] = value;
        Ok(self.cell(addr))
    }

    fn read_byte(&mut self, addr: u32) -> Result<u8> {
        self.note(Access::ReadByte(addr));
        if !self.geom.contains(addr) { bail!("oob: 0x{:08X}", addr); }
        if self.failing_byte_reads.contains(&addr) { bail!("no data at 0x{:08X}", addr); }
        Ok(self.cell(addr))
    }
}
