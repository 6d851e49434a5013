//! Expected page contents.

use std::collections::BTreeMap;

use serde::Serialize;

/// First marker page of the default layout and its value.
pub const MARKER_PAGE_A: u32 = 2;
pub const MARKER_VALUE_A: u8 = 128 + 1;
/// Second marker page of the default layout and its value.
pub const MARKER_PAGE_B: u32 = 3;
pub const MARKER_VALUE_B: u8 = 170;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageRule {
    /// byte = offset mod 256
    Sequential,
    Constant(u8),
    /// Device-wide fill value, overrides every per-page rule.
    Fill(u8),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PatternSpec {
    constants: BTreeMap<u32, u8>,
    fill: Option<u8>,
}

impl Default for PatternSpec {
    /// Ramp on every page except the two marker pages.
    fn default() -> Self {
        Self::sequential()
            .with_constant(MARKER_PAGE_A, MARKER_VALUE_A)
            .with_constant(MARKER_PAGE_B, MARKER_VALUE_B)
    }
}

impl PatternSpec {
    pub fn sequential() -> Self {
        Self { constants: BTreeMap::new(), fill: None }
    }

    pub fn with_constant(mut self, page: u32, value: u8) -> Self {
        self.constants.insert(page, value);
        self
    }

    pub fn with_fill(mut self, value: u8) -> Self {
        self.fill = Some(value);
        self
    }

    pub fn constants(&self) -> impl Iterator<Item = (u32, u8)> + '_ {
        self.constants.iter().map(|(&p, &v)| (p, v))
    }

    pub fn rule_for(&self, page: u32) -> PageRule {
        if let Some(v) = self.fill {
            return PageRule::Fill(v);
        }
        match self.constants.get(&page) {
            Some(&v) => PageRule::Constant(v),
            None => PageRule::Sequential,
        }
    }

    pub fn expected_byte(&self, page: u32, offset: u32) -> u8 {
        match self.rule_for(page) {
            PageRule::Fill(v) | PageRule::Constant(v) => v,
            PageRule::Sequential => (offset % 256) as u8,
        }
    }

    pub fn fill_page(&self, page: u32, buf: &mut [u8]) {
        match self.rule_for(page) {
            PageRule::Fill(v) | PageRule::Constant(v) => buf.fill(v),
            PageRule::Sequential => {
                for (i, b) in buf.iter_mut().enumerate() {
                    *b = (i % 256) as u8;
                }
            }
        }
    }
}
