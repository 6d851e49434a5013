//! Optional TOML configuration; command-line flags take precedence.
//!
//! ```toml
//! [device]
//! page_size = 64
//! page_count = 512
//!
//! [pattern]
//! sequential = false          # true drops the default marker pages
//! constants = [{ page = 7, value = 0x5A }]
//!
//! [report]
//! error_cap = 64
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use page_verify::{PatternSpec, DEFAULT_RECORD_CAP};
use serde::Deserialize;

pub const DEFAULT_PAGE_SIZE: u32 = 64;
pub const DEFAULT_PAGE_COUNT: u32 = 512;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub device: DeviceSection,
    pub pattern: PatternSection,
    pub report: ReportSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceSection {
    pub page_size: Option<u32>,
    pub page_count: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PatternSection {
    pub sequential: bool,
    pub constants: Vec<ConstantPage>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstantPage {
    pub page: u32,
    pub value: u8,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportSection {
    pub error_cap: Option<usize>,
}

impl PatternSection {
    pub fn to_spec(&self) -> PatternSpec {
        let base = if self.sequential { PatternSpec::sequential() } else { PatternSpec::default() };
        self.constants.iter().fold(base, |spec, c| spec.with_constant(c.page, c.value))
    }
}

pub fn load(path: &Path) -> Result<FileConfig> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse(&text).with_context(|| format!("parsing {}", path.display()))
}

pub fn parse(text: &str) -> Result<FileConfig> {
    Ok(toml::from_str(text)?)
}

/// Values after merging flags over the file over built-in defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub page_size: u32,
    pub page_count: u32,
    pub pattern: PatternSpec,
    pub error_cap: usize,
}

impl Settings {
    pub fn resolve(
        file: Option<FileConfig>,
        page_size: Option<u32>,
        page_count: Option<u32>,
        error_cap: Option<usize>,
    ) -> Self {
        let file = file.unwrap_or_default();
        Settings {
            page_size: page_size.or(file.device.page_size).unwrap_or(DEFAULT_PAGE_SIZE),
            page_count: page_count.or(file.device.page_count).unwrap_or(DEFAULT_PAGE_COUNT),
            pattern: file.pattern.to_spec(),
            error_cap: error_cap.or(file.report.error_cap).unwrap_or(DEFAULT_RECORD_CAP),
        }
    }
}
