//! Report and dump formatting.

use anyhow::Result;
use clap::ValueEnum;
use flash_core::PageGeometry;
use page_verify::{PassReport, PatternSpec};
use serde_json::json;

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// One summary line per pass plus recorded mismatches.
    #[default]
    Table,
    Json,
}

pub fn print_reports(format: OutputFormat, reports: &[PassReport]) -> Result<()> {
    match format {
        OutputFormat::Table => {
            for r in reports {
                println!("{}", r);
                for rec in r.records() {
                    println!("  Failed {}", rec);
                }
                if r.dropped_records() > 0 {
                    println!("  ... {} more mismatch(es) not recorded", r.dropped_records());
                }
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(reports)?),
    }
    Ok(())
}

pub fn print_info(format: OutputFormat, geom: PageGeometry, pattern: &PatternSpec, error_cap: usize) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("Geometry:");
            println!("- page_size:  {}", geom.page_size);
            println!("- page_count: {}", geom.page_count);
            println!("- capacity:   {} bytes ({}kb)", geom.capacity(), geom.capacity() / 1024);
            println!("Pattern:");
            println!("- default:    ramp (offset mod 256)");
            for (page, value) in pattern.constants() {
                println!("- page {:<6} constant {} (0x{:02X})", page, value, value);
            }
            println!("Report:");
            println!("- error_cap:  {}", error_cap);
        }
        OutputFormat::Json => {
            let v = json!({
                "page_size": geom.page_size,
                "page_count": geom.page_count,
                "capacity": geom.capacity(),
                "pattern": pattern,
                "error_cap": error_cap,
            });
            println!("{}", serde_json::to_string_pretty(&v)?);
        }
    }
    Ok(())
}

pub fn hexdump(start: usize, data: &[u8]) {
    for (n, line) in data.chunks(16).enumerate() {
        let ascii: String = line
            .iter()
            .map(|&b| if (0x20..=0x7E).contains(&b) { b as char } else { '.' })
            .collect();
        println!("{:08X}: {:<48} | {}", start + n * 16, spaced_hex(line), ascii);
    }
}

fn spaced_hex(line: &[u8]) -> String {
    line.iter().map(|b| hex::encode_upper([*b]) + " ").collect()
}
