mod config;
mod output;

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use flash_core::PagedStorage;
use flash_mock::MockStorage;
use page_verify::pattern::{MARKER_PAGE_A, MARKER_VALUE_A};
use page_verify::{CancelToken, PassReport, VerificationEngine};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Settings;
use output::OutputFormat;

/// Pages shown by `dump` when no count is given.
const DEFAULT_DUMP_PAGES: u32 = 4;

/// Fill value of the write/verify cycle: 0b0101_0101.
const DEFAULT_FILL: u8 = 1 + 4 + 16 + 64;

type Engine = VerificationEngine<MockStorage>;

#[derive(Parser, Debug)]
#[command(name = "flash_verify", version, about = "Pattern write / read-verify passes over a simulated paged device", disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,

    /// Page size in bytes [default: 64]
    #[arg(long, global = true)]
    page_size: Option<u32>,
    /// Number of pages [default: 512]
    #[arg(long, global = true)]
    page_count: Option<u32>,
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Mismatch records kept per pass [default: 64]
    #[arg(long, global = true)]
    error_cap: Option<usize>,
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
    /// Make page reads of this page fail (repeatable)
    #[arg(long, global = true, value_parser = parse_u32)]
    fail_read_page: Vec<u32>,
    /// Make page writes of this page fail (repeatable)
    #[arg(long, global = true, value_parser = parse_u32)]
    fail_write_page: Vec<u32>,
    /// Pin a byte to a value, ADDR=VALUE (repeatable)
    #[arg(long, global = true, value_parser = parse_stuck)]
    stuck: Vec<(u32, u8)>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print geometry and pattern layout
    Info,
    /// Write every page with the pattern, or with one fill value
    Write {
        #[arg(long, value_parser = parse_u8)]
        fill: Option<u8>,
    },
    /// Write, then read back whole pages and compare
    Verify {
        /// Pages to verify [default: all]
        #[arg(long, value_parser = parse_u32)]
        pages: Option<u32>,
        /// Expect this value on every byte (the write pass fills with it)
        #[arg(long, value_parser = parse_u8)]
        expect: Option<u8>,
        /// Verify the device as it is, without writing first
        #[arg(long)]
        no_write: bool,
    },
    /// Write, then read back one byte at a time and compare
    VerifyBytes {
        #[arg(long, value_parser = parse_u32)]
        pages: Option<u32>,
        #[arg(long)]
        no_write: bool,
    },
    /// Write one page byte by byte with an incrementing value
    WriteBytes {
        #[arg(long, value_parser = parse_u32, default_value_t = MARKER_PAGE_A)]
        page: u32,
        #[arg(long, value_parser = parse_u8, default_value_t = MARKER_VALUE_A)]
        start: u8,
    },
    /// Fill write, fill verify, pattern write, pattern verify
    Cycle {
        #[arg(long, value_parser = parse_u8, default_value_t = DEFAULT_FILL)]
        fill: u8,
    },
    /// Write the pattern, then hexdump pages
    Dump {
        #[arg(long, value_parser = parse_u32, default_value_t = 0)]
        page: u32,
        #[arg(long, value_parser = parse_u32, default_value_t = DEFAULT_DUMP_PAGES)]
        count: u32,
    },
    /// Interactive shell over one persistent device
    Repl,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    run_cli(cli)
}

fn run_cli(cli: Cli) -> Result<()> {
    let file = cli.config.as_deref().map(config::load).transpose()?;
    let settings = Settings::resolve(file, cli.page_size, cli.page_count, cli.error_cap);

    let token = CancelToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        info!("interrupt received, stopping at the next page boundary");
        handler_token.cancel();
    })?;

    let mut eng = build_engine(&settings, token.clone())?;
    for &p in &cli.fail_read_page {
        eng.device_mut().fail_page_read(p);
    }
    for &p in &cli.fail_write_page {
        eng.device_mut().fail_page_write(p);
    }
    for &(addr, value) in &cli.stuck {
        eng.device_mut().stick_byte(addr, value);
    }

    let reports = match cli.cmd {
        Command::Info => {
            return output::print_info(cli.format, eng.geometry(), eng.pattern(), settings.error_cap);
        }
        Command::Write { fill } => vec![eng.run_write_pass(fill)],
        Command::Verify { pages, expect, no_write } => verify(&mut eng, pages, expect, !no_write)?,
        Command::VerifyBytes { pages, no_write } => verify_bytes(&mut eng, pages, !no_write)?,
        Command::WriteBytes { page, start } => vec![eng.run_byte_write_pass(page, start)?],
        Command::Cycle { fill } => cycle(&mut eng, fill)?,
        Command::Dump { page, count } => {
            let w = eng.run_write_pass(None);
            dump(&mut eng, page, count)?;
            vec![w]
        }
        Command::Repl => return repl(eng, &settings, cli.format, token),
    };

    output::print_reports(cli.format, &reports)?;
    ensure_passed(&reports)
}

fn build_engine(settings: &Settings, token: CancelToken) -> Result<Engine> {
    let dev = MockStorage::new(settings.page_size, settings.page_count)?;
    Ok(VerificationEngine::new(dev, settings.pattern.clone())?
        .with_record_cap(settings.error_cap)
        .with_cancel_token(token))
}

fn ensure_passed(reports: &[PassReport]) -> Result<()> {
    let failed = reports.iter().filter(|r| !r.passed()).count();
    if failed > 0 {
        bail!("{} of {} pass(es) reported errors", failed, reports.len());
    }
    Ok(())
}

fn verify(eng: &mut Engine, pages: Option<u32>, expect: Option<u8>, write_first: bool) -> Result<Vec<PassReport>> {
    let pages = pages.unwrap_or(eng.geometry().page_count);
    eng.check_pages(pages)?;
    let mut reports = Vec::new();
    if write_first {
        let w = eng.run_write_pass(expect);
        let stop = w.cancelled();
        reports.push(w);
        if stop {
            return Ok(reports);
        }
    }
    reports.push(eng.run_read_verify_pass(pages, expect)?);
    Ok(reports)
}

fn verify_bytes(eng: &mut Engine, pages: Option<u32>, write_first: bool) -> Result<Vec<PassReport>> {
    let pages = pages.unwrap_or(eng.geometry().page_count);
    eng.check_pages(pages)?;
    let mut reports = Vec::new();
    if write_first {
        let w = eng.run_write_pass(None);
        let stop = w.cancelled();
        reports.push(w);
        if stop {
            return Ok(reports);
        }
    }
    reports.push(eng.run_byte_read_verify_pass(pages)?);
    Ok(reports)
}

/// An interrupt ends the cycle after the pass it landed in.
fn cycle(eng: &mut Engine, fill: u8) -> Result<Vec<PassReport>> {
    let pages = eng.geometry().page_count;
    let mut reports = Vec::with_capacity(4);
    for step in 0..4 {
        let report = match step {
            0 => eng.run_write_pass(Some(fill)),
            1 => eng.run_read_verify_pass(pages, Some(fill))?,
            2 => eng.run_write_pass(None),
            _ => eng.run_read_verify_pass(pages, None)?,
        };
        let stop = report.cancelled();
        reports.push(report);
        if stop {
            break;
        }
    }
    Ok(reports)
}

fn dump(eng: &mut Engine, page: u32, count: u32) -> Result<()> {
    let geom = eng.geometry();
    if page as u64 + count as u64 > geom.page_count as u64 {
        bail!("pages {}..{} outside device ({} pages)", page, page as u64 + count as u64, geom.page_count);
    }
    let mut buf = vec![0u8; geom.page_size as usize];
    for p in page..page + count {
        let addr = geom.page_address(p);
        eng.device_mut().read_page(addr, &mut buf)?;
        output::hexdump(addr as usize, &buf);
    }
    Ok(())
}

fn repl(mut eng: Engine, settings: &Settings, format: OutputFormat, token: CancelToken) -> Result<()> {
    let mut rl = rustyline::DefaultEditor::new()?;
    println!("Paged device verifier REPL. Type 'help' or 'quit'.");
    loop {
        let line = match rl.readline("verify> ") {
            Ok(s) => s,
            Err(_) => break,
        };
        let line = line.trim();
        if line.is_empty() { continue; }
        rl.add_history_entry(line).ok();
        token.reset();
        match handle_repl_line(&mut eng, line, settings, format) {
            Ok(Control::Continue) => {}
            Ok(Control::Quit) => break,
            Err(e) => eprintln!("error: {}", e),
        }
        io::stdout().flush().ok();
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Control { Continue, Quit }

fn handle_repl_line(eng: &mut Engine, line: &str, settings: &Settings, format: OutputFormat) -> Result<Control> {
    let parts = shellwords(line);
    if parts.is_empty() { return Ok(Control::Continue); }
    let arg = |i: usize| parts.get(i).copied();
    let reports = match parts[0] {
        "help" => {
            println!("commands: info, write [fill], verify [pages] [expect], verify-bytes [pages], write-bytes [page] [start], cycle [fill], dump [page] [count],");
            println!("          fail-read <page>, fail-write <page>, stuck <addr> <value>, clear-faults, erase, quit");
            return Ok(Control::Continue);
        }
        "quit" | "exit" => return Ok(Control::Quit),
        "info" => {
            output::print_info(format, eng.geometry(), eng.pattern(), settings.error_cap)?;
            return Ok(Control::Continue);
        }
        "write" => vec![eng.run_write_pass(arg(1).map(parse_u8).transpose()?)],
        "verify" => {
            let pages = arg(1).map(parse_u32).transpose()?.unwrap_or(eng.geometry().page_count);
            let expect = arg(2).map(parse_u8).transpose()?;
            vec![eng.run_read_verify_pass(pages, expect)?]
        }
        "verify-bytes" => {
            let pages = arg(1).map(parse_u32).transpose()?.unwrap_or(eng.geometry().page_count);
            vec![eng.run_byte_read_verify_pass(pages)?]
        }
        "write-bytes" => {
            let page = arg(1).map(parse_u32).transpose()?.unwrap_or(MARKER_PAGE_A);
            let start = arg(2).map(parse_u8).transpose()?.unwrap_or(MARKER_VALUE_A);
            vec![eng.run_byte_write_pass(page, start)?]
        }
        "cycle" => cycle(eng, arg(1).map(parse_u8).transpose()?.unwrap_or(DEFAULT_FILL))?,
        "dump" => {
            let page = arg(1).map(parse_u32).transpose()?.unwrap_or(0);
            let count = arg(2).map(parse_u32).transpose()?.unwrap_or(DEFAULT_DUMP_PAGES);
            dump(eng, page, count)?;
            return Ok(Control::Continue);
        }
        "fail-read" => {
            let page = parse_u32(arg(1).ok_or_else(|| anyhow!("usage: fail-read <page>"))?)?;
            eng.device_mut().fail_page_read(page);
            println!("ok");
            return Ok(Control::Continue);
        }
        "fail-write" => {
            let page = parse_u32(arg(1).ok_or_else(|| anyhow!("usage: fail-write <page>"))?)?;
            eng.device_mut().fail_page_write(page);
            println!("ok");
            return Ok(Control::Continue);
        }
        "stuck" => {
            if parts.len() < 3 { bail!("usage: stuck <addr> <value>"); }
            let (addr, value) = (parse_u32(parts[1])?, parse_u8(parts[2])?);
            eng.device_mut().stick_byte(addr, value);
            println!("ok");
            return Ok(Control::Continue);
        }
        "clear-faults" => {
            eng.device_mut().clear_faults();
            println!("ok");
            return Ok(Control::Continue);
        }
        "erase" => {
            eng.device_mut().erase();
            println!("erased");
            return Ok(Control::Continue);
        }
        other => bail!("unknown command {}", other),
    };
    output::print_reports(format, &reports)?;
    Ok(Control::Continue)
}

fn parse_u32(s: &str) -> Result<u32> {
    if let Some(rest) = s.strip_prefix("0x") { u32::from_str_radix(rest, 16).map_err(|_| anyhow!("invalid u32: {}", s)) }
    else { s.parse::<u32>().map_err(|_| anyhow!("invalid u32: {}", s)) }
}

fn parse_u8(s: &str) -> Result<u8> {
    if let Some(rest) = s.strip_prefix("0x") { u8::from_str_radix(rest, 16).map_err(|_| anyhow!("invalid u8: {}", s)) }
    else { s.parse::<u8>().map_err(|_| anyhow!("invalid u8: {}", s)) }
}

fn parse_stuck(s: &str) -> Result<(u32, u8)> {
    let (addr, value) = s.split_once('=').ok_or_else(|| anyhow!("expected ADDR=VALUE, got {}", s))?;
    Ok((parse_u32(addr.trim())?, parse_u8(value.trim())?))
}

fn shellwords(s: &str) -> Vec<&str> {
    s.split_whitespace().collect()
}
