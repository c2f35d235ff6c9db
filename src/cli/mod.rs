mod daemon;
mod doctor;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveDateTime};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info, warn};

use crate::core::config::{self, Config};
use crate::core::cycle::{CycleOutcome, MonitorCycle};
use crate::core::store::SheetsConnector;
use crate::core::terminal::{self, GuideSection, print_error, print_success};

/// Per-request bound for store HTTP calls.
pub(crate) const STORE_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Commands")
        .command("run", "Start the scheduled monitor (foreground)")
        .command("once", "Run a single survey-and-record cycle")
        .command("check", "Validate the configuration and print a summary")
        .command("doctor", "Check the search command, config and credentials")
        .command("help", "Show this help")
        .print();

    GuideSection::new("Options")
        .command("--config <path>", "Configuration file (env RANKMON_CONFIG, default ./config.json)")
        .command("--log-file <path>", "Also append log lines to this file")
        .command("--verbose, -v", "Debug-level logging")
        .command("--no-initial-run", "run: wait for the first scheduled trigger")
        .command("--dry-run", "once: survey and log ranks without touching the sheet")
        .command("--at <date>", "once: record against YYYY-MM-DD[ HH:MM] instead of now")
        .print();

    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("rankmon").green()
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CliCommand {
    Run,
    Once,
    Check,
    Doctor,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CliArgs {
    pub command: CliCommand,
    pub config: Option<String>,
    pub log_file: Option<PathBuf>,
    pub verbose: bool,
    pub no_initial_run: bool,
    pub dry_run: bool,
    pub at: Option<NaiveDateTime>,
}

pub(crate) fn parse_cli_args(args: &[String]) -> Result<CliArgs> {
    let command = match args.get(1).map(String::as_str) {
        None | Some("help") | Some("--help") | Some("-h") => CliCommand::Help,
        Some("run") => CliCommand::Run,
        Some("once") => CliCommand::Once,
        Some("check") => CliCommand::Check,
        Some("doctor") => CliCommand::Doctor,
        Some(other) => bail!("Unknown command: {}", other),
    };

    let mut parsed = CliArgs {
        command,
        config: None,
        log_file: None,
        verbose: false,
        no_initial_run: false,
        dry_run: false,
        at: None,
    };

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                parsed.config = Some(flag_value(args, i)?.to_string());
                i += 2;
            }
            "--log-file" => {
                parsed.log_file = Some(PathBuf::from(flag_value(args, i)?));
                i += 2;
            }
            "--at" => {
                parsed.at = Some(parse_at(flag_value(args, i)?)?);
                i += 2;
            }
            "--verbose" | "-v" => {
                parsed.verbose = true;
                i += 1;
            }
            "--no-initial-run" => {
                parsed.no_initial_run = true;
                i += 1;
            }
            "--dry-run" => {
                parsed.dry_run = true;
                i += 1;
            }
            other => bail!("Unknown option: {}", other),
        }
    }
    Ok(parsed)
}

fn flag_value(args: &[String], i: usize) -> Result<&str> {
    args.get(i + 1)
        .map(String::as_str)
        .with_context(|| format!("{} requires a value", args[i]))
}

/// Accepts `YYYY-MM-DD` (midnight) or `YYYY-MM-DD HH:MM`.
pub(crate) fn parse_at(value: &str) -> Result<NaiveDateTime> {
    if let Ok(at) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M") {
        return Ok(at);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .with_context(|| format!("--at expects YYYY-MM-DD or 'YYYY-MM-DD HH:MM', got '{}'", value))
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let parsed = match parse_cli_args(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            print_error(&e.to_string());
            print_help();
            bail!("invalid arguments");
        }
    };
    if parsed.command == CliCommand::Help {
        print_help();
        return Ok(());
    }

    let level = if parsed.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    crate::logging::init(level, parsed.log_file.as_deref())?;
    info!(
        "{} v{} starting",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let config_path = config::resolve_path(parsed.config.as_deref());
    match parsed.command {
        CliCommand::Run => daemon::run_service(config_path, parsed.no_initial_run).await,
        CliCommand::Once => run_once(config_path, parsed.dry_run, parsed.at).await,
        CliCommand::Check => run_check(config_path),
        CliCommand::Doctor => doctor::run_doctor(&config_path).await,
        CliCommand::Help => Ok(()),
    }
}

async fn run_once(
    config_path: PathBuf,
    dry_run: bool,
    at: Option<NaiveDateTime>,
) -> Result<()> {
    let connector = SheetsConnector::new(STORE_REQUEST_TIMEOUT)?;
    let cycle = MonitorCycle::new(config_path, Arc::new(connector))
        .dry_run(dry_run)
        .at(at);

    match cycle.run().await {
        CycleOutcome::Completed(summary) => {
            if summary.failed > 0 {
                warn!("{} target(s) were not recorded", summary.failed);
            }
            print_success(&format!(
                "Cycle complete: {} surveyed, {} recorded, {} failed",
                summary.surveyed, summary.recorded, summary.failed
            ));
            Ok(())
        }
        CycleOutcome::ConfigRejected => bail!("configuration rejected; nothing was surveyed"),
        CycleOutcome::Aborted(reason) => bail!("cycle aborted: {}", reason),
        CycleOutcome::Skipped => bail!("another cycle is already running"),
    }
}

fn run_check(config_path: PathBuf) -> Result<()> {
    let config = Config::load(&config_path)?;

    let mut section = GuideSection::new("Configuration")
        .status("File", &config_path.display().to_string())
        .status("Max search rank", &config.max_search_rank.to_string())
        .status("Spreadsheet", &config.store.file_id)
        .status("Schedule", &config.schedule)
        .status(
            "Timezone",
            &config
                .timezone
                .map(|tz| tz.name().to_string())
                .unwrap_or_else(|| "host local".to_string()),
        )
        .blank();
    for target in &config.targets {
        section = section.text(&format!(
            "sheet {:>2}  {:>2} keyword(s)  {}",
            target.sheet_index,
            target.keywords.len(),
            target.url
        ));
    }
    section.print();
    println!();
    print_success("Configuration is valid.");
    Ok(())
}
