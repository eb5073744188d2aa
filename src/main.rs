#![forbid(unsafe_code)]

//! `roost` — QEMU-backed kernel test harness binary.
//!
//! Boots a kernel image under emulation, feeds it `$run` commands over a
//! virtual serial line, and records a verdict for every discovered test
//! entry. Also exposes suite inspection commands that never touch the
//! emulator.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use roost::entries;
use roost::runner::{self, SuitePaths};
use roost::{HarnessConfig, HarnessError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "roost", about = "QEMU-backed kernel test harness", version, long_about = None)]
struct Cli {
    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: HarnessCommand,
}

#[derive(Debug, Subcommand)]
enum HarnessCommand {
    /// Boot the kernel and run every discovered test entry.
    Run(RunArgs),
    /// Print the names of discovered test entries, one per line.
    ListEntries(SuiteArgs),
    /// Print the generated C entry table for the suite.
    DumpEntries(SuiteArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Directory scanned recursively for `*.t` entry files.
    #[arg(long)]
    src_path: PathBuf,

    /// Kernel image booted in the emulator.
    #[arg(long)]
    kernel: PathBuf,

    /// Project root exported to collaborator scripts as `ROOT_PATH`.
    #[arg(long)]
    root_path: PathBuf,

    /// Script root exported as `SOURCE_PATH`; holds `fixture/` and `check/`.
    #[arg(long)]
    source_path: PathBuf,

    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct SuiteArgs {
    /// Directory scanned recursively for `*.t` entry files.
    #[arg(long)]
    src_path: PathBuf,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    let all_passed = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| HarnessError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))?;

    if !all_passed {
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: Cli) -> Result<bool> {
    match args.command {
        HarnessCommand::Run(run_args) => run_tests(run_args).await,
        HarnessCommand::ListEntries(suite_args) => {
            let suite = entries::load_suite(&suite_args.src_path)?;
            for entry in &suite.entries {
                println!("{}", entry.name);
            }
            Ok(true)
        }
        HarnessCommand::DumpEntries(suite_args) => {
            let suite = entries::load_suite(&suite_args.src_path)?;
            print!("{}", entries::render_entry_table(&suite));
            Ok(true)
        }
    }
}

async fn run_tests(args: RunArgs) -> Result<bool> {
    let config = Arc::new(HarnessConfig::load_optional(args.config.as_deref())?);
    info!("configuration loaded");

    let paths = SuitePaths {
        src_path: args.src_path,
        root_path: args.root_path,
        source_path: args.source_path,
    };
    runner::run_suite(config, &paths, &args.kernel).await
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries entry tables and captured test output; logs go to stderr.
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| HarnessError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| HarnessError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
