//! mcp-stdio-probe: conformance probe for MCP servers speaking stdio
//!
//! Launches the server under test, runs the initialize/tools handshake
//! against it and reports what it observed.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use mcp_stdio_probe::config::{self, HarnessConfig};
use mcp_stdio_probe::error::{ConfigError, HarnessError};
use mcp_stdio_probe::harness::{self, RunOutcome, RunReport, StepOutcome, ToolListing};

/// Conformance probe for MCP servers speaking stdio.
///
/// Starts the server with `--config <PATH>`, sends `initialize`,
/// `notifications/initialized`, `tools/list` and `tools/call`, and checks
/// each response.
#[derive(Parser, Debug)]
#[command(name = "mcp-stdio-probe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the server executable
    #[arg(value_name = "SERVER")]
    server: Option<PathBuf>,

    /// Config file passed to the server as `--config`
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Path to the probe's own JSON configuration file
    #[arg(long, value_name = "FILE")]
    harness_config: Option<PathBuf>,

    /// Tool that must be listed and is then called
    #[arg(long, value_name = "NAME")]
    tool: Option<String>,

    /// Give up on a response after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    /// Applies CLI overrides on top of the loaded configuration.
    fn apply(&self, cfg: &mut HarnessConfig) -> Result<(), ConfigError> {
        if let Some(server) = &self.server {
            cfg.server_path.clone_from(server);
        }
        if let Some(path) = &self.config {
            cfg.server_config.clone_from(path);
        }
        if let Some(tool) = &self.tool {
            cfg.required_tool.clone_from(tool);
        }
        if self.timeout.is_some() {
            cfg.response_timeout_secs = self.timeout;
        }
        cfg.validate()
    }
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "info" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO, // Default to info for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Logs a summary of the run and prints the tool output to stdout.
fn summarise(report: &RunReport) {
    match &report.tool_listing {
        Some(ToolListing::Listed(inventory)) => info!(
            count = inventory.tool_names.len(),
            required_present = inventory.required_present,
            "Tool listing"
        ),
        Some(ToolListing::Failed(Some(err))) => info!(error = %err, "Tool listing failed"),
        Some(ToolListing::Failed(None)) => info!("Tool listing returned no result"),
        None => {}
    }

    match &report.tool_call {
        Some(StepOutcome::Ok(output)) => {
            if output.is_error {
                warn!("Tool reported an error in its content");
            }
            println!("{}", output.text);
        }
        Some(StepOutcome::Soft(err)) => info!(error = %err, "Tool call returned error"),
        None => {}
    }

    match &report.outcome {
        RunOutcome::Completed => info!(phase = ?report.phase, "Probe completed"),
        RunOutcome::Stopped => warn!(phase = ?report.phase, "Probe stopped after initialize error"),
        RunOutcome::Failed(e) => error!(
            failed_in = ?report.failed_in,
            error = %e,
            "Probe failed"
        ),
    }
}

/// Entry point for the mcp-stdio-probe CLI.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let mut cfg = match config::load_config(args.harness_config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = args.apply(&mut cfg) {
        eprintln!("Configuration error: {e}");
        return ExitCode::FAILURE;
    }

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting mcp-stdio-probe"
    );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(harness::run(&cfg)) {
        Ok(report) => {
            summarise(&report);
            ExitCode::SUCCESS
        }
        Err(e @ HarnessError::ExecutableNotFound { .. }) => {
            error!(error = %e, "Build the server first or pass its path");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "Could not start server");
            ExitCode::FAILURE
        }
    }
}
