//! Command line front end for the permission engine.
//!
//! `check` prints the decision for a command as JSON and exits with 0
//! (allow), 1 (ask) or 2 (deny). `exit-code` interprets a finished command's
//! status and `explain` shows how a command line is taken apart.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use rusty_gate::config::GateConfig;
use rusty_gate::context::CurrentDir;
use rusty_gate::security::allowlist::matching_signature;
use rusty_gate::security::analyzer::{check_divergence, has_dangerous_characters};
use rusty_gate::security::exit_code::final_stage_command;
use rusty_gate::security::{
    gate_command, interpret, ExecutionDecision, FixedOracle, PrefixOracle, PrefixQueryResult,
    RawCommand, UnavailableOracle,
};
use rusty_gate::shell::{is_pipeline_safe, preserve_variables, split_command, Tokenizer};
use rusty_gate::utils::logger::init_logging;

/// Exit status when the check was aborted before a decision.
const EXIT_ABORTED: u8 = 3;

#[derive(Parser)]
#[command(name = "rusty-gate", version, about = "Decide whether a shell command may run")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decide whether COMMAND may run and print the decision as JSON
    Check {
        /// Gate configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Working directory to decide against (defaults to the current one)
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Command runs in the sandboxed execution mode
        #[arg(long)]
        sandbox: bool,
        /// Canned prefix classifier answer (JSON); without it the classifier
        /// is treated as unavailable
        #[arg(long)]
        oracle_response: Option<PathBuf>,
        command: String,
    },
    /// Interpret the exit status of a finished command
    ExitCode {
        command: String,
        #[arg(allow_hyphen_values = true)]
        code: i32,
    },
    /// Show tokens, segments and classifications for COMMAND
    Explain { command: String },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Command::Check {
            config,
            cwd,
            sandbox,
            oracle_response,
            command,
        } => run_check(config, cwd, sandbox, oracle_response, command).await,
        Command::ExitCode { command, code } => {
            let interpretation = interpret(&command, code);
            println!("{}", serde_json::to_string_pretty(&interpretation)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Explain { command } => {
            explain(&command)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_check(
    config: Option<PathBuf>,
    cwd: Option<PathBuf>,
    sandbox: bool,
    oracle_response: Option<PathBuf>,
    command: String,
) -> Result<ExitCode> {
    let config = match config {
        Some(path) => GateConfig::load(&path)?,
        None => GateConfig::default(),
    };
    let _log_guard = init_logging(config.log_dir.as_deref());

    let cwd = match cwd {
        Some(dir) => dir,
        None => CurrentDir::capture()
            .map(|cwd| cwd.path)
            .context("Failed to read the current directory")?,
    };
    let ctx = config.permission_context(cwd);
    let settings = config.settings();

    let oracle: Box<dyn PrefixOracle> = match oracle_response {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let result: PrefixQueryResult = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid classifier JSON at {}", path.display()))?;
            Box::new(FixedOracle::new(result))
        }
        None => Box::new(UnavailableOracle),
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let raw = RawCommand {
        command,
        sandbox: sandbox.then_some(true),
        ..RawCommand::default()
    };

    match gate_command(&raw, &ctx, oracle.as_ref(), &cancel, &settings).await {
        Ok(decision) => {
            println!("{}", serde_json::to_string_pretty(&decision)?);
            let status = ExecutionDecision::from(&decision).exit_status();
            Ok(ExitCode::from(status as u8))
        }
        Err(e) if e.is_aborted() => {
            tracing::warn!("Check aborted: {}", raw.command);
            eprintln!("{}", e);
            Ok(ExitCode::from(EXIT_ABORTED))
        }
        Err(e) => Err(e.into()),
    }
}

fn explain(command: &str) -> Result<()> {
    let tokenized = Tokenizer::new(command, preserve_variables).run();
    let segments: Vec<_> = split_command(command)
        .into_iter()
        .map(|segment| {
            json!({
                "command": segment,
                "read_only_signature": matching_signature(&segment),
            })
        })
        .collect();

    let report = json!({
        "tokens": tokenized.tokens,
        "unterminated_quote": tokenized.unterminated_quote,
        "segments": segments,
        "pipeline_safe": is_pipeline_safe(command),
        "dangerous_characters": has_dangerous_characters(command),
        "check_divergence": format!("{:?}", check_divergence(command)),
        "final_stage_command": final_stage_command(command),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
