//! CLI surface for mfi-backoffice.
//!
//! Drives the console's wizards from JSON form files and tails realtime
//! topics from a terminal.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand, builder::BoolishValueParser};
use serde::Serialize;
use thiserror::Error;

use crate::config::{self, Config};
use crate::flows::Flow;
use crate::wizard::{FormState, StepOutcome, ValidationResult, Wizard};
use crate::Result;

mod commands;
mod render;

// =============================================================================
// Entry + global options
// =============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "mfi",
    version,
    about = "Microfinance back-office console tools",
    infer_subcommands = true,
    infer_long_args = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Machine-readable JSON output.
    #[arg(
        long,
        global = true,
        default_value_t = false,
        num_args = 0..=1,
        value_parser = BoolishValueParser::new()
    )]
    pub json: bool,

    /// Debug output (repeat for more).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a form file through a flow's steps without submitting.
    #[command(alias = "validate")]
    Check(CheckArgs),

    /// Validate a form file and submit it to the API.
    Submit(SubmitArgs),

    /// Subscribe to a realtime topic and print notifications.
    #[command(alias = "tail")]
    Watch(WatchArgs),
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// client, loan-product or loan.
    #[arg(value_parser = parse_flow)]
    pub flow: Flow,

    /// JSON object with the form fields.
    #[arg(long, short = 'f', value_name = "PATH")]
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    #[arg(value_parser = parse_flow)]
    pub flow: Flow,

    #[arg(long, short = 'f', value_name = "PATH")]
    pub file: PathBuf,

    /// Existing record to update (client only).
    #[arg(long)]
    pub id: Option<String>,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Topic destination, e.g. /topic/payments.
    pub topic: String,

    /// Exit after this many events.
    #[arg(long, value_name = "N")]
    pub max_events: Option<u64>,
}

fn parse_flow(raw: &str) -> std::result::Result<Flow, String> {
    raw.parse::<Flow>().map_err(|err| err.to_string())
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read form {path}: {source}")]
    ReadForm {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("form {path} is not valid json: {source}")]
    ParseForm {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
    #[error("failed to render json: {0}")]
    Render(#[from] serde_json::Error),
}

// =============================================================================
// Dispatch
// =============================================================================

pub fn parse_from<I, T>(args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let raw: Vec<OsString> = args.into_iter().map(|t| t.into()).collect();
    Cli::parse_from(normalize_args(raw))
}

/// Run the CLI (used by bin).
pub fn run(cli: Cli) -> Result<()> {
    let ctx = Ctx {
        json: cli.json,
        config: config::load_or_init(),
    };
    match cli.command {
        Commands::Check(args) => commands::check::handle(&ctx, args),
        Commands::Submit(args) => commands::submit::handle(&ctx, args),
        Commands::Watch(args) => commands::watch::handle(&ctx, args),
    }
}

struct Ctx {
    json: bool,
    config: Config,
}

// =============================================================================
// Shared helpers
// =============================================================================

fn load_form(path: &Path) -> Result<FormState> {
    let raw = std::fs::read(path).map_err(|source| CliError::ReadForm {
        path: path.to_path_buf(),
        source,
    })?;
    let value: serde_json::Value =
        serde_json::from_slice(&raw).map_err(|source| CliError::ParseForm {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(FormState::from_value(value)?)
}

/// Outcome of pressing "next" until the wizard stops.
#[derive(Debug, Clone, Serialize)]
struct CheckReport {
    flow: String,
    ready: bool,
    step_index: usize,
    step: String,
    label: String,
    completed_steps: Vec<usize>,
    errors: ValidationResult,
}

fn drive(flow: Flow, wizard: &Wizard) -> CheckReport {
    let errors = loop {
        match wizard.next() {
            StepOutcome::Advanced { .. } => continue,
            StepOutcome::Blocked(errors) => break errors,
            StepOutcome::ReadyToSubmit => break ValidationResult::new(),
        }
    };
    let step = wizard.current_step_definition();
    CheckReport {
        flow: flow.name().to_string(),
        ready: errors.is_valid(),
        step_index: wizard.current_step(),
        step: step.id().to_string(),
        label: step.label().to_string(),
        completed_steps: wizard.completed_steps().into_iter().collect(),
        errors,
    }
}

fn print_line(line: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{line}")
        && e.kind() != std::io::ErrorKind::BrokenPipe
    {
        return Err(CliError::Output(e).into());
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value).map_err(CliError::from)?;
    print_line(&s)
}

fn print_json_line<T: Serialize>(value: &T) -> Result<()> {
    let s = serde_json::to_string(value).map_err(CliError::from)?;
    print_line(&s)
}

// =============================================================================
// Arg normalization
// =============================================================================

fn normalize_args(mut raw: Vec<OsString>) -> Vec<OsString> {
    if raw.is_empty() {
        return raw;
    }

    let mut out = Vec::with_capacity(raw.len());
    out.push(raw.remove(0)); // program name

    for arg in raw {
        let s = arg.to_string_lossy();
        if s.starts_with("--") {
            let mut pieces = s.splitn(2, '=');
            let flag = pieces.next().unwrap_or("");
            let val = pieces.next();
            let canon = flag.to_lowercase().replace('_', "-");
            let canon = canonical_flag(&canon);
            match val {
                Some(v) => out.push(OsString::from(format!("{canon}={v}"))),
                None => out.push(OsString::from(canon)),
            }
        } else {
            out.push(arg);
        }
    }
    out
}

fn canonical_flag(flag: &str) -> &str {
    match flag {
        "--form" | "--input" => "--file",
        "--max" | "--count" | "--limit" => "--max-events",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_normalized() {
        let cli = parse_from(["mfi", "check", "loan_product", "--FORM=form.json"]);
        match cli.command {
            Commands::Check(args) => {
                assert_eq!(args.flow, Flow::LoanProduct);
                assert_eq!(args.file, PathBuf::from("form.json"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn watch_accepts_limit_alias() {
        let cli = parse_from(["mfi", "--json", "watch", "/topic/payments", "--max_events", "3"]);
        assert!(cli.json);
        match cli.command {
            Commands::Watch(args) => {
                assert_eq!(args.topic, "/topic/payments");
                assert_eq!(args.max_events, Some(3));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn drive_stops_at_first_invalid_step() {
        let form = FormState::from_pairs([
            ("surname", serde_json::json!("Doe")),
            ("givenName", serde_json::json!("Jane")),
            ("phoneNumber", serde_json::json!("0700000000")),
        ]);
        let wizard = Flow::Client.wizard(form).unwrap();
        let report = drive(Flow::Client, &wizard);
        assert!(!report.ready);
        assert_eq!(report.step, "guarantor");
        assert_eq!(report.completed_steps, vec![0]);
        assert_eq!(
            report.errors.get("guarantorName"),
            Some("Guarantor name is required")
        );
    }
}
