//! Command-line entry point for identity reconciliation.
//!
//! # Responsibility
//! - Parse flags, bootstrap logging and the database, and forward one
//!   command to `identity_core`.
//! - Print results as JSON on stdout; diagnostics go to the logger.
//!
//! # Invariants
//! - Validation failures exit with status 2, other failures with status 1.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use identity_core::db::migrations::{current_version, latest_version};
use identity_core::db::open_db;
use identity_core::{
    default_log_level, init_logging, IdentityService, IdentityView, LogTarget, ReconcileConfig,
    ReconcileError, SqliteContactStore, DEFAULT_MAX_ATTEMPTS,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "identity", version, about = "Contact identity reconciliation")]
struct Cli {
    /// SQLite database file; created and migrated on first use.
    #[arg(long, global = true, default_value = "./identity.sqlite3")]
    db: PathBuf,

    /// trace|debug|info|warn|error. Defaults to debug in debug builds.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Absolute directory for rolling log files instead of stderr.
    #[arg(long, global = true)]
    log_dir: Option<String>,

    /// Attempts per reconciliation when the database is busy.
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile one observation and print the consolidated contact.
    Identify(IdentifyArgs),
    /// Print the identity a contact currently belongs to.
    Show(ShowArgs),
    /// Print the schema version of the database.
    SchemaVersion,
}

#[derive(Debug, Args)]
struct IdentifyArgs {
    #[arg(long)]
    email: Option<String>,
    #[arg(long = "phone", alias = "phone-number")]
    phone_number: Option<String>,
}

#[derive(Debug, Args)]
struct ShowArgs {
    contact_id: i64,
}

/// Response envelope of `identify` and `show`.
#[derive(Debug, Serialize)]
struct ContactResponse {
    contact: IdentityView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SchemaVersionResponse {
    schema_version: u32,
    latest_supported: u32,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(message) = init_cli_logging(&cli) {
        eprintln!("error: {message}");
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            if is_validation_error(&err) {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn init_cli_logging(cli: &Cli) -> Result<(), String> {
    let level = cli.log_level.as_deref().unwrap_or_else(|| default_log_level());
    let target = match cli.log_dir.as_deref() {
        Some(dir) => LogTarget::directory(dir)?,
        None => LogTarget::Stderr,
    };
    init_logging(level, target)
}

fn run(cli: &Cli) -> Result<()> {
    let conn = open_db(&cli.db)
        .with_context(|| format!("failed to open database `{}`", cli.db.display()))?;

    match &cli.command {
        Command::Identify(args) => {
            let config = ReconcileConfig::default().with_max_attempts(cli.max_attempts);
            let service = IdentityService::with_config(SqliteContactStore::new(&conn), config);
            let contact = service
                .reconcile_contact_points(args.email.as_deref(), args.phone_number.as_deref())?;
            print_json(&ContactResponse { contact })
        }
        Command::Show(args) => {
            let service = IdentityService::new(SqliteContactStore::new(&conn));
            let contact = service
                .identity_of(args.contact_id)?
                .with_context(|| format!("contact {} not found", args.contact_id))?;
            print_json(&ContactResponse { contact })
        }
        Command::SchemaVersion => print_json(&SchemaVersionResponse {
            schema_version: current_version(&conn)?,
            latest_supported: latest_version(),
        }),
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string(value).context("failed to encode response")?;
    println!("{text}");
    Ok(())
}

fn is_validation_error(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ReconcileError>(),
        Some(ReconcileError::Validation(_))
    )
}
