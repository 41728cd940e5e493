//! Querymill command-line interface.
//!
//! Thin wrapper over the store library: point operations on single
//! stores (`exists`, `read`, `append`, `move`), collection-level checks
//! (`status`, `reconcile`), and the coordinator transition (`submit`).
//! Every command exits 0 on success; failures print the error kind and
//! exit with a code identifying the error class.

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use querymill_logging::LogConfig;
use querymill_store::StoreError;

mod cli;

use cli::rows::{AppendArgs, ExistsArgs, MoveArgs, ReadArgs};
use cli::status::{ReconcileArgs, StatusArgs};
use cli::submit::SubmitArgs;

#[derive(Parser, Debug)]
#[command(name = "querymill", about = "CSV work-queue tooling for query-corpus conversion")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check whether a key is present in a store (prints true/false)
    Exists(ExistsArgs),

    /// Read one record by key and print it as JSON
    Read(ReadArgs),

    /// Append one record from a JSON object
    Append(AppendArgs),

    /// Move one record between two stores, optionally patching fields
    Move(MoveArgs),

    /// Per-state counts and conservation check for a collection
    Status(StatusArgs),

    /// Repair crash-window duplicates across a collection's stores
    Reconcile(ReconcileArgs),

    /// Record a validation outcome for a key and run its transition
    Submit(SubmitArgs),
}

/// Exit codes by error class: flow-control errors get distinct codes so
/// batch drivers can branch without parsing messages; corruption and
/// I/O failures get codes that mean "halt the batch".
fn exit_code_for(err: &StoreError) -> u8 {
    match err {
        StoreError::NotFound { .. } => 2,
        StoreError::DuplicateKey { .. } => 3,
        StoreError::SchemaMismatch(_) => 4,
        StoreError::MalformedRecord(_) => 5,
        StoreError::Storage(_) => 6,
        StoreError::InvalidTransition { .. } => 7,
        StoreError::DuplicateHolder { .. } => 8,
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Exists(args) => cli::rows::exists(args),
        Commands::Read(args) => cli::rows::read(args),
        Commands::Append(args) => cli::rows::append(args),
        Commands::Move(args) => cli::rows::move_row(args),
        Commands::Status(args) => cli::status::status(args),
        Commands::Reconcile(args) => cli::status::reconcile(args),
        Commands::Submit(args) => cli::submit::submit(args),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = querymill_logging::init_logging(LogConfig {
        app_name: "querymill",
        verbose: cli.verbose,
    }) {
        eprintln!("error: Storage: failed to initialize logging: {e:#}");
        return ExitCode::from(6);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<StoreError>() {
            Some(store_err) => {
                // Flow-control errors are normal branch points for batch
                // drivers; corruption and I/O failures mean stop the batch.
                let severity = if store_err.is_flow_control() { "error" } else { "fatal" };
                eprintln!("{severity}: {}: {}", store_err.kind_name(), store_err);
                ExitCode::from(exit_code_for(store_err))
            }
            None => {
                eprintln!("error: {err:#}");
                ExitCode::FAILURE
            }
        },
    }
}
