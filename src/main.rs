//! Lab Inventory - read and edit CSV inventory tables in a content repository
//!
//! Reads go through the remote repository first and fall back to a local
//! directory of tables; writes are committed to the repository with
//! optimistic concurrency.
//!
//! # Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Success |
//! | 1 | Configuration/argument error |
//! | 2 | Authentication error |
//! | 3 | Remote or file I/O error |
//! | 4 | Write conflict |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `lab_inventory=info`).

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lab_inventory::cli::{to_patch, Args, Command};
use lab_inventory::error::InventoryError;
use lab_inventory::manager::{DataManager, Mutation, WriteOutcome};

/// Exit code for success
const EXIT_SUCCESS: u8 = 0;
/// Exit code for configuration/argument errors
const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for authentication errors
const EXIT_AUTH_ERROR: u8 = 2;
/// Exit code for remote and file I/O errors
const EXIT_IO_ERROR: u8 = 3;
/// Exit code for writes that kept losing to concurrent commits
const EXIT_CONFLICT: u8 = 4;

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let args = Args::parse();
    let config = match args.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: Configuration error: {}", e);
            eprintln!("  Hint: Use --help for usage information");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let result = match DataManager::from_config(&config) {
        Ok(manager) => run(&manager, args.command).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            if let Some(hint) = error_hint(&e) {
                eprintln!("  Hint: {}", hint);
            }
            ExitCode::from(error_to_exit_code(&e))
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lab_inventory=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Dispatches one command.
async fn run(manager: &DataManager, command: Command) -> Result<(), InventoryError> {
    match command {
        Command::List { entity } => {
            let table = manager.list_json(&entity).await?;
            info!(
                "{} from {}",
                entity,
                table["source"].as_str().unwrap_or("unknown source")
            );
            print_json(&table["records"])
        }
        Command::Get { entity, id } => {
            let record = manager.find_json(&entity, id).await?;
            print_json(&record)
        }
        Command::Add { entity, fields } => {
            let outcome = manager.update(&entity, Mutation::Add(to_patch(&fields))).await?;
            report(&outcome)
        }
        Command::Update { entity, id, fields } => {
            let patch = to_patch(&fields);
            let outcome = manager.update(&entity, Mutation::Update { id, patch }).await?;
            report(&outcome)
        }
        Command::Delete { entity, id } => {
            let outcome = manager.update(&entity, Mutation::Delete { id }).await?;
            report(&outcome)
        }
        Command::Import { entity, file } => {
            let text = tokio::fs::read_to_string(&file).await?;
            let outcome = manager.import_csv(&entity, &text).await?;
            report(&outcome)
        }
        Command::Export { entity, output } => {
            let text = manager.export(&entity).await?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, text).await?;
                    info!("Wrote {} to {}", entity, path.display());
                }
                None => print!("{}", text),
            }
            Ok(())
        }
    }
}

fn print_json(value: &serde_json::Value) -> Result<(), InventoryError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report(outcome: &WriteOutcome) -> Result<(), InventoryError> {
    if outcome.dropped_rows > 0 {
        eprintln!(
            "Warning: {} malformed row(s) of {} were not carried over",
            outcome.dropped_rows, outcome.kind
        );
    }
    print_json(&serde_json::to_value(outcome)?)
}

/// Maps an error to the process exit code.
fn error_to_exit_code(error: &InventoryError) -> u8 {
    match error {
        InventoryError::NotConfigured(_)
        | InventoryError::InvalidArgument(_)
        | InventoryError::InvalidField { .. }
        | InventoryError::UnsupportedEntity(_)
        | InventoryError::RecordNotFound { .. } => EXIT_CONFIG_ERROR,
        InventoryError::AuthRequired | InventoryError::AuthExpired => EXIT_AUTH_ERROR,
        InventoryError::OptimisticConflict { .. } => EXIT_CONFLICT,
        InventoryError::RowParse { .. }
        | InventoryError::NotFound(_)
        | InventoryError::MissingContent(_)
        | InventoryError::RemoteUnavailable { .. }
        | InventoryError::Csv(_)
        | InventoryError::Io(_)
        | InventoryError::Json(_)
        | InventoryError::Base64(_) => EXIT_IO_ERROR,
    }
}

fn error_hint(error: &InventoryError) -> Option<&'static str> {
    match error {
        InventoryError::AuthRequired | InventoryError::AuthExpired => {
            Some("Set LAB_INVENTORY_TOKEN or pass --token")
        }
        InventoryError::OptimisticConflict { .. } => {
            Some("The table is being edited elsewhere; retry or raise --max-commit-attempts")
        }
        InventoryError::UnsupportedEntity(_) => Some(
            "Known tables: users, organisms, vendors, categories, celllines, orders, oligos, plasmids",
        ),
        _ => None,
    }
}
