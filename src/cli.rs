//! CLI argument parsing module
//!
//! Handles command-line argument parsing using `clap` derive macros.
//! Global options describe where the tables live; the subcommand says what
//! to do with them. Options given here override the JSON config file.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::InventoryConfig;
use crate::entities::FieldPatch;
use crate::error::{InventoryError, Result};

/// Command-line arguments for the inventory tool.
///
/// # Example
///
/// ```rust,ignore
/// use clap::Parser;
/// use lab_inventory::cli::Args;
///
/// let args = Args::parse();
/// let config = args.resolve_config()?;
/// ```
#[derive(Parser, Debug)]
#[command(name = "lab-inventory")]
#[command(about = "Read and edit lab inventory tables stored as CSV in a content repository")]
#[command(version)]
pub struct Args {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Where the tables live and how to reach them.
#[derive(ClapArgs, Debug, Default, Clone)]
pub struct ConnectionArgs {
    /// JSON config file; flags below override its values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Repository owner
    #[arg(long, global = true)]
    pub owner: Option<String>,

    /// Repository name
    #[arg(long, global = true)]
    pub repo: Option<String>,

    /// Branch to read and commit to
    #[arg(long, global = true)]
    pub branch: Option<String>,

    /// Directory of the table files inside the repository
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    /// Base URL of the content API
    #[arg(long, global = true)]
    pub api_base: Option<String>,

    /// Local directory of read-only fallback tables
    #[arg(long, global = true)]
    pub fallback_dir: Option<PathBuf>,

    /// Bearer token for the content API
    #[arg(long, global = true, env = "LAB_INVENTORY_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Attempts per write before a version conflict is reported
    #[arg(long, global = true)]
    pub max_commit_attempts: Option<u32>,
}

/// Operation to perform.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print a table as JSON with related names resolved
    List {
        /// Table name, e.g. celllines
        entity: String,
    },
    /// Print one record as JSON
    Get { entity: String, id: u64 },
    /// Add a record; its id is allocated
    Add {
        entity: String,
        /// Field assignment, repeatable: --set refid=CL-7
        #[arg(long = "set", value_name = "COLUMN=VALUE", value_parser = parse_assignment)]
        fields: Vec<(String, String)>,
    },
    /// Change fields of an existing record
    Update {
        entity: String,
        id: u64,
        #[arg(long = "set", value_name = "COLUMN=VALUE", value_parser = parse_assignment, required = true)]
        fields: Vec<(String, String)>,
    },
    /// Remove a record
    Delete { entity: String, id: u64 },
    /// Append the rows of a local CSV file; ids in the file are reallocated
    Import { entity: String, file: PathBuf },
    /// Write a table as CSV to stdout or a file
    Export {
        entity: String,
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

impl Command {
    /// True for commands that commit to the remote store.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Command::Add { .. } | Command::Update { .. } | Command::Delete { .. } | Command::Import { .. }
        )
    }
}

/// Parses `column=value`. The value may be empty or contain further `=`.
pub fn parse_assignment(s: &str) -> std::result::Result<(String, String), String> {
    let (column, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=VALUE, got '{s}'"))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(format!("missing column name in '{s}'"));
    }
    Ok((column.to_string(), value.to_string()))
}

/// Collects assignments into a patch; a repeated column keeps the last value.
pub fn to_patch(fields: &[(String, String)]) -> FieldPatch {
    fields.iter().cloned().collect()
}

impl ConnectionArgs {
    /// Loads the config file, if any, and applies the flags over it.
    pub fn resolve_config(&self) -> Result<InventoryConfig> {
        let mut config = match &self.config {
            Some(path) => InventoryConfig::from_json_file(path)?,
            None => InventoryConfig::default(),
        };
        self.apply_to(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_to(&self, config: &mut InventoryConfig) {
        if let Some(owner) = &self.owner {
            config.owner = owner.clone();
        }
        if let Some(repo) = &self.repo {
            config.repo = repo.clone();
        }
        if self.branch.is_some() {
            config.branch = self.branch.clone();
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(base) = &self.api_base {
            config.api_base = base.clone();
        }
        if self.fallback_dir.is_some() {
            config.fallback_dir = self.fallback_dir.clone();
        }
        if self.token.is_some() {
            config.token = self.token.clone();
        }
        if let Some(attempts) = self.max_commit_attempts {
            config.max_commit_attempts = attempts;
        }
    }
}

impl Args {
    /// Checks the combination of command and configured sources.
    pub fn resolve_config(&self) -> Result<InventoryConfig> {
        let config = self.connection.resolve_config()?;
        if self.command.is_write() && !config.is_remote_configured() {
            return Err(InventoryError::InvalidArgument(
                "writes need --owner and --repo; the fallback directory is read-only".to_string(),
            ));
        }
        Ok(config)
    }
}
