//! CLI for listsync.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use listsync_core::config;
use std::path::PathBuf;

use commands::{run_add, run_config};

/// Top-level CLI for listsync.
#[derive(Debug, Parser)]
#[command(name = "listsync")]
#[command(about = "listsync: throttling-aware item writer for remote lists", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Create one item, with optional attachments.
    Add {
        /// Field value as NAME=VALUE (repeatable). `Created=` stamps the current time.
        #[arg(long = "field", short = 'f', value_name = "NAME=VALUE", value_parser = parse_field, required = true)]
        fields: Vec<(String, String)>,
        /// Folder inside the list (default: root folder).
        #[arg(long)]
        folder: Option<String>,
        /// File to attach (repeatable, in order).
        #[arg(long = "attach", short = 'a', value_name = "FILE")]
        attachments: Vec<PathBuf>,
        /// Target list (default: `list` from config).
        #[arg(long)]
        list: Option<String>,
    },

    /// Show the config file path and effective settings.
    Config,
}

/// Parse `NAME=VALUE`. The value may be empty; the name may not.
pub(crate) fn parse_field(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {:?}", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("field name missing in {:?}", raw));
    }
    Ok((name.to_string(), value.to_string()))
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Add {
                fields,
                folder,
                attachments,
                list,
            } => run_add(&cfg, fields, folder.as_deref(), &attachments, list.as_deref()).await?,
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}
