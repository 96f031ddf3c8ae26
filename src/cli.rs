use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// LaunchDarkly project provisioning and workflow approval management
#[derive(Parser)]
#[command(name = "ld-provisioner", version, about)]
pub struct Cli {
    /// Write the log file as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or update a project and its environments from a YAML file
    Provision {
        #[arg(short, long, default_value = "config.yml")]
        config: PathBuf,
    },

    /// Add, update or remove workflow approvals across projects
    ReconcileApprovals {
        /// Desired approval settings (YAML with `flags` and `segments`)
        #[arg(short, long, conflicts_with = "remove")]
        settings: Option<PathBuf>,

        /// Remove workflow approvals instead of applying them
        #[arg(long)]
        remove: bool,
    },
}

impl Commands {
    /// Log file prefix for this command.
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Provision { .. } => "provision",
            Commands::ReconcileApprovals { .. } => "reconcile-approvals",
        }
    }
}
