//! Command-line surface.

use crate::config::PROJECT_DIR_ENV;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "flint", author, version, about = "Backup and restore for stack volumes", long_about = None)]
pub struct Cli {
    /// Project directory (holds docker-compose.yml)
    #[arg(short, long, value_name = "DIR", env = PROJECT_DIR_ENV, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Answer yes to confirmation prompts
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Back up, restore and prune volume archives
    #[command(subcommand)]
    Backup(BackupCommand),

    /// Inspect or edit the project's .env settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum BackupCommand {
    /// List volumes labelled for backup
    Volumes,

    /// Back up every labelled volume into a new archive set
    All,

    /// Back up one volume, labelled or not
    Volume {
        name: String,
    },

    /// Replace a volume's contents with an archive
    Restore {
        /// Archive file (<volume>.tar.gz)
        file: PathBuf,

        /// Target volume (defaults to the archive name without .tar.gz)
        name: Option<String>,
    },

    /// List archive sets
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Delete archive sets older than DAYS days
    Cleanup {
        #[arg(default_value_t = 7)]
        days: u32,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Print the resolved configuration
    Show {
        /// Print JSON instead of KEY=VALUE lines
        #[arg(long)]
        json: bool,
    },

    /// Print a value from .env
    Get {
        key: String,
    },

    /// Set a value in .env, keeping comments and order
    Set {
        key: String,
        value: String,
    },
}
