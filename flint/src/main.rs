//! Flint - Main entry point
//!
//! Volume backup, restore and retention for a self-hosted container stack.

use anyhow::{bail, Result};
use clap::Parser;
use flint::catalog::{ArchiveCatalog, VolumeCatalog};
use flint::cli::{BackupCommand, Cli, Command, ConfigCommand};
use flint::config::{self, Config, EnvFile};
use flint::jobs::{BackupJob, RestoreJob, RestoreOutcome, RestoreRequest};
use flint::retention::RetentionSweeper;
use flint::runtime::{ContainerRuntime, DockerCli, ImageCache, BACKUP_LABEL};
use flint::ui::{table, PromptConfirm};
use flint::{utils, FlintError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration
    let config = config::resolve_project_dir(cli.project_dir.as_deref()).and_then(|dir| Config::load(&dir));

    // Initialize logging
    let log_level = cli
        .log_level
        .clone()
        .or_else(|| config.as_ref().ok().map(|c| c.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    if let Err(e) = utils::logger::init(&log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Command::Backup(command) => run_backup(command, cli.yes, &config).await,
        Command::Config(command) => run_config(command, &config),
    }
}

/// Backup commands that talk to the container runtime.
enum RuntimeCommand {
    Volumes,
    All,
    Volume(String),
    Restore { file: PathBuf, name: Option<String> },
}

async fn run_backup(command: BackupCommand, yes: bool, config: &Config) -> Result<()> {
    let command = match command {
        BackupCommand::List { json } => return list_archive_sets(config, json),
        BackupCommand::Cleanup { days } => return cleanup(config, days),
        BackupCommand::Volumes => RuntimeCommand::Volumes,
        BackupCommand::All => RuntimeCommand::All,
        BackupCommand::Volume { name } => RuntimeCommand::Volume(name),
        BackupCommand::Restore { file, name } => RuntimeCommand::Restore { file, name },
    };

    // Held for the rest of the command and released on every path.
    let runtime = DockerCli::connect(&config.docker_bin)
        .await
        .map_err(FlintError::from)?;
    let result = run_with_runtime(&runtime, command, yes, config).await;
    runtime.close().await;
    result
}

async fn run_with_runtime(
    runtime: &dyn ContainerRuntime,
    command: RuntimeCommand,
    yes: bool,
    config: &Config,
) -> Result<()> {
    let images = ImageCache::new();

    match command {
        RuntimeCommand::Volumes => {
            let volumes = VolumeCatalog::new(runtime).list_eligible().await?;
            if volumes.is_empty() {
                warn!("No volumes found with label '{}'", BACKUP_LABEL);
            } else {
                println!("{}", table::volumes_table(&volumes));
            }
        }
        RuntimeCommand::All => {
            let job = BackupJob::new(runtime, &images, &config.backup_dir, &config.helper_image);
            let result = job.backup_all().await?;
            if result.failed > 0 {
                warn!("{} of {} volumes failed to back up", result.failed, result.attempted);
            }
        }
        RuntimeCommand::Volume(name) => {
            let job = BackupJob::new(runtime, &images, &config.backup_dir, &config.helper_image);
            let result = job.backup_one(&name).await?;
            if result.failed > 0 {
                bail!("Backup of volume {} failed", name);
            }
        }
        RuntimeCommand::Restore { file, name } => {
            let confirm = PromptConfirm::terminal();
            let job = RestoreJob::new(runtime, &images, &confirm, &config.helper_image);
            let request = RestoreRequest {
                archive: file,
                volume: name,
                force: yes,
            };
            if let RestoreOutcome::Declined { volume } = job.restore(&request).await? {
                info!(volume = %volume, "Nothing was changed");
            }
        }
    }

    Ok(())
}

fn list_archive_sets(config: &Config, json: bool) -> Result<()> {
    let catalog = ArchiveCatalog::new(&config.backup_dir);
    let sets = catalog.list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sets)?);
    } else if sets.is_empty() {
        warn!("No backups found in {}", catalog.root().display());
    } else {
        println!("{}", table::archive_sets_table(&sets));
    }
    Ok(())
}

fn cleanup(config: &Config, days: u32) -> Result<()> {
    info!("Removing backups older than {} days", days);
    let report = RetentionSweeper::new(&config.backup_dir).sweep(days)?;

    info!("Removed {} old backup(s)", report.removed_count());
    if !report.failed.is_empty() {
        warn!("{} backup(s) could not be removed", report.failed.len());
    }
    Ok(())
}

fn run_config(command: ConfigCommand, config: &Config) -> Result<()> {
    match command {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("PROJECT_DIR={}", config.project_dir.display());
                println!("ENV_FILE={}", config.env_file.display());
                println!("BACKUP_DIR={}", config.backup_dir.display());
                println!("HELPER_IMAGE={}", config.helper_image);
                println!("DOCKER_BIN={}", config.docker_bin);
                println!("LOG_LEVEL={}", config.log_level);
            }
        }
        ConfigCommand::Get { key } => {
            let env = EnvFile::load(&config.env_file)?;
            match env.get(&key) {
                Some(value) => println!("{}", value),
                None => bail!("{} is not set in {}", key, config.env_file.display()),
            }
        }
        ConfigCommand::Set { key, value } => {
            let mut env = EnvFile::load(&config.env_file)?;
            env.set(&key, &value)?;
            env.save(&config.env_file)?;
            info!("Set {} in {}", key, config.env_file.display());
        }
    }
    Ok(())
}
