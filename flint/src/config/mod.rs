//! Configuration management for flint.
//!
//! Settings come from the project's `.env` file with environment variable
//! overrides. Precedence: non-empty environment variable, then `.env`, then
//! the built-in default.

pub mod env_file;

pub use env_file::EnvFile;

use crate::utils::errors::{FlintError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the project directory.
pub const PROJECT_DIR_ENV: &str = "FLINT_PROJECT_DIR";

/// File marking a project root.
pub const COMPOSE_FILE: &str = "docker-compose.yml";

pub const ENV_FILE: &str = ".env";

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Project root (directory holding `docker-compose.yml`)
    pub project_dir: PathBuf,

    /// The project's `.env` file
    pub env_file: PathBuf,

    /// Root under which archive sets are created
    pub backup_dir: PathBuf,

    /// Image used for backup and restore tasks
    pub helper_image: String,

    /// Container runtime client executable
    pub docker_bin: String,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

// Default values
fn default_helper_image() -> String {
    "alpine:latest".to_string()
}

fn default_docker_bin() -> String {
    "docker".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration for the project rooted at `project_dir`.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let env_path = project_dir.join(ENV_FILE);
        let env = EnvFile::load(&env_path)?;
        Ok(Self::from_sources(project_dir, &env, |key| std::env::var(key).ok()))
    }

    /// Build a config from a parsed `.env` and an environment lookup.
    pub fn from_sources(
        project_dir: &Path,
        env: &EnvFile,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let values = env.values();
        let get = |key: &str| -> Option<String> {
            lookup(key)
                .filter(|v| !v.is_empty())
                .or_else(|| values.get(key).filter(|v| !v.is_empty()).cloned())
        };

        let backup_dir = match get("BACKUP_DIR") {
            Some(dir) => project_dir.join(dir),
            None => project_dir.join("backups"),
        };

        Self {
            project_dir: project_dir.to_path_buf(),
            env_file: project_dir.join(ENV_FILE),
            backup_dir,
            helper_image: get("HELPER_IMAGE").unwrap_or_else(default_helper_image),
            docker_bin: get("DOCKER_BIN").unwrap_or_else(default_docker_bin),
            log_level: get("LOG_LEVEL").unwrap_or_else(default_log_level),
        }
    }
}

/// Determine the project root.
///
/// An explicit directory (from `--project-dir` or `FLINT_PROJECT_DIR`) must
/// contain `docker-compose.yml`. Otherwise the current directory and its
/// ancestors are searched.
pub fn resolve_project_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        let abs = std::path::absolute(dir).map_err(|source| FlintError::Filesystem {
            path: dir.to_path_buf(),
            source,
        })?;
        if !abs.join(COMPOSE_FILE).is_file() {
            return Err(FlintError::Config(format!(
                "{} not found in {}",
                COMPOSE_FILE,
                abs.display()
            )));
        }
        return Ok(abs);
    }

    let cwd = std::env::current_dir()?;
    find_project_root(&cwd).ok_or_else(|| {
        FlintError::Config(format!(
            "{} not found (use --project-dir or set {})",
            COMPOSE_FILE, PROJECT_DIR_ENV
        ))
    })
}

/// Nearest ancestor of `start` (inclusive) holding `docker-compose.yml`.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(COMPOSE_FILE).is_file())
        .map(Path::to_path_buf)
}
