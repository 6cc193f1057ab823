//! Flint library
//!
//! Volume backup, restore and retention for a container-based media stack.
//! Each volume is archived by a short-lived helper container into a
//! timestamped archive set on the host.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod jobs;
pub mod retention;
pub mod runtime;
pub mod task;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use utils::errors::{FlintError, Result};
