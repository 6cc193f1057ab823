//! Utility modules for flint.

pub mod errors;
pub mod format;
pub mod logger;

pub use errors::{FlintError, Result, RuntimeError, TaskError};
