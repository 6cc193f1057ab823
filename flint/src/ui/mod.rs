//! Operator-facing prompts and listings.

pub mod confirm;
pub mod table;

pub use confirm::{Confirm, PromptConfirm};
