//! Read-only views over volumes (runtime side) and archive sets (disk side).

pub mod archives;
pub mod volumes;

pub use archives::{ArchiveCatalog, ArchiveSetSummary};
pub use volumes::VolumeCatalog;
