//! On-disk persistence.
//!
//! The learned state is saved as a plain-text snapshot at shutdown and loaded
//! at startup; a lock file keeps two agents off the same directory.

mod file_lock;
mod snapshot;

pub use file_lock::DataDirLock;
pub use snapshot::{load_snapshot, write_snapshot, LoadReport, SnapshotPaths, WriteReport};
