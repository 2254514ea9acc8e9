mod history;
mod inclusion;
pub mod backup;
pub mod persistence;

pub use backup::{BackupInfo, BackupStore, SnapshotReason};
pub use history::{HistoryStatistics, HistoryStore, Turn};
pub use inclusion::{
    is_supported_file, AvailableFile, FileResolver, InclusionOutcome, Resolution,
};
