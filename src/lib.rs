//! Content-addressed, deduplicating, block-level incremental backup
//! engine for volume snapshots. See `DESIGN.md` for how each module
//! maps onto the algorithm this crate implements.

pub mod block;
pub mod cli;
pub mod codec;
pub mod config;
pub mod device;
pub mod engine_backup;
pub mod engine_gc;
pub mod engine_restore;
pub mod error;
pub mod locks;
pub mod logging;
pub mod manifest;
pub mod manifest_store;
pub mod metrics;
pub mod paths;
pub mod store;
pub mod url;
pub mod volume_ops;

pub use block::{BlockChecksum, BlockMapping};
pub use config::BackupConfig;
pub use engine_backup::{BackupRequest, DeltaBackupEngine};
pub use engine_gc::GcEngine;
pub use engine_restore::{NameValidator, RestoreEngine};
pub use error::{BackupError, Result};
pub use manifest::{BackupManifest, VolumeRecord};
pub use metrics::Metrics;
pub use store::{BlockStore, LocalFsStore};
pub use url::BackupUrl;
pub use volume_ops::{Extent, Mappings, SnapshotGuard, VolumeOps};
