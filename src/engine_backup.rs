use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::block::{BlockChecksum, BlockMapping};
use crate::codec;
use crate::config::BackupConfig;
use crate::error::{BackupError, Result};
use crate::locks::VolumeLocks;
use crate::manifest::{merge_mappings, BackupManifest};
use crate::manifest_store::ManifestStore;
use crate::metrics::Metrics;
use crate::paths;
use crate::store::{resolve_driver, BlockStore};
use crate::url::{parse_destination, BackupUrl};
use crate::volume_ops::{Extent, Mappings, SnapshotGuard, VolumeOps};

/// Everything the caller supplies to start one backup.
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub volume_name: String,
    pub volume_size_bytes: u64,
    pub snapshot_name: String,
    pub snapshot_created_at: DateTime<Utc>,
    /// `<scheme>://<destination-root>`, no query string — the backup
    /// doesn't exist yet, so there's nothing to encode beyond where to
    /// put it.
    pub destination: String,
    pub labels: BTreeMap<String, String>,
}

/// Drives the resolve-baseline, compare, walk, upload, merge, persist
/// pipeline described above. Cheap to clone (every field is an `Arc` or
/// plain data) so an instance can be moved into the spawned upload-phase
/// task.
#[derive(Clone)]
pub struct DeltaBackupEngine {
    volume_ops: Arc<dyn VolumeOps>,
    config: BackupConfig,
    metrics: Metrics,
    locks: VolumeLocks,
}

impl DeltaBackupEngine {
    pub fn new(volume_ops: Arc<dyn VolumeOps>, config: BackupConfig) -> Self {
        DeltaBackupEngine {
            volume_ops,
            config,
            metrics: Metrics::new(),
            locks: VolumeLocks::new(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Runs the synchronous setup phase, then spawns the async upload
    /// phase and returns the new backup's name immediately. Errors from
    /// setup are returned directly; errors from the upload phase surface
    /// only through `UpdateBackupStatus`.
    pub async fn run_backup(&self, req: BackupRequest) -> Result<String> {
        let volume_guard = self.locks.acquire(&req.volume_name).await;

        let (scheme, root) = parse_destination(&req.destination)?;
        let driver = resolve_driver(&scheme, &root)?;
        let manifest_store = ManifestStore::new(driver.clone());

        let volume_record = manifest_store
            .ensure_volume(&req.volume_name, req.volume_size_bytes)
            .await?;

        let previous = if volume_record.has_previous_backup() {
            Some(
                manifest_store
                    .load_backup(&req.volume_name, &volume_record.last_backup_name)
                    .await?,
            )
        } else {
            None
        };

        let baseline = self.resolve_baseline(previous.as_ref(), &req).await?;

        let guard = SnapshotGuard::open(
            self.volume_ops.clone(),
            req.snapshot_name.clone(),
            req.volume_name.clone(),
        )
        .await?;

        let mappings = match self
            .volume_ops
            .compare_snapshot(&req.snapshot_name, baseline.as_deref(), &req.volume_name)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                guard.close().await.ok();
                return Err(e);
            }
        };

        if let Err(e) = self.validate_mappings(&mappings) {
            guard.close().await.ok();
            return Err(e);
        }

        let backup_name = format!("backup-{}", Uuid::new_v4());

        let engine = self.clone();
        let req = req.clone();
        let driver = driver.clone();
        let backup_name_for_task = backup_name.clone();
        tokio::spawn(async move {
            // Held for the lifetime of the upload phase: the volume's
            // mutating operations (this backup's manifest/volume-record
            // writes) stay serialized against any other backup or delete
            // the same process starts for this volume, not just against
            // the synchronous setup above.
            let _volume_guard = volume_guard;
            engine
                .run_upload_phase(req, backup_name_for_task, previous, mappings, driver, guard)
                .await;
        });

        Ok(backup_name)
    }

    /// Determine the baseline snapshot name, or `None` for a full
    /// backup. Branching logic only depends on the previous manifest,
    /// the current request, and one `has_snapshot` probe, so it's
    /// straightforward to unit test with a fake `VolumeOps`.
    async fn resolve_baseline(
        &self,
        previous: Option<&BackupManifest>,
        req: &BackupRequest,
    ) -> Result<Option<String>> {
        let previous = match previous {
            None => return Ok(None),
            Some(p) => p,
        };

        if previous.snapshot_name == req.snapshot_name {
            log::info!(
                "backup of {} requested against the same snapshot as the last backup; falling back to full",
                req.volume_name
            );
            return Ok(None);
        }

        if !self
            .volume_ops
            .has_snapshot(&previous.snapshot_name, &req.volume_name)
            .await?
        {
            log::warn!(
                "previous snapshot '{}' for volume '{}' is no longer present locally; falling back to full backup",
                previous.snapshot_name,
                req.volume_name
            );
            return Ok(None);
        }

        Ok(Some(previous.snapshot_name.clone()))
    }

    fn validate_mappings(&self, mappings: &Mappings) -> Result<()> {
        if mappings.block_size != self.config.block_size {
            return Err(BackupError::Configuration(format!(
                "comparator block size {} does not match configured block size {}",
                mappings.block_size, self.config.block_size
            )));
        }
        for extent in &mappings.extents {
            if extent.size == 0 || extent.size % mappings.block_size != 0 {
                return Err(BackupError::Logic(format!(
                    "extent at offset {} has size {} which is not a positive multiple of block size {}",
                    extent.offset, extent.size, mappings.block_size
                )));
            }
        }
        Ok(())
    }

    async fn run_upload_phase(
        &self,
        req: BackupRequest,
        backup_name: String,
        previous: Option<BackupManifest>,
        mappings: Mappings,
        driver: Arc<dyn BlockStore>,
        guard: SnapshotGuard,
    ) {
        let result = self
            .upload_and_persist(&req, &backup_name, previous, &mappings, &driver, &guard)
            .await;

        if let Err(e) = guard.close().await {
            log::warn!(
                "CloseSnapshot failed for snapshot '{}' volume '{}': {e}",
                req.snapshot_name,
                req.volume_name
            );
        }

        match result {
            Ok((url, _)) => {
                self.volume_ops
                    .update_backup_status(
                        &req.snapshot_name,
                        &req.volume_name,
                        100,
                        Some(&url),
                        None,
                    )
                    .await;
            }
            Err((e, last_progress)) => {
                self.volume_ops
                    .update_backup_status(
                        &req.snapshot_name,
                        &req.volume_name,
                        last_progress,
                        None,
                        Some(&e.to_string()),
                    )
                    .await;
            }
        }
    }

    /// Steps 6-9: walk blocks, dedup/upload, merge, persist manifest
    /// and volume record. Returns the encoded backup URL on success, or
    /// the error plus last-known progress on failure (so the caller can
    /// still report a meaningful status).
    async fn upload_and_persist(
        &self,
        req: &BackupRequest,
        backup_name: &str,
        previous: Option<BackupManifest>,
        mappings: &Mappings,
        driver: &Arc<dyn BlockStore>,
        guard: &SnapshotGuard,
    ) -> std::result::Result<(String, u32), (BackupError, u32)> {
        let mut new_mappings = Vec::new();
        let mut new_blocks: u64 = 0;
        let total_extents = mappings.extents.len().max(1);
        let mut last_progress = 0u32;

        for (done, extent) in mappings.extents.iter().enumerate() {
            if let Err(e) = self
                .walk_extent(req, guard, extent, mappings.block_size, driver, &mut new_mappings, &mut new_blocks)
                .await
            {
                return Err((e, last_progress));
            }

            let progress = ((done + 1) as u64 * self.config.progress_cap_percent as u64
                / total_extents as u64) as u32;
            last_progress = progress.min(self.config.progress_cap_percent);
            self.volume_ops
                .update_backup_status(
                    &req.snapshot_name,
                    &req.volume_name,
                    last_progress,
                    None,
                    None,
                )
                .await;
        }

        let previous_mappings: &[BlockMapping] = previous
            .as_ref()
            .map(|p| p.mappings.as_slice())
            .unwrap_or(&[]);
        let merged = merge_mappings(&new_mappings, previous_mappings);
        crate::block::validate_mappings(&merged, mappings.block_size, Some(req.volume_size_bytes))
            .map_err(|msg| (BackupError::Logic(format!("merged manifest is malformed: {msg}")), last_progress))?;

        let manifest = BackupManifest {
            name: backup_name.to_string(),
            volume_name: req.volume_name.clone(),
            snapshot_name: req.snapshot_name.clone(),
            snapshot_created_at: req.snapshot_created_at,
            created_at: Utc::now(),
            mappings: merged,
            labels: req.labels.clone(),
            block_size: mappings.block_size,
        };

        let (_scheme, root) = parse_destination(&req.destination).map_err(|e| (e, last_progress))?;
        let manifest_store = ManifestStore::new(driver.clone());
        manifest_store
            .save_backup(&manifest)
            .await
            .map_err(|e| (e, last_progress))?;

        let mut volume_record = manifest_store
            .load_volume(&req.volume_name)
            .await
            .map_err(|e| (e, last_progress))?
            .ok_or_else(|| {
                (
                    BackupError::NotFound(format!("volume record for '{}' vanished", req.volume_name)),
                    last_progress,
                )
            })?;
        volume_record.last_backup_name = backup_name.to_string();
        volume_record.last_backup_at = Some(manifest.created_at);
        volume_record.block_count += new_blocks;
        manifest_store
            .save_volume(&volume_record)
            .await
            .map_err(|e| (e, last_progress))?;

        let url = BackupUrl::new(scheme_only(&req.destination), root.display().to_string(), req.volume_name.clone(), backup_name.to_string())
            .encode();

        Ok((url, 100))
    }

    async fn walk_extent(
        &self,
        req: &BackupRequest,
        guard: &SnapshotGuard,
        extent: &Extent,
        block_size: u64,
        driver: &Arc<dyn BlockStore>,
        new_mappings: &mut Vec<BlockMapping>,
        new_blocks: &mut u64,
    ) -> Result<()> {
        let mut offset = extent.offset;
        let end = extent.offset + extent.size;
        let mut buffer = vec![0u8; block_size as usize];

        while offset < end {
            self.volume_ops
                .read_snapshot(guard.snapshot_id(), guard.volume_id(), offset, &mut buffer)
                .await?;

            let checksum = BlockChecksum::of(&buffer);
            let path = paths::block_path(&req.volume_name, &checksum);

            if driver.file_size(&path).await? >= 0 {
                self.metrics.record_dedup_hit();
            } else {
                let framed = codec::compress_block(&buffer, self.config.compression_level)?;
                let len = framed.len() as u64;
                driver.write(&path, framed).await?;
                self.metrics.record_upload(len);
                *new_blocks += 1;
            }

            new_mappings.push(BlockMapping::new(offset, checksum));
            offset += block_size;
        }
        Ok(())
    }
}

fn scheme_only(destination: &str) -> String {
    destination
        .split_once("://")
        .map(|(s, _)| s.to_string())
        .unwrap_or_else(|| "file".to_string())
}
