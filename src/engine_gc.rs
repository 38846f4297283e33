use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::block::BlockChecksum;
use crate::config::BackupConfig;
use crate::error::{BackupError, Result};
use crate::locks::VolumeLocks;
use crate::manifest_store::ManifestStore;
use crate::metrics::Metrics;
use crate::paths;
use crate::store::{resolve_driver, BlockStore};
use crate::url::{parse_destination, BackupUrl};

/// Deletes one backup manifest and sweeps any block it referenced that
/// no surviving manifest for the same volume still references, plus
/// `delete_volume`, the wholesale removal path backing the "remove a
/// backup volume" CLI command.
pub struct GcEngine {
    locks: VolumeLocks,
    config: BackupConfig,
    metrics: Metrics,
}

impl GcEngine {
    pub fn new(config: BackupConfig) -> Self {
        GcEngine {
            locks: VolumeLocks::new(),
            config,
            metrics: Metrics::new(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Deletes the named backup and reclaims any block left
    /// unreferenced by every surviving manifest. Returns the number of
    /// block files reclaimed.
    pub async fn delete_backup(&self, backup_url: &str) -> Result<u64> {
        let url = BackupUrl::decode(backup_url)?;
        let _guard = self.locks.acquire(&url.volume_name).await;
        let driver = resolve_driver(&url.scheme, Path::new(&url.destination_root))?;
        self.delete_backup_locked(&driver, &url.volume_name, &url.backup_name)
            .await
    }

    /// Core of `delete_backup`, split out so `delete_volume` can call it
    /// once per surviving backup while holding a single volume lock for
    /// the whole operation instead of re-acquiring per backup.
    async fn delete_backup_locked(
        &self,
        driver: &Arc<dyn BlockStore>,
        volume_name: &str,
        backup_name: &str,
    ) -> Result<u64> {
        let manifest_store = ManifestStore::new(driver.clone());

        let mut volume_record = manifest_store
            .load_volume(volume_name)
            .await?
            .ok_or_else(|| BackupError::NotFound(format!("volume '{volume_name}' not found")))?;

        let target_manifest = manifest_store.load_backup(volume_name, backup_name).await?;

        let mut candidate_set: HashSet<BlockChecksum> = target_manifest
            .mappings
            .iter()
            .map(|m| m.checksum.clone())
            .collect();

        manifest_store.remove_backup(volume_name, backup_name).await?;

        if volume_record.last_backup_name == backup_name {
            volume_record.last_backup_name.clear();
            volume_record.last_backup_at = None;
        }

        let surviving = manifest_store.list_backup_names(volume_name).await?;

        if surviving.is_empty() {
            let mut reclaimed = 0u64;
            if self.config.sweep_on_last_delete {
                reclaimed = self
                    .sweep_blocks(driver, volume_name, &candidate_set)
                    .await?;
                volume_record.block_count = volume_record.block_count.saturating_sub(reclaimed);
            }
            manifest_store.remove_volume_record(volume_name).await?;
            self.metrics.record_gc_reclaimed(reclaimed);
            return Ok(reclaimed);
        }

        for name in surviving {
            if candidate_set.is_empty() {
                break;
            }
            let manifest = manifest_store.load_backup(volume_name, &name).await?;
            for mapping in &manifest.mappings {
                candidate_set.remove(&mapping.checksum);
            }
        }

        let reclaimed = self.sweep_blocks(driver, volume_name, &candidate_set).await?;
        volume_record.block_count = volume_record.block_count.saturating_sub(reclaimed);
        manifest_store.save_volume(&volume_record).await?;
        self.metrics.record_gc_reclaimed(reclaimed);
        Ok(reclaimed)
    }

    async fn sweep_blocks(
        &self,
        driver: &Arc<dyn BlockStore>,
        volume_name: &str,
        unreferenced: &HashSet<BlockChecksum>,
    ) -> Result<u64> {
        if unreferenced.is_empty() {
            return Ok(0);
        }
        let paths: Vec<String> = unreferenced
            .iter()
            .map(|cc| paths::block_path(volume_name, cc))
            .collect();
        let count = paths.len() as u64;
        driver.remove(&paths).await?;
        Ok(count)
    }

    /// Removes every surviving backup of a volume (sweeping blocks
    /// incrementally through the same path `delete_backup` uses), then
    /// the `VolumeRecord` and the volume's now-empty `blocks/` tree.
    pub async fn delete_volume(&self, destination: &str, volume_name: &str) -> Result<()> {
        let (scheme, root) = parse_destination(destination)?;
        let _guard = self.locks.acquire(volume_name).await;
        let driver = resolve_driver(&scheme, &root)?;
        let manifest_store = ManifestStore::new(driver.clone());

        if manifest_store.load_volume(volume_name).await?.is_none() {
            return Err(BackupError::NotFound(format!(
                "volume '{volume_name}' not found"
            )));
        }

        loop {
            let remaining = manifest_store.list_backup_names(volume_name).await?;
            let Some(name) = remaining.into_iter().next() else {
                break;
            };
            self.delete_backup_locked(&driver, volume_name, &name).await?;
        }

        // Sweep whatever is left under blocks/ (orphans from a prior
        // sweep_on_last_delete=false deletion, or partial uploads) before
        // dropping the record itself.
        let leftover = self.list_block_paths(&driver, volume_name).await?;
        if !leftover.is_empty() {
            driver.remove(&leftover).await?;
        }
        manifest_store.remove_volume_record(volume_name).await
    }

    /// Enumerates every block file under a volume's two-level fanout
    /// directory by walking the directory structure `list` exposes one
    /// level at a time (`BlockStore::list` is not recursive).
    async fn list_block_paths(
        &self,
        driver: &Arc<dyn BlockStore>,
        volume_name: &str,
    ) -> Result<Vec<String>> {
        let blocks_dir = paths::blocks_dir(volume_name);
        let mut out = Vec::new();
        for level1 in driver.list(&blocks_dir).await? {
            let level1_dir = format!("{blocks_dir}/{level1}");
            for level2 in driver.list(&level1_dir).await? {
                let level2_dir = format!("{level1_dir}/{level2}");
                for file in driver.list(&level2_dir).await? {
                    out.push(format!("{level2_dir}/{file}"));
                }
            }
        }
        Ok(out)
    }
}
