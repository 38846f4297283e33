use std::sync::Arc;

use crate::error::{BackupError, Result};
use crate::manifest::{BackupManifest, VolumeRecord};
use crate::paths;
use crate::store::BlockStore;

/// Load/save of `VolumeRecord` and `BackupManifest`, plus enumeration
/// of backup names for a volume. Encoding is JSON over whatever
/// `BlockStore` the caller resolved from the destination URL's scheme.
pub struct ManifestStore {
    driver: Arc<dyn BlockStore>,
}

impl ManifestStore {
    pub fn new(driver: Arc<dyn BlockStore>) -> Self {
        ManifestStore { driver }
    }

    pub async fn load_volume(&self, volume_name: &str) -> Result<Option<VolumeRecord>> {
        let path = paths::volume_record_path(volume_name);
        if self.driver.file_size(&path).await? < 0 {
            return Ok(None);
        }
        let bytes = self.driver.read(&path).await?;
        let record: VolumeRecord = serde_json::from_slice(&bytes)?;
        Ok(Some(record))
    }

    pub async fn save_volume(&self, record: &VolumeRecord) -> Result<()> {
        let path = paths::volume_record_path(&record.name);
        let bytes = serde_json::to_vec_pretty(record)?;
        self.driver.write(&path, bytes).await
    }

    /// Create-or-reload: returns the existing `VolumeRecord` if present,
    /// otherwise creates and persists a fresh one.
    pub async fn ensure_volume(&self, volume_name: &str, size_bytes: u64) -> Result<VolumeRecord> {
        if let Some(record) = self.load_volume(volume_name).await? {
            return Ok(record);
        }
        let record = VolumeRecord::new(volume_name, size_bytes);
        self.save_volume(&record).await?;
        Ok(record)
    }

    pub async fn remove_volume_record(&self, volume_name: &str) -> Result<()> {
        let path = paths::volume_record_path(volume_name);
        self.driver.remove(&[path]).await
    }

    pub async fn load_backup(
        &self,
        volume_name: &str,
        backup_name: &str,
    ) -> Result<BackupManifest> {
        let path = paths::backup_manifest_path(volume_name, backup_name);
        if self.driver.file_size(&path).await? < 0 {
            return Err(BackupError::NotFound(format!(
                "backup '{backup_name}' not found for volume '{volume_name}'"
            )));
        }
        let bytes = self.driver.read(&path).await?;
        let manifest: BackupManifest = serde_json::from_slice(&bytes)?;
        Ok(manifest)
    }

    pub async fn save_backup(&self, manifest: &BackupManifest) -> Result<()> {
        let path = paths::backup_manifest_path(&manifest.volume_name, &manifest.name);
        let bytes = serde_json::to_vec_pretty(manifest)?;
        self.driver.write(&path, bytes).await
    }

    pub async fn remove_backup(&self, volume_name: &str, backup_name: &str) -> Result<()> {
        let path = paths::backup_manifest_path(volume_name, backup_name);
        self.driver.remove(&[path]).await
    }

    /// Every backup name currently persisted for a volume, derived from
    /// listing the `backups/` directory rather than tracked separately —
    /// the manifest files themselves are the source of truth.
    pub async fn list_backup_names(&self, volume_name: &str) -> Result<Vec<String>> {
        let prefix = paths::backups_dir(volume_name);
        let entries = self.driver.list(&prefix).await?;
        Ok(entries
            .iter()
            .filter_map(|f| paths::backup_name_from_manifest_filename(f))
            .map(|s| s.to_string())
            .collect())
    }
}
