use std::path::Path;
use std::sync::Arc;

use crate::block::BlockMapping;
use crate::codec;
use crate::device::RestoreTarget;
use crate::error::{BackupError, Result};
use crate::manifest::BackupManifest;
use crate::manifest_store::ManifestStore;
use crate::paths;
use crate::store::{resolve_driver, BlockStore};
use crate::url::BackupUrl;

/// Syntax policy for a caller-supplied `last_backup_name` going into
/// incremental restore. The actual naming policy is left up to the
/// caller; the default matches the charset this crate itself generates
/// for backup names.
pub trait NameValidator: Send + Sync {
    fn validate(&self, name: &str) -> Result<()>;
}

pub struct DefaultNameValidator;

impl NameValidator for DefaultNameValidator {
    fn validate(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(BackupError::Configuration(
                "last_backup_name must not be empty".to_string(),
            ));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(BackupError::Configuration(format!(
                "last_backup_name '{name}' contains characters outside [A-Za-z0-9_-]"
            )));
        }
        Ok(())
    }
}

/// Full and incremental restore. Both operations are a single
/// sequential pass over the store and the target device, no fan-out,
/// matching the core's concurrency model.
pub struct RestoreEngine {
    name_validator: Arc<dyn NameValidator>,
}

impl Default for RestoreEngine {
    fn default() -> Self {
        RestoreEngine {
            name_validator: Arc::new(DefaultNameValidator),
        }
    }
}

impl RestoreEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validator(name_validator: Arc<dyn NameValidator>) -> Self {
        RestoreEngine { name_validator }
    }

    async fn fetch_block(
        &self,
        driver: &Arc<dyn BlockStore>,
        volume_name: &str,
        mapping: &BlockMapping,
    ) -> Result<Vec<u8>> {
        let path = paths::block_path(volume_name, &mapping.checksum);
        if driver.file_size(&path).await? < 0 {
            return Err(BackupError::Integrity(format!(
                "block {} referenced by manifest is missing from the store",
                mapping.checksum
            )));
        }
        let framed = driver.read(&path).await?;
        codec::decompress_and_verify(&framed, &mapping.checksum)
    }

    /// Write every block of one manifest to `target_path`, in manifest
    /// order, then truncate (regular files only).
    pub async fn restore_full(&self, backup_url: &str, target_path: &Path) -> Result<()> {
        let url = BackupUrl::decode(backup_url)?;
        let driver = resolve_driver(&url.scheme, Path::new(&url.destination_root))?;
        let manifest_store = ManifestStore::new(driver.clone());

        let volume_record = manifest_store
            .load_volume(&url.volume_name)
            .await?
            .ok_or_else(|| BackupError::NotFound(format!("volume '{}' not found", url.volume_name)))?;

        if volume_record.size_bytes == 0 {
            return Err(BackupError::Configuration(format!(
                "volume '{}' has zero logical size",
                url.volume_name
            )));
        }

        let manifest = manifest_store
            .load_backup(&url.volume_name, &url.backup_name)
            .await?;

        if volume_record.size_bytes % manifest.block_size != 0 {
            return Err(BackupError::Configuration(format!(
                "volume size {} is not a multiple of block size {}",
                volume_record.size_bytes, manifest.block_size
            )));
        }

        let mut target = RestoreTarget::open(target_path)?;
        for mapping in &manifest.mappings {
            let plaintext = self.fetch_block(&driver, &url.volume_name, mapping).await?;
            target.write_at(mapping.offset, &plaintext)?;
        }
        target.finish(volume_record.size_bytes)
    }

    /// Simultaneous ordered merge-walk between `last_backup_name`
    /// (believed to already be on `target_path`) and the target backup
    /// URL's manifest, writing only what changed and zero-filling ranges
    /// the new manifest no longer covers.
    pub async fn restore_incremental(
        &self,
        backup_url: &str,
        target_path: &Path,
        last_backup_name: &str,
    ) -> Result<()> {
        self.name_validator.validate(last_backup_name)?;

        let url = BackupUrl::decode(backup_url)?;
        let driver = resolve_driver(&url.scheme, Path::new(&url.destination_root))?;
        let manifest_store = ManifestStore::new(driver.clone());

        let volume_record = manifest_store
            .load_volume(&url.volume_name)
            .await?
            .ok_or_else(|| BackupError::NotFound(format!("volume '{}' not found", url.volume_name)))?;

        let target_manifest = manifest_store
            .load_backup(&url.volume_name, &url.backup_name)
            .await?;
        let last_manifest = manifest_store
            .load_backup(&url.volume_name, last_backup_name)
            .await?;

        let mut target = RestoreTarget::open(target_path)?;
        let zero_block = vec![0u8; target_manifest.block_size as usize];

        let backup = &target_manifest.mappings;
        let last = &last_manifest.mappings;
        let mut b = 0usize;
        let mut l = 0usize;

        while b < backup.len() || l < last.len() {
            if b >= backup.len() {
                // `b` exhausted: every remaining `last` offset is no
                // longer part of the backup.
                target.write_at(last[l].offset, &zero_block)?;
                l += 1;
            } else if l >= last.len() {
                // `l` exhausted: every remaining `backup` offset is new.
                let plaintext = self
                    .fetch_block(&driver, &url.volume_name, &backup[b])
                    .await?;
                target.write_at(backup[b].offset, &plaintext)?;
                b += 1;
            } else if backup[b].offset == last[l].offset {
                if backup[b].checksum != last[l].checksum {
                    let plaintext = self
                        .fetch_block(&driver, &url.volume_name, &backup[b])
                        .await?;
                    target.write_at(backup[b].offset, &plaintext)?;
                }
                b += 1;
                l += 1;
            } else if backup[b].offset < last[l].offset {
                let plaintext = self
                    .fetch_block(&driver, &url.volume_name, &backup[b])
                    .await?;
                target.write_at(backup[b].offset, &plaintext)?;
                b += 1;
            } else {
                target.write_at(last[l].offset, &zero_block)?;
                l += 1;
            }
        }

        target.finish(volume_record.size_bytes)
    }
}
