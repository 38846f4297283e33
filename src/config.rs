use serde::{Deserialize, Serialize};

/// Default fixed block size: 2 MiB, per the data model.
pub const DEFAULT_BLOCK_SIZE: u64 = 2 * 1024 * 1024;

/// Engine-wide tunables. Mirrors the shape of a typical preset/builder
/// config: a handful of named presets plus a fluent builder for tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Fixed block size in bytes. `CompareSnapshot` must report this
    /// exact value or the backup is rejected as a configuration error.
    pub block_size: u64,
    /// DEFLATE compression level (0-9) applied to blocks before upload.
    pub compression_level: u32,
    /// Upload-phase progress is capped at this percentage; the final
    /// jump to 100 happens only after manifest + volume record persist.
    pub progress_cap_percent: u32,
    /// Whether deleting a volume's last surviving backup also sweeps
    /// that backup's now-orphaned blocks. Default false, matching the
    /// documented (if arguably surprising) source behavior.
    pub sweep_on_last_delete: bool,
}

impl BackupConfig {
    pub fn production() -> Self {
        BackupConfig {
            block_size: DEFAULT_BLOCK_SIZE,
            compression_level: 6,
            progress_cap_percent: 95,
            sweep_on_last_delete: false,
        }
    }

    /// Small block size for fast, readable tests.
    pub fn testing() -> Self {
        let mut config = Self::production();
        config.block_size = 8;
        config.compression_level = 1;
        config
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.block_size == 0 {
            errors.push("block_size must be > 0".to_string());
        }
        if self.compression_level > 9 {
            errors.push("compression_level must be 0-9".to_string());
        }
        if self.progress_cap_percent > 100 {
            errors.push("progress_cap_percent must be <= 100".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        BackupConfig::production()
    }
}

/// Fluent builder, used mainly by tests that only want to override one
/// or two fields off of a preset.
pub struct ConfigBuilder {
    config: BackupConfig,
}

impl ConfigBuilder {
    pub fn from_preset(preset: &str) -> Self {
        let config = match preset {
            "testing" => BackupConfig::testing(),
            _ => BackupConfig::production(),
        };
        ConfigBuilder { config }
    }

    pub fn block_size(mut self, size: u64) -> Self {
        self.config.block_size = size;
        self
    }

    pub fn sweep_on_last_delete(mut self, sweep: bool) -> Self {
        self.config.sweep_on_last_delete = sweep;
        self
    }

    pub fn build(self) -> anyhow::Result<BackupConfig> {
        self.config
            .validate()
            .map_err(|errs| anyhow::anyhow!("configuration validation failed: {}", errs.join("; ")))?;
        Ok(self.config)
    }
}
