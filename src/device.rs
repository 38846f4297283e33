use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::Path;

use crate::error::{BackupError, Result};

/// A restore target: either a regular file (created if absent,
/// truncated to the volume's logical size once restore completes) or a
/// block device (never truncated — that would be meaningless/unsafe).
pub struct RestoreTarget {
    file: File,
    is_block_device: bool,
}

impl RestoreTarget {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)
            .map_err(|e| BackupError::Io(format!("open {}: {e}", path.display())))?;

        let is_block_device = file
            .metadata()
            .map_err(|e| BackupError::Io(e.to_string()))?
            .file_type()
            .is_block_device();

        Ok(RestoreTarget {
            file,
            is_block_device,
        })
    }

    /// Write `data` at `offset`. Used for both real block content and
    /// zero-fill writes during incremental restore.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(BackupError::from)?;
        self.file.write_all(data).map_err(BackupError::from)
    }

    /// Truncate to `size` if this is a regular file; a no-op for block
    /// devices, whose size is fixed by the device itself.
    pub fn finish(mut self, size: u64) -> Result<()> {
        self.file.flush().map_err(BackupError::from)?;
        if !self.is_block_device {
            self.file.set_len(size).map_err(BackupError::from)?;
        }
        Ok(())
    }
}
