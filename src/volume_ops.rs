use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// One contiguous range that differs between two snapshots (or, for a
/// full backup, one range covering live data). Size must be a positive
/// multiple of the reported block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub offset: u64,
    pub size: u64,
}

/// What `CompareSnapshot` returns: the block size the comparator used,
/// plus the ordered list of differing extents.
#[derive(Debug, Clone)]
pub struct Mappings {
    pub block_size: u64,
    pub extents: Vec<Extent>,
}

/// The capability set the engine consumes from the snapshot/volume
/// manager. Implementations are supplied by the caller; this crate
/// never implements this trait outside of tests.
#[async_trait]
pub trait VolumeOps: Send + Sync {
    async fn has_snapshot(&self, snapshot_id: &str, volume_id: &str) -> Result<bool>;

    /// `baseline_id = None` requests a full comparison (every live
    /// extent of `snapshot_id`, as a set of differing-from-nothing
    /// extents); `Some` requests a diff against that baseline snapshot.
    async fn compare_snapshot(
        &self,
        snapshot_id: &str,
        baseline_id: Option<&str>,
        volume_id: &str,
    ) -> Result<Mappings>;

    async fn open_snapshot(&self, snapshot_id: &str, volume_id: &str) -> Result<()>;

    async fn read_snapshot(
        &self,
        snapshot_id: &str,
        volume_id: &str,
        offset: u64,
        buffer: &mut [u8],
    ) -> Result<()>;

    async fn close_snapshot(&self, snapshot_id: &str, volume_id: &str) -> Result<()>;

    async fn update_backup_status(
        &self,
        snapshot_id: &str,
        volume_id: &str,
        progress_percent: u32,
        backup_url: Option<&str>,
        error_message: Option<&str>,
    );
}

/// RAII guard over the `OpenSnapshot`/`CloseSnapshot` pair implementing
/// a scoped snapshot lifetime: `CloseSnapshot` runs on every exit path,
/// including an error return or an unwind, because it happens in `Drop`.
///
/// Holds an owned `Arc` rather than a borrow so `Drop` can spawn a
/// detached `'static` task to run the close when the caller never
/// reaches the explicit, error-observing `close()` — the only way to
/// guarantee cleanup across a panic unwind without making `Drop` itself
/// async (which the language doesn't support).
pub struct SnapshotGuard {
    ops: Arc<dyn VolumeOps>,
    snapshot_id: String,
    volume_id: String,
    closed: bool,
}

impl SnapshotGuard {
    pub async fn open(
        ops: Arc<dyn VolumeOps>,
        snapshot_id: impl Into<String>,
        volume_id: impl Into<String>,
    ) -> Result<SnapshotGuard> {
        let snapshot_id = snapshot_id.into();
        let volume_id = volume_id.into();
        ops.open_snapshot(&snapshot_id, &volume_id).await?;
        Ok(SnapshotGuard {
            ops,
            snapshot_id,
            volume_id,
            closed: false,
        })
    }

    pub fn snapshot_id(&self) -> &str {
        &self.snapshot_id
    }

    pub fn volume_id(&self) -> &str {
        &self.volume_id
    }

    /// Explicit close on the happy path, so a late I/O error from
    /// `CloseSnapshot` can still be observed; `Drop` is the fallback
    /// that guarantees it runs even if this is never called.
    pub async fn close(mut self) -> Result<()> {
        self.closed = true;
        self.ops.close_snapshot(&self.snapshot_id, &self.volume_id).await
    }
}

impl Drop for SnapshotGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let ops = self.ops.clone();
        let snapshot_id = self.snapshot_id.clone();
        let volume_id = self.volume_id.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = ops.close_snapshot(&snapshot_id, &volume_id).await {
                    log::warn!("CloseSnapshot failed during drop: {e}");
                }
            });
        } else {
            log::warn!(
                "SnapshotGuard dropped outside a tokio runtime; CloseSnapshot for {snapshot_id}/{volume_id} was not called"
            );
        }
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory `VolumeOps` double: snapshots are named byte buffers.
    /// `compare_snapshot` does a naive block-by-block diff against the
    /// baseline (or reports everything changed if there is none),
    /// enough to drive full, incremental, and dedup backup scenarios.
    pub struct FakeVolumeOps {
        pub snapshots: HashMap<String, Vec<u8>>,
        pub block_size: u64,
        pub opened: Mutex<Vec<String>>,
        pub closed: Mutex<Vec<String>>,
        pub statuses: Mutex<Vec<(u32, Option<String>, Option<String>)>>,
    }

    impl FakeVolumeOps {
        pub fn new(block_size: u64) -> Self {
            FakeVolumeOps {
                snapshots: HashMap::new(),
                block_size,
                opened: Mutex::new(Vec::new()),
                closed: Mutex::new(Vec::new()),
                statuses: Mutex::new(Vec::new()),
            }
        }

        pub fn with_snapshot(mut self, name: impl Into<String>, content: Vec<u8>) -> Self {
            self.snapshots.insert(name.into(), content);
            self
        }
    }

    #[async_trait]
    impl VolumeOps for FakeVolumeOps {
        async fn has_snapshot(&self, snapshot_id: &str, _volume_id: &str) -> Result<bool> {
            Ok(self.snapshots.contains_key(snapshot_id))
        }

        async fn compare_snapshot(
            &self,
            snapshot_id: &str,
            baseline_id: Option<&str>,
            _volume_id: &str,
        ) -> Result<Mappings> {
            let current = self.snapshots.get(snapshot_id).ok_or_else(|| {
                crate::error::BackupError::NotFound(format!("snapshot {snapshot_id} not found"))
            })?;
            let baseline = baseline_id.and_then(|id| self.snapshots.get(id));

            let mut extents = Vec::new();
            let block_size = self.block_size as usize;
            let mut offset = 0u64;
            let total_blocks = (current.len() + block_size - 1) / block_size;
            let mut run_start: Option<u64> = None;

            for i in 0..total_blocks {
                let start = i * block_size;
                let end = (start + block_size).min(current.len());
                let cur_block = &current[start..end];
                let changed = match baseline {
                    None => true,
                    Some(base) => {
                        let base_block = base.get(start..end.min(base.len()));
                        base_block != Some(cur_block)
                    }
                };
                if changed {
                    if run_start.is_none() {
                        run_start = Some(offset);
                    }
                } else if let Some(start_off) = run_start.take() {
                    extents.push(Extent {
                        offset: start_off,
                        size: offset - start_off,
                    });
                }
                offset += block_size as u64;
            }
            if let Some(start_off) = run_start {
                extents.push(Extent {
                    offset: start_off,
                    size: offset - start_off,
                });
            }

            Ok(Mappings {
                block_size: self.block_size,
                extents,
            })
        }

        async fn open_snapshot(&self, snapshot_id: &str, _volume_id: &str) -> Result<()> {
            self.opened.lock().unwrap().push(snapshot_id.to_string());
            Ok(())
        }

        async fn read_snapshot(
            &self,
            snapshot_id: &str,
            _volume_id: &str,
            offset: u64,
            buffer: &mut [u8],
        ) -> Result<()> {
            let content = self.snapshots.get(snapshot_id).ok_or_else(|| {
                crate::error::BackupError::NotFound(format!("snapshot {snapshot_id} not found"))
            })?;
            let start = offset as usize;
            let end = (start + buffer.len()).min(content.len());
            buffer.fill(0);
            if start < content.len() {
                buffer[..end - start].copy_from_slice(&content[start..end]);
            }
            Ok(())
        }

        async fn close_snapshot(&self, snapshot_id: &str, _volume_id: &str) -> Result<()> {
            self.closed.lock().unwrap().push(snapshot_id.to_string());
            Ok(())
        }

        async fn update_backup_status(
            &self,
            _snapshot_id: &str,
            _volume_id: &str,
            progress_percent: u32,
            backup_url: Option<&str>,
            error_message: Option<&str>,
        ) {
            self.statuses.lock().unwrap().push((
                progress_percent,
                backup_url.map(|s| s.to_string()),
                error_message.map(|s| s.to_string()),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::FakeVolumeOps;

    #[tokio::test]
    async fn guard_close_records_close_call() {
        let concrete = Arc::new(FakeVolumeOps::new(8).with_snapshot("snap1", b"AAAABBBB".to_vec()));
        let ops: Arc<dyn VolumeOps> = concrete.clone();
        let guard = SnapshotGuard::open(ops, "snap1", "vol1").await.unwrap();
        guard.close().await.unwrap();

        assert_eq!(concrete.closed.lock().unwrap().as_slice(), &["snap1".to_string()]);
    }

    #[tokio::test]
    async fn guard_drop_without_explicit_close_still_closes() {
        let ops = Arc::new(FakeVolumeOps::new(8).with_snapshot("snap1", b"AAAABBBB".to_vec()));
        {
            let _guard = SnapshotGuard::open(ops.clone(), "snap1", "vol1")
                .await
                .unwrap();
            // guard dropped here without calling close()
        }
        // Drop spawns a detached task; give the runtime a moment to run it.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(ops.closed.lock().unwrap().as_slice(), &["snap1".to_string()]);
    }
}
