use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// In-process, per-engine-instance counters. Not exported anywhere;
/// exists so tests and a CLI `status`-style command can observe dedup
/// and GC behavior without parsing log output.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    pub blocks_uploaded: Arc<AtomicU64>,
    pub blocks_deduped: Arc<AtomicU64>,
    pub bytes_uploaded: Arc<AtomicU64>,
    pub gc_blocks_reclaimed: Arc<AtomicU64>,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics::default()
    }

    pub fn record_upload(&self, bytes: u64) {
        self.blocks_uploaded.fetch_add(1, Ordering::Relaxed);
        self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_dedup_hit(&self) {
        self.blocks_deduped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gc_reclaimed(&self, count: u64) {
        self.gc_blocks_reclaimed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            blocks_uploaded: self.blocks_uploaded.load(Ordering::Relaxed),
            blocks_deduped: self.blocks_deduped.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            gc_blocks_reclaimed: self.gc_blocks_reclaimed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub blocks_uploaded: u64,
    pub blocks_deduped: u64,
    pub bytes_uploaded: u64,
    pub gc_blocks_reclaimed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = Metrics::new();
        m.record_upload(10);
        m.record_upload(20);
        m.record_dedup_hit();
        m.record_gc_reclaimed(3);

        let snap = m.snapshot();
        assert_eq!(snap.blocks_uploaded, 2);
        assert_eq!(snap.bytes_uploaded, 30);
        assert_eq!(snap.blocks_deduped, 1);
        assert_eq!(snap.gc_blocks_reclaimed, 3);
    }
}
