use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::block::BlockMapping;
use crate::config::DEFAULT_BLOCK_SIZE;

/// Created once, never mutated: a full description of a backup as an
/// ordered, self-contained list of block mappings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupManifest {
    pub name: String,
    pub volume_name: String,
    pub snapshot_name: String,
    pub snapshot_created_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub mappings: Vec<BlockMapping>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default = "default_block_size")]
    pub block_size: u64,
}

fn default_block_size() -> u64 {
    DEFAULT_BLOCK_SIZE
}

impl BackupManifest {
    /// Derived total size: block count × block size.
    pub fn total_size(&self) -> u64 {
        self.mappings.len() as u64 * self.block_size
    }
}

/// Per-volume metadata at the destination. A read-modify-write
/// structure; concurrent mutation within one volume is the caller's
/// responsibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub name: String,
    pub size_bytes: u64,
    pub last_backup_name: String,
    pub last_backup_at: Option<DateTime<Utc>>,
    /// Accounting-only count of distinct blocks referenced across all
    /// live backups of this volume; never used to decide dedup.
    pub block_count: u64,
}

impl VolumeRecord {
    pub fn new(name: impl Into<String>, size_bytes: u64) -> Self {
        VolumeRecord {
            name: name.into(),
            size_bytes,
            last_backup_name: String::new(),
            last_backup_at: None,
            block_count: 0,
        }
    }

    pub fn has_previous_backup(&self) -> bool {
        !self.last_backup_name.is_empty()
    }
}

/// Merge a delta's mappings (only the extents the comparator flagged as
/// changed) with the previous manifest's full mapping list, to produce
/// a new, self-contained, strictly-ascending mapping list.
///
/// Both inputs must already be strictly ascending by offset (callers
/// are expected to uphold this; it is not re-validated here since the
/// delta comes straight out of `BlockMapping` construction in offset
/// order and the previous manifest was itself produced by this
/// function). On a tie, `delta`'s mapping wins — new content supersedes
/// old at the same offset.
pub fn merge_mappings(delta: &[BlockMapping], previous: &[BlockMapping]) -> Vec<BlockMapping> {
    let mut out = Vec::with_capacity(delta.len() + previous.len());
    let mut di = 0;
    let mut pi = 0;

    while di < delta.len() && pi < previous.len() {
        let d = &delta[di];
        let p = &previous[pi];
        if d.offset == p.offset {
            out.push(d.clone());
            di += 1;
            pi += 1;
        } else if d.offset < p.offset {
            out.push(d.clone());
            di += 1;
        } else {
            out.push(p.clone());
            pi += 1;
        }
    }
    out.extend_from_slice(&delta[di..]);
    out.extend_from_slice(&previous[pi..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockChecksum;

    fn mapping(offset: u64, content: &[u8]) -> BlockMapping {
        BlockMapping::new(offset, BlockChecksum::of(content))
    }

    #[test]
    fn merge_preserves_unchanged_offsets() {
        // AAAA BBBB AAAA -> AAAA BBBB DDDD: unchanged offsets keep the
        // previous mapping, the changed tail comes from the delta.
        let previous = vec![
            mapping(0, b"A"),
            mapping(8, b"B"),
            mapping(16, b"A"),
        ];
        let delta = vec![mapping(24, b"D")];

        let merged = merge_mappings(&delta, &previous);
        assert_eq!(merged.len(), 4);
        assert_eq!(merged[0].offset, 0);
        assert_eq!(merged[1].offset, 8);
        assert_eq!(merged[2].offset, 16);
        assert_eq!(merged[3].offset, 24);
        assert_eq!(merged[3].checksum, BlockChecksum::of(b"D"));
    }

    #[test]
    fn merge_tie_prefers_delta() {
        let previous = vec![mapping(0, b"old")];
        let delta = vec![mapping(0, b"new")];
        let merged = merge_mappings(&delta, &previous);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].checksum, BlockChecksum::of(b"new"));
    }

    #[test]
    fn merge_with_empty_previous_is_just_delta() {
        let delta = vec![mapping(0, b"a"), mapping(8, b"b")];
        let merged = merge_mappings(&delta, &[]);
        assert_eq!(merged, delta);
    }

    #[test]
    fn merge_with_empty_delta_is_just_previous() {
        let previous = vec![mapping(0, b"a"), mapping(8, b"b")];
        let merged = merge_mappings(&[], &previous);
        assert_eq!(merged, previous);
    }

    #[test]
    fn merge_output_is_strictly_ascending_and_bounded() {
        let previous = vec![mapping(0, b"a"), mapping(16, b"c"), mapping(32, b"e")];
        let delta = vec![mapping(8, b"b"), mapping(16, b"C2"), mapping(40, b"f")];
        let merged = merge_mappings(&delta, &previous);

        assert!(merged.len() <= delta.len() + previous.len());
        for pair in merged.windows(2) {
            assert!(pair[0].offset < pair[1].offset);
        }
        // offset 16 came from delta (tie-break)
        let at_16 = merged.iter().find(|m| m.offset == 16).unwrap();
        assert_eq!(at_16.checksum, BlockChecksum::of(b"C2"));
    }

    #[test]
    fn volume_record_reports_previous_backup_presence() {
        let mut record = VolumeRecord::new("vol1", 1024);
        assert!(!record.has_previous_backup());
        record.last_backup_name = "backup-1".to_string();
        assert!(record.has_previous_backup());
    }
}
