use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex-encoded BLAKE3 digest of a block's uncompressed content. Newtype
/// rather than a bare `String` so a checksum can't be accidentally
/// compared against an arbitrary path component or vice versa.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockChecksum(String);

impl BlockChecksum {
    pub fn of(plaintext: &[u8]) -> Self {
        BlockChecksum(blake3::hash(plaintext).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Relative path under a volume's `blocks/` directory:
    /// `<cc[0:2]>/<cc[2:4]>/<cc>.blk`. Fanned out two levels to keep any
    /// one directory from growing unbounded on backends that dislike
    /// large flat listings.
    pub fn block_path(&self) -> String {
        let cc = &self.0;
        debug_assert!(cc.len() >= 4, "checksum too short to fan out: {cc}");
        format!("{}/{}/{}.blk", &cc[0..2], &cc[2..4], cc)
    }
}

impl fmt::Display for BlockChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for BlockChecksum {
    fn from(s: String) -> Self {
        BlockChecksum(s)
    }
}

/// An (offset, checksum) pair. Offsets are always multiples of the
/// configured block size and unique within a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMapping {
    pub offset: u64,
    pub checksum: BlockChecksum,
}

impl BlockMapping {
    pub fn new(offset: u64, checksum: BlockChecksum) -> Self {
        BlockMapping { offset, checksum }
    }
}

/// Validate that mappings are strictly ascending by offset, every offset
/// is a multiple of `block_size`, and (if `volume_size` is given) every
/// offset is `< volume_size`.
pub fn validate_mappings(
    mappings: &[BlockMapping],
    block_size: u64,
    volume_size: Option<u64>,
) -> Result<(), String> {
    let mut last_offset: Option<u64> = None;
    for m in mappings {
        if block_size == 0 || m.offset % block_size != 0 {
            return Err(format!(
                "offset {} is not a multiple of block size {}",
                m.offset, block_size
            ));
        }
        if let Some(size) = volume_size {
            if m.offset >= size {
                return Err(format!("offset {} is >= volume size {}", m.offset, size));
            }
        }
        if let Some(last) = last_offset {
            if m.offset <= last {
                return Err(format!(
                    "mappings not strictly ascending: {} followed by {}",
                    last, m.offset
                ));
            }
        }
        last_offset = Some(m.offset);
    }
    Ok(())
}
