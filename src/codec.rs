use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::block::BlockChecksum;
use crate::error::{BackupError, Result};

/// On-disk framing for a compressed block: a small fixed header
/// (uncompressed length + CRC32 of the compressed bytes) followed by
/// the DEFLATE stream. The CRC catches a truncated/corrupted blob
/// before decompression is even attempted, separate from the BLAKE3
/// content hash that addresses the block.
const HEADER_LEN: usize = 12;
const MAGIC: u32 = 0xDE1A_0001;

/// Compress a plaintext block for storage. Returns the framed bytes
/// ready to hand to `BlockStore::write`.
pub fn compress_block(plaintext: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(level));
    encoder
        .write_all(plaintext)
        .map_err(|e| BackupError::Integrity(format!("compression failed: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| BackupError::Integrity(format!("compression failed: {e}")))?;

    let crc = crc32fast::hash(&compressed);
    let mut framed = Vec::with_capacity(HEADER_LEN + compressed.len());
    framed.extend_from_slice(&MAGIC.to_le_bytes());
    framed.extend_from_slice(&crc.to_le_bytes());
    framed.extend_from_slice(&(plaintext.len() as u32).to_le_bytes());
    framed.extend_from_slice(&compressed);
    Ok(framed)
}

/// Decompress a framed block and verify its content against the
/// declared checksum. Any mismatch — header corruption, CRC mismatch,
/// DEFLATE failure, or hash mismatch — is an `Integrity` error.
pub fn decompress_and_verify(framed: &[u8], expected: &BlockChecksum) -> Result<Vec<u8>> {
    if framed.len() < HEADER_LEN {
        return Err(BackupError::Integrity(
            "compressed block shorter than header".to_string(),
        ));
    }
    let magic = u32::from_le_bytes(framed[0..4].try_into().unwrap());
    if magic != MAGIC {
        return Err(BackupError::Integrity(
            "compressed block has bad magic".to_string(),
        ));
    }
    let stored_crc = u32::from_le_bytes(framed[4..8].try_into().unwrap());
    let _plaintext_len = u32::from_le_bytes(framed[8..12].try_into().unwrap());
    let compressed = &framed[HEADER_LEN..];

    let actual_crc = crc32fast::hash(compressed);
    if actual_crc != stored_crc {
        return Err(BackupError::Integrity(
            "compressed payload corrupt (CRC mismatch)".to_string(),
        ));
    }

    let mut decoder = DeflateDecoder::new(compressed);
    let mut plaintext = Vec::new();
    decoder
        .read_to_end(&mut plaintext)
        .map_err(|e| BackupError::Integrity(format!("decompression failed: {e}")))?;

    let actual_checksum = BlockChecksum::of(&plaintext);
    if &actual_checksum != expected {
        return Err(BackupError::Integrity(format!(
            "checksum mismatch: expected {expected}, got {actual_checksum}"
        )));
    }

    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_content() {
        let plaintext = b"the quick brown fox jumps over the lazy dog".repeat(100);
        let checksum = BlockChecksum::of(&plaintext);
        let framed = compress_block(&plaintext, 6).unwrap();
        let out = decompress_and_verify(&framed, &checksum).unwrap();
        assert_eq!(out, plaintext);
    }

    #[test]
    fn checksum_mismatch_is_rejected() {
        let plaintext = b"hello world";
        let wrong = BlockChecksum::of(b"not hello world");
        let framed = compress_block(plaintext, 1).unwrap();
        let err = decompress_and_verify(&framed, &wrong).unwrap_err();
        assert!(matches!(err, BackupError::Integrity(_)));
    }

    #[test]
    fn corrupted_compressed_bytes_are_rejected() {
        let plaintext = b"hello world, this is a test payload";
        let checksum = BlockChecksum::of(plaintext);
        let mut framed = compress_block(plaintext, 6).unwrap();
        let last = framed.len() - 1;
        framed[last] ^= 0xFF;
        let err = decompress_and_verify(&framed, &checksum).unwrap_err();
        assert!(matches!(err, BackupError::Integrity(_)));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let err = decompress_and_verify(&[0u8; 4], &BlockChecksum::of(b"x")).unwrap_err();
        assert!(matches!(err, BackupError::Integrity(_)));
    }
}
