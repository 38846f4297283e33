//! Store layout: where volume records, backup manifests, and blocks
//! live under a destination root. Volume and backup names come from
//! callers, so every name is percent-escaped before becoming a path
//! component — block path stays a pure function of volume name and
//! checksum even for adversarial names.

fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

pub fn volume_dir(volume_name: &str) -> String {
    format!("volumes/{}", encode_component(volume_name))
}

pub fn volume_record_path(volume_name: &str) -> String {
    format!("{}/volume.cfg", volume_dir(volume_name))
}

pub fn backups_dir(volume_name: &str) -> String {
    format!("{}/backups", volume_dir(volume_name))
}

pub fn backup_manifest_path(volume_name: &str, backup_name: &str) -> String {
    format!(
        "{}/backup_{}.cfg",
        backups_dir(volume_name),
        encode_component(backup_name)
    )
}

pub fn backup_name_from_manifest_filename(filename: &str) -> Option<&str> {
    filename.strip_prefix("backup_")?.strip_suffix(".cfg")
}

pub fn blocks_dir(volume_name: &str) -> String {
    format!("{}/blocks", volume_dir(volume_name))
}

pub fn block_path(volume_name: &str, checksum: &crate::block::BlockChecksum) -> String {
    format!("{}/{}", blocks_dir(volume_name), checksum.block_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockChecksum;

    #[test]
    fn volume_names_with_slashes_are_escaped() {
        let dir = volume_dir("a/b");
        assert_eq!(dir, "volumes/a%2Fb");
        assert!(!dir.ends_with("/b"));
    }

    #[test]
    fn block_path_round_trips_through_checksum_fanout() {
        let cc = BlockChecksum::of(b"payload");
        let path = block_path("vol1", &cc);
        assert!(path.starts_with("volumes/vol1/blocks/"));
        assert!(path.ends_with(&format!("{}.blk", cc)));
    }

    #[test]
    fn manifest_filename_round_trips() {
        let path = backup_manifest_path("vol1", "backup-42");
        let filename = path.rsplit('/').next().unwrap();
        assert_eq!(
            backup_name_from_manifest_filename(filename),
            Some("backup-42")
        );
    }
}
