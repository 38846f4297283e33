use std::path::PathBuf;

use crate::error::{BackupError, Result};

/// Split a bare destination (no backup/volume query, used to start a new
/// backup before a `BackupUrl` can be formed) into its store scheme and
/// root path: `<scheme>://<root>`.
pub fn parse_destination(raw: &str) -> Result<(String, PathBuf)> {
    let (scheme, root) = raw.split_once("://").ok_or_else(|| {
        BackupError::Configuration(format!("malformed destination URL: {raw}"))
    })?;
    Ok((scheme.to_string(), PathBuf::from(root)))
}

/// Opaque identifier encoding (backup name, volume name, destination
/// root). Format: `<scheme>://<destination-root>?backup=<name>&volume=<volume>`.
///
/// General-purpose URL parsing (arbitrary percent-decoding, query
/// strings with repeated keys, etc.) is explicitly a CLI concern, not
/// this crate's — this only escapes the three characters that would
/// otherwise break the `?key=value&key=value` shape, so the encoding
/// stays a pure, reversible function of its three fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupUrl {
    pub backup_name: String,
    pub volume_name: String,
    pub destination_root: String,
    pub scheme: String,
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            '?' => out.push_str("%3F"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' {
            let hex: String = chars.by_ref().take(2).collect();
            match u8::from_str_radix(&hex, 16) {
                Ok(byte) => out.push(byte as char),
                Err(_) => {
                    out.push('%');
                    out.push_str(&hex);
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

impl BackupUrl {
    pub fn new(
        scheme: impl Into<String>,
        destination_root: impl Into<String>,
        volume_name: impl Into<String>,
        backup_name: impl Into<String>,
    ) -> Self {
        BackupUrl {
            scheme: scheme.into(),
            destination_root: destination_root.into(),
            volume_name: volume_name.into(),
            backup_name: backup_name.into(),
        }
    }

    pub fn encode(&self) -> String {
        format!(
            "{}://{}?backup={}&volume={}",
            self.scheme,
            escape(&self.destination_root),
            escape(&self.backup_name),
            escape(&self.volume_name)
        )
    }

    pub fn decode(raw: &str) -> Result<BackupUrl> {
        let (scheme, rest) = raw.split_once("://").ok_or_else(|| {
            BackupError::Configuration(format!("malformed backup URL (missing scheme): {raw}"))
        })?;
        let (root, query) = rest.split_once('?').ok_or_else(|| {
            BackupError::Configuration(format!("malformed backup URL (missing query): {raw}"))
        })?;

        let mut backup_name = None;
        let mut volume_name = None;
        for pair in query.split('&') {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                BackupError::Configuration(format!("malformed backup URL query: {raw}"))
            })?;
            match key {
                "backup" => backup_name = Some(unescape(value)),
                "volume" => volume_name = Some(unescape(value)),
                _ => {}
            }
        }

        Ok(BackupUrl {
            scheme: scheme.to_string(),
            destination_root: unescape(root),
            backup_name: backup_name.ok_or_else(|| {
                BackupError::Configuration(format!("backup URL missing 'backup' field: {raw}"))
            })?,
            volume_name: volume_name.ok_or_else(|| {
                BackupError::Configuration(format!("backup URL missing 'volume' field: {raw}"))
            })?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_round_trips() {
        let url = BackupUrl::new("file", "/mnt/backups", "vol-1", "backup-42");
        let encoded = url.encode();
        let decoded = BackupUrl::decode(&encoded).unwrap();
        assert_eq!(decoded, url);
    }

    #[test]
    fn round_trips_with_reserved_characters_in_fields() {
        let url = BackupUrl::new("file", "/mnt/back&ups=x", "vol?1", "back%up");
        let decoded = BackupUrl::decode(&url.encode()).unwrap();
        assert_eq!(decoded, url);
    }

    #[test]
    fn decode_rejects_missing_scheme() {
        assert!(BackupUrl::decode("not-a-url").is_err());
    }

    #[test]
    fn decode_rejects_missing_fields() {
        assert!(BackupUrl::decode("file://root?backup=x").is_err());
    }
}
