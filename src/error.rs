use thiserror::Error;

/// Error taxonomy for the delta-backup engine.
///
/// Every public operation returns `Result<T, BackupError>`. Internal
/// helpers may wrap `std::io::Error` / driver errors with `anyhow`
/// context before converting into one of these variants at the module
/// boundary.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("logic error: {0}")]
    Logic(String),
}

pub type Result<T> = std::result::Result<T, BackupError>;

impl From<std::io::Error> for BackupError {
    fn from(e: std::io::Error) -> Self {
        BackupError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(e: serde_json::Error) -> Self {
        BackupError::Configuration(format!("malformed manifest encoding: {e}"))
    }
}

impl From<anyhow::Error> for BackupError {
    fn from(e: anyhow::Error) -> Self {
        BackupError::Io(e.to_string())
    }
}
