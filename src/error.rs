use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("No device found: {0}")]
    NoDeviceFound(String),

    #[error("Listing error: {0}")]
    Listing(String),

    #[error("Download failed for {key}: {reason}")]
    DownloadFailed { key: String, reason: String },

    #[error("Failed to ensure device directory {path}: {reason}")]
    DirectoryEnsureFailed { path: String, reason: String },

    #[error("Push failed for {device_path} (exit code {exit_code:?})")]
    PushFailed {
        device_path: String,
        exit_code: Option<i32>,
    },

    #[error("Failed to discard staged file {path}: {reason}")]
    DiscardFailed { path: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Downstream trigger error: {0}")]
    Trigger(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
