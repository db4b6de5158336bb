use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempPath;

use crate::error::ConfigurationError;

pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_CUSTOM_WIDTH: u32 = 1920;

/// Connection and processing settings, read once at the start of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub remote_directory: String,
    pub url_prefix: String,
    pub use_original_size: bool,
    pub custom_width: u32,
    pub private_key: String,
    pub public_key: String,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            port: DEFAULT_PORT,
            username: String::new(),
            remote_directory: String::new(),
            url_prefix: String::new(),
            use_original_size: true,
            custom_width: DEFAULT_CUSTOM_WIDTH,
            private_key: String::new(),
            public_key: String::new(),
        }
    }
}

impl TransferSettings {
    /// Checks that everything needed to open a transfer session is present
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut missing = Vec::new();
        if self.hostname.trim().is_empty() {
            missing.push("hostname");
        }
        if self.username.trim().is_empty() {
            missing.push("username");
        }
        if self.private_key.trim().is_empty() {
            missing.push("private key");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError { missing })
        }
    }

    /// Public URL of an uploaded file, if a URL prefix is configured
    pub fn url_for(&self, remote_name: &str) -> Option<String> {
        let prefix = self.url_prefix.trim();
        if prefix.is_empty() {
            return None;
        }
        Some(format!("{}/{}", prefix.trim_end_matches('/'), remote_name))
    }
}

/// Configuration for SFTP client operations
#[derive(Debug, Clone)]
pub struct SftpClientConfig {
    /// Buffer size for read/write operations in bytes
    pub io_size: usize,
    /// Number of chunks allowed in flight between reader and writer
    pub concurrency: usize,
}

impl Default for SftpClientConfig {
    /// - io_size: 65536 (64KB)
    /// - concurrency: 8
    fn default() -> Self {
        Self {
            io_size: 65536,
            concurrency: 8,
        }
    }
}

impl SftpClientConfig {
    pub fn new(io_size: usize, concurrency: usize) -> Self {
        Self {
            io_size,
            concurrency,
        }
    }
}

/// Internal configuration wrapper with Arc for shared ownership
#[derive(Debug, Clone)]
pub(crate) struct SftpClientConfigArc {
    pub(crate) inner: Arc<SftpClientConfig>,
}

impl From<SftpClientConfig> for SftpClientConfigArc {
    fn from(config: SftpClientConfig) -> Self {
        Self {
            inner: Arc::new(config),
        }
    }
}

impl std::ops::Deref for SftpClientConfigArc {
    type Target = SftpClientConfig;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Summary of a completed single-file transfer
#[derive(Debug, Clone)]
pub struct FileTransferProgress {
    pub src_file: String,
    pub dest_file: String,
    /// Total size of the file in bytes
    pub file_size: u64,
}

/// Kind of media an item was classified as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Prefix used for generated names when the caller supplied none
    pub fn default_prefix(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// A transformed item sitting in a local temporary file, ready to upload
///
/// The temporary file belongs to this record. It is removed by
/// [`ProcessedMedia::discard`], or when the record is dropped.
#[derive(Debug)]
pub struct ProcessedMedia {
    pub(crate) file: TempPath,
    pub original_name: String,
    pub new_name: String,
    pub kind: MediaKind,
}

impl ProcessedMedia {
    pub fn path(&self) -> &Path {
        &self.file
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    /// Deletes the temporary file, consuming the record
    pub fn discard(self) -> std::io::Result<()> {
        self.file.close()
    }
}

/// Terminal outcome of one item in a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub success: bool,
    pub filename: String,
    pub url: Option<String>,
}

impl UploadResult {
    pub fn uploaded(filename: String, url: Option<String>) -> Self {
        Self {
            success: true,
            filename,
            url,
        }
    }

    pub fn failed(filename: impl Into<String>) -> Self {
        Self {
            success: false,
            filename: filename.into(),
            url: None,
        }
    }
}
