// Module declarations
mod channel;
mod client;
mod config;
mod credentials;
mod error;
mod media;
mod naming;
mod operations;
mod orchestrator;
mod session;
mod sinks;
mod types;
mod utils;

// Public API exports
pub use channel::{RemoteConnector, RemoteSession, SshConnector, TransferChannel, classify_failure, remote_path};
pub use client::SftpClient;
pub use config::{JsonSettingsStore, SettingsStore, settings_from_map};
pub use credentials::{KEY_COMMENT, Keypair, PROBE_TIMEOUT, generate_keypair, probe_connection, probe_with};
pub use error::{ConfigurationError, ConnectionError, KeyGenerationError, MediaError, SettingsError};
pub use media::{
    BytesMedia, FileMedia, MediaHandle, MediaSource, TransformOptions, VIDEO_EXTENSIONS, is_video,
    transform,
};
pub use naming::{generate_name, next_stamp};
pub use orchestrator::{BatchHandle, BatchOutcome, BatchReport, BatchRequest, BatchState, Uploader, UploaderConfig};
pub use session::{HOST_KEY_ALGORITHMS, HostKeyPolicy, MASTER_IDLE_SECS, RemoteTarget, SftpSessionManager};
pub use sinks::{
    ChannelProgress, CollectingResults, ProgressEvent, ProgressSink, ResultSink, TracingProgress,
    join_urls,
};
pub use types::{
    FileTransferProgress, MediaKind, ProcessedMedia, SftpClientConfig, TransferSettings,
    UploadResult,
};

// Re-export commonly used external types for convenience
pub use tokio_util::sync::CancellationToken;
