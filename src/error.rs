use std::io;
use thiserror::Error;

/// Required settings are missing; the whole batch is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing configuration: {}", .missing.join(", "))]
pub struct ConfigurationError {
    pub missing: Vec<&'static str>,
}

/// Per-item failure while turning a source into a local file
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("could not open media stream for {handle}: {source}")]
    StreamUnavailable {
        handle: String,
        #[source]
        source: io::Error,
    },
    #[error("could not decode image {handle}: {reason}")]
    Decode { handle: String, reason: String },
    #[error("i/o error while writing processed media: {0}")]
    Io(#[from] io::Error),
}

/// Classified failure to reach or authenticate against the remote host
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("Connection timeout. Check hostname, port, and network connectivity.")]
    Timeout,
    #[error(
        "Authentication failed. Make sure the public key is added to ~/.ssh/authorized_keys on the server."
    )]
    AuthenticationFailed,
    #[error("Host unreachable. Check hostname and port number.")]
    HostUnreachable,
    #[error("SSH key error. Verify key format and permissions.")]
    KeyFormat,
    #[error("Connection failed: {0}")]
    Unknown(String),
}

#[derive(Debug, Error)]
#[error("failed to generate SSH keypair: {0}")]
pub struct KeyGenerationError(#[from] pub ssh_key::Error);

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("settings file is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}
