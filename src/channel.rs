use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::client::SftpClient;
use crate::error::ConnectionError;
use crate::session::{RemoteTarget, SftpSessionManager};
use crate::types::SftpClientConfig;

/// Opens authenticated file-transfer sessions
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(
        &self,
        target: &RemoteTarget,
    ) -> Result<Box<dyn RemoteSession>, ConnectionError>;
}

/// One live connection with an open file-transfer channel
#[async_trait]
pub trait RemoteSession: Send {
    /// Writes the local file to `remote_path`, replacing any existing file
    async fn write_file(&mut self, local_path: &Path, remote_path: &str)
    -> Result<u64, anyhow::Error>;

    /// Closes the channel and the connection
    async fn close(self: Box<Self>) -> Result<(), anyhow::Error>;
}

/// Joins a remote directory and file name with exactly one separator
///
/// An empty directory leaves the name relative to the login directory.
pub fn remote_path(directory: &str, filename: &str) -> String {
    let filename = filename.trim_start_matches('/');
    let directory = directory.trim();
    if directory.is_empty() {
        return filename.to_string();
    }
    format!("{}/{}", directory.trim_end_matches('/'), filename)
}

/// Maps a transport diagnostic onto a [`ConnectionError`]
pub fn classify_failure(detail: &str) -> ConnectionError {
    let lower = detail.to_ascii_lowercase();
    let any = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));

    if any(&["timed out", "timeout"]) {
        ConnectionError::Timeout
    } else if any(&[
        "invalid format",
        "load key",
        "bad permissions",
        "unprotected private key",
        "error in libcrypto",
        "no such identity",
    ]) {
        ConnectionError::KeyFormat
    } else if any(&[
        "permission denied",
        "authentication",
        "too many authentication failures",
        "no supported authentication methods",
    ]) {
        ConnectionError::AuthenticationFailed
    } else if any(&[
        "could not resolve hostname",
        "name or service not known",
        "nodename nor servname",
        "no route to host",
        "network is unreachable",
        "connection refused",
        "host is down",
    ]) {
        ConnectionError::HostUnreachable
    } else {
        ConnectionError::Unknown(detail.trim().to_string())
    }
}

/// Rejects key material that is obviously not a private key before ssh sees it
pub(crate) fn check_key_material(private_key: &str) -> Result<(), ConnectionError> {
    let key = private_key.trim();
    if key.contains("BEGIN OPENSSH PRIVATE KEY") {
        return ssh_key::PrivateKey::from_openssh(key)
            .map(|_| ())
            .map_err(|err| {
                warn!("Private key could not be parsed: {}", err);
                ConnectionError::KeyFormat
            });
    }
    if key.starts_with("-----BEGIN") && key.contains("PRIVATE KEY-----") {
        // legacy PEM encodings are left for ssh itself to judge
        return Ok(());
    }
    Err(ConnectionError::KeyFormat)
}

/// [`RemoteConnector`] backed by the system OpenSSH client and its SFTP subsystem
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    pub config: SftpClientConfig,
}

impl SshConnector {
    pub fn new(config: SftpClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RemoteConnector for SshConnector {
    async fn connect(
        &self,
        target: &RemoteTarget,
    ) -> Result<Box<dyn RemoteSession>, ConnectionError> {
        check_key_material(&target.private_key)?;

        // ssh enforces `connect_timeout` itself; a "timed out" diagnostic
        // classifies as `ConnectionError::Timeout`
        let mut manager = match SftpSessionManager::connect(target).await {
            Ok(manager) => manager,
            Err(err) => {
                let detail = format!("{err:#}");
                warn!("Connecting to {:?} failed: {}", target.hostname, detail);
                return Err(classify_failure(&detail));
            }
        };

        match manager.create_sftp_client(self.config.clone()).await {
            Ok(client) => Ok(Box::new(SshRemoteSession { manager, client })),
            Err(err) => {
                let detail = format!("{err:#}");
                error!("Opening sftp channel failed: {}", detail);
                if let Err(close_err) = manager.close().await {
                    debug!("Closing half-open session failed: {:?}", close_err);
                }
                Err(classify_failure(&detail))
            }
        }
    }
}

struct SshRemoteSession {
    manager: SftpSessionManager,
    client: SftpClient,
}

#[async_trait]
impl RemoteSession for SshRemoteSession {
    async fn write_file(
        &mut self,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<u64, anyhow::Error> {
        let progress = self.client.put(local_path, remote_path).await?;
        Ok(progress.file_size)
    }

    async fn close(self: Box<Self>) -> Result<(), anyhow::Error> {
        let SshRemoteSession {
            mut manager,
            client,
        } = *self;
        let client_result = client.close().await;
        let session_result = manager.close().await;
        client_result.and(session_result)
    }
}

/// The transfer session used by one batch
///
/// Connects lazily on the first [`TransferChannel::put`]. A failed connect
/// or write only fails the current item; after a failed write the session
/// is closed and the next `put` connects again. The session is
/// closed by [`TransferChannel::release`], or in the background if the
/// channel is dropped while still holding it.
pub struct TransferChannel<'a> {
    connector: &'a dyn RemoteConnector,
    target: RemoteTarget,
    session: Option<Box<dyn RemoteSession>>,
}

impl<'a> TransferChannel<'a> {
    pub fn new(connector: &'a dyn RemoteConnector, target: RemoteTarget) -> Self {
        Self {
            connector,
            target,
            session: None,
        }
    }

    /// Uploads one file; never raises, reports failure as `false`
    pub async fn put(&mut self, local_path: &Path, remote_directory: &str, filename: &str) -> bool {
        let destination = remote_path(remote_directory, filename);

        if self.session.is_none() {
            match self.connector.connect(&self.target).await {
                Ok(session) => {
                    info!("Transfer session opened to {:?}", self.target.hostname);
                    self.session = Some(session);
                }
                Err(err) => {
                    error!(
                        "Could not open transfer session for {:?}: {}",
                        destination, err
                    );
                    return false;
                }
            }
        }

        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let written = session.write_file(local_path, &destination).await;
        match written {
            Ok(bytes) => {
                debug!("Wrote {} bytes to {:?}", bytes, destination);
                true
            }
            Err(err) => {
                error!("Upload failed for {:?}: {:#}", destination, err);
                // the connection may be gone; the next item starts a fresh session
                if let Some(session) = self.session.take() {
                    if let Err(err) = session.close().await {
                        debug!("Closing failed transfer session: {:#}", err);
                    }
                }
                false
            }
        }
    }

    /// Closes the session, if one was opened
    pub async fn release(mut self) {
        if let Some(session) = self.session.take() {
            if let Err(err) = session.close().await {
                warn!("Closing transfer session failed: {:#}", err);
            }
        }
    }
}

impl Drop for TransferChannel<'_> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = session.close().await {
                        warn!("Closing abandoned transfer session failed: {:#}", err);
                    }
                });
            }
            Err(_) => warn!("Transfer session dropped outside a runtime; connection left to the OS"),
        }
    }
}
