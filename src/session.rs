use anyhow::{Context, anyhow};
use openssh;
use openssh_sftp_client::{Sftp, SftpOptions};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, error, info};

use crate::client::SftpClient;
use crate::types::{SftpClientConfig, TransferSettings};
use crate::utils::check_connection;

/// Server host key algorithms the transport will negotiate
pub const HOST_KEY_ALGORITHMS: &[&str] = &[
    "ecdsa-sha2-nistp256",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
    "rsa-sha2-512",
    "rsa-sha2-256",
    "ssh-rsa",
];

/// Connect timeout used for uploads
pub const TRANSFER_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Seconds a master connection with no open channels stays alive
pub const MASTER_IDLE_SECS: usize = 30;

/// Lifetime of the backgrounded ssh master
///
/// A master whose connect future was abandoned has no owner left to close
/// it, so it must exit on its own once idle.
pub(crate) fn master_persistence() -> openssh::ControlPersist {
    openssh::ControlPersist::IdleFor(NonZeroUsize::new(MASTER_IDLE_SECS).unwrap_or(NonZeroUsize::MIN))
}

/// How the server's host key is checked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Any host key is accepted and nothing is remembered between sessions
    #[default]
    AcceptAny,
    /// The key must already be in the user's known-hosts file
    Strict,
}

/// Everything needed to open an authenticated session
#[derive(Debug, Clone)]
pub struct RemoteTarget {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub private_key: String,
    pub host_key_policy: HostKeyPolicy,
    pub connect_timeout: Duration,
}

impl RemoteTarget {
    pub fn new(hostname: &str, port: u16, username: &str, private_key: &str) -> Self {
        Self {
            hostname: hostname.trim().to_string(),
            port,
            username: username.trim().to_string(),
            private_key: private_key.to_string(),
            host_key_policy: HostKeyPolicy::default(),
            connect_timeout: TRANSFER_CONNECT_TIMEOUT,
        }
    }

    pub fn from_settings(settings: &TransferSettings) -> Self {
        Self::new(
            &settings.hostname,
            settings.port,
            &settings.username,
            &settings.private_key,
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }
}

/// Renders the ssh client configuration applied to every session
pub(crate) fn ssh_config(policy: HostKeyPolicy, known_hosts: &Path) -> String {
    let mut config = String::from("Host *\n");
    config.push_str(&format!(
        "    HostKeyAlgorithms {}\n",
        HOST_KEY_ALGORITHMS.join(",")
    ));
    config.push_str("    IdentitiesOnly yes\n");
    config.push_str("    PasswordAuthentication no\n");
    config.push_str("    KbdInteractiveAuthentication no\n");
    config.push_str("    BatchMode yes\n");
    if policy == HostKeyPolicy::AcceptAny {
        config.push_str(&format!(
            "    UserKnownHostsFile {}\n",
            known_hosts.display()
        ));
        config.push_str("    GlobalKnownHostsFile /dev/null\n");
    }
    config
}

/// Private scratch directory holding the key file, ssh config and control socket
#[derive(Debug)]
struct Scratch {
    dir: TempDir,
}

impl Scratch {
    async fn prepare(target: &RemoteTarget) -> Result<Self, anyhow::Error> {
        let dir = tempfile::Builder::new()
            .prefix("niscp-ssh-")
            .tempdir()
            .context("failed to create ssh scratch directory")?;

        let mut key = target.private_key.trim().to_string();
        key.push('\n');
        let key_path = dir.path().join("id");
        tokio::fs::write(&key_path, key)
            .await
            .context("failed to write private key")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))
                .await
                .context("failed to restrict private key permissions")?;
        }

        let known_hosts = dir.path().join("known_hosts");
        tokio::fs::write(&known_hosts, b"")
            .await
            .context("failed to create known hosts file")?;
        tokio::fs::write(
            dir.path().join("config"),
            ssh_config(target.host_key_policy, &known_hosts),
        )
        .await
        .context("failed to write ssh config")?;

        Ok(Self { dir })
    }

    fn key_path(&self) -> PathBuf {
        self.dir.path().join("id")
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("config")
    }
}

/// Manager for SSH sessions that creates SFTP clients
#[derive(Debug, Default)]
pub struct SftpSessionManager {
    pub session: Option<Arc<openssh::Session>>,
    scratch: Option<Scratch>,
}

impl SftpSessionManager {
    /// Establishes a new SSH connection to the remote host
    ///
    /// The key material is written to a private scratch directory which
    /// also holds the generated ssh config and the control socket. It is
    /// removed when the manager is dropped.
    pub async fn connect(target: &RemoteTarget) -> Result<Self, anyhow::Error> {
        info!(
            "Connecting to {:?}@{:?}:{}",
            target.username, target.hostname, target.port
        );
        let scratch = Scratch::prepare(target).await?;
        let known_hosts = match target.host_key_policy {
            HostKeyPolicy::AcceptAny => openssh::KnownHosts::Accept,
            HostKeyPolicy::Strict => openssh::KnownHosts::Strict,
        };

        let session = openssh::SessionBuilder::default()
            .user(target.username.clone())
            .port(target.port)
            .control_directory(scratch.dir.path())
            .config_file(scratch.config_path())
            .keyfile(scratch.key_path())
            .known_hosts_check(known_hosts)
            .control_persist(master_persistence())
            .connect_timeout(target.connect_timeout)
            .connect(&target.hostname)
            .await?;
        debug!("SSH session established with {:?}", target.hostname);
        Ok(Self {
            session: Some(Arc::new(session)),
            scratch: Some(scratch),
        })
    }

    /// Creates a new SFTP client from the managed SSH session
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The SSH session is not connected
    /// - The session check fails (connection is dead)
    /// - SFTP subsystem cannot be initialized
    pub async fn create_sftp_client(
        &self,
        config: SftpClientConfig,
    ) -> Result<SftpClient, anyhow::Error> {
        debug!("Creating sftp client from session");
        let session = self
            .session
            .as_ref()
            .ok_or(anyhow!("SSH session not connected"))?;
        session
            .check()
            .await
            .map_err(|_| anyhow!("sftp session is already closed"))?;

        let sftp = Sftp::from_clonable_session_with_check_connection(
            session.clone(),
            SftpOptions::default(),
            check_connection, /* if the ssh connection is dropped this sftp client can notice and fail the ongoing operation */
        )
        .await?;
        debug!("sftp client created successfully");
        Ok(SftpClient::new(sftp, config))
    }

    /// Closes the SSH session if no SFTP clients are using it
    ///
    /// Uses `Arc::try_unwrap` so the session is only closed once every
    /// SFTP client built from it has been dropped.
    pub async fn close(&mut self) -> Result<(), anyhow::Error> {
        let result = if let Some(session) = self.session.take() {
            match Arc::try_unwrap(session) {
                Ok(session) => {
                    info!("No sftp client is using the session anymore so can close the session");
                    session.close().await?;
                    Ok(())
                }
                Err(session) => {
                    // Put it back if we couldn't close it
                    error!(
                        "Some sftp client still has the session instance so could not close session"
                    );
                    self.session = Some(session);
                    Err(anyhow!("failed to close ssh session"))
                }
            }
        } else {
            error!("Session not found");
            Err(anyhow!("failed to close ssh session"))
        };
        if self.session.is_none() {
            self.scratch = None;
        }
        result
    }
}
