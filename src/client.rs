use openssh_sftp_client::Sftp;
use std::path::Path;

use crate::operations::upload;
use crate::types::{FileTransferProgress, SftpClientConfig, SftpClientConfigArc};

/// SFTP client for writing files to a remote server
#[derive(Debug)]
pub struct SftpClient {
    pub(crate) sftp: Sftp,
    pub(crate) config: SftpClientConfigArc,
}

impl SftpClient {
    /// Creates a new SFTP client instance (internal use)
    pub(crate) fn new(sftp: Sftp, config: SftpClientConfig) -> Self {
        Self {
            sftp,
            config: config.into(),
        }
    }

    /// Closes the SFTP client and releases resources
    pub async fn close(self) -> Result<(), anyhow::Error> {
        self.sftp.close().await?;
        Ok(())
    }

    /// Uploads a local file to the remote server
    ///
    /// # Arguments
    ///
    /// * `local_path` - Path to the local file
    /// * `remote_path` - Destination path on the remote server, overwritten if present
    ///
    /// # Example
    ///
    /// ```ignore
    /// let progress = client
    ///     .put(Path::new("/tmp/photo.jpg"), "/var/www/img/photo.jpg")
    ///     .await?;
    /// ```
    pub async fn put(
        &self,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<FileTransferProgress, anyhow::Error> {
        upload::put(self, local_path, remote_path).await
    }
}
