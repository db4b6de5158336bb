use anyhow::anyhow;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tokio::fs;
use tokio::io::{self, AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::client::SftpClient;
use crate::types::FileTransferProgress;

/// Uploads a local file to the remote server
///
/// Reading and writing are pipelined:
/// 1. Chunks of `io_size` bytes are read from the local file
/// 2. Each chunk is sent to a writer task with its sequence number
/// 3. The writer keeps a buffer map so chunks hit the remote file in order
///
/// At most `concurrency` chunks are in flight at any time.
///
/// # Errors
///
/// Returns an error if:
/// - The local file cannot be opened or read
/// - The remote file cannot be created or written to
/// - There's a channel communication error
pub async fn put(
    client: &SftpClient,
    local_path: &Path,
    remote_path: &str,
) -> Result<FileTransferProgress, anyhow::Error> {
    let upload_time = Instant::now();
    let mut local_file = fs::File::open(local_path).await?;
    debug!("Local file opened: {:?}", local_path);
    let local_file_size = local_file.metadata().await?.len();

    let (tx, mut rx) = mpsc::channel::<(usize, Vec<u8>)>(client.config.concurrency);

    let mut buffer_idx = 0;
    let mut tasks = FuturesUnordered::new();

    let mut remote_file = client
        .sftp
        .create(remote_path.to_string())
        .await
        .map_err(|err| {
            error!("Failed to create remote file {:?}: {:?}", remote_path, err);
            anyhow!("SFTP error: {err}")
        })?;
    debug!("Remote file created path: {:?}", remote_path);

    // Spawn a task to handle ordered writing
    let write_handle = tokio::spawn(async move {
        let mut current_idx = 0;
        let mut buffer_map = HashMap::new();
        let mut written: u64 = 0;

        while let Some((idx, buffer)) = rx.recv().await {
            buffer_map.insert(idx, buffer);
            while let Some(buffer) = buffer_map.remove(&current_idx) {
                remote_file
                    .write_all(&buffer)
                    .await
                    .map_err(|e| anyhow!("SFTP write error: {e}"))?;
                written += buffer.len() as u64;
                current_idx += 1;
            }
        }
        Ok::<u64, anyhow::Error>(written)
    });

    let mut upload_error: Option<anyhow::Error> = None;
    loop {
        let mut buffer = vec![0; client.config.io_size];
        let bytes_read = match local_file.read(&mut buffer[..]).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                error!("Error reading local file: {:?}", e);
                upload_error = Some(anyhow!("Failed to read from local file: {e}"));
                break;
            }
        };
        let tx = tx.clone();
        buffer.truncate(bytes_read);
        tasks.push(tokio::spawn(async move {
            tx.send((buffer_idx, buffer))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "Failed to send buffer"))
        }));
        buffer_idx += 1;

        if tasks.len() >= client.config.concurrency {
            tasks.select_next_some().await??;
        }
    }

    drop(tx);
    while let Some(task) = tasks.next().await {
        task??;
    }
    let written = write_handle.await??;

    if let Some(err) = upload_error {
        return Err(err);
    }
    if written != local_file_size {
        return Err(anyhow!(
            "short write to {remote_path}: {written} of {local_file_size} bytes"
        ));
    }

    info!(
        "File {:?} uploaded to {:?}. Time taken {:?}",
        local_path,
        remote_path,
        upload_time.elapsed(),
    );

    Ok(FileTransferProgress {
        src_file: local_path.display().to_string(),
        dest_file: remote_path.to_string(),
        file_size: local_file_size,
    })
}
