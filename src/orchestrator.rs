use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::channel::{RemoteConnector, TransferChannel};
use crate::error::ConfigurationError;
use crate::media::{MediaHandle, TransformOptions, transform};
use crate::session::{HostKeyPolicy, RemoteTarget};
use crate::sinks::{ProgressSink, ResultSink};
use crate::types::{ProcessedMedia, TransferSettings, UploadResult};

/// Items submitted together, with an optional filename prefix
#[derive(Clone)]
pub struct BatchRequest {
    pub items: Vec<MediaHandle>,
    pub prefix: Option<String>,
}

impl BatchRequest {
    /// The prefix is trimmed; a blank prefix counts as none
    pub fn new(items: Vec<MediaHandle>, prefix: Option<&str>) -> Self {
        let prefix = prefix
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        Self { items, prefix }
    }

    pub fn is_batch(&self) -> bool {
        self.items.len() > 1
    }
}

/// Where the worker currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Validating,
    Processing(usize),
    Uploading(usize),
    Finalizing,
    Terminal,
}

impl BatchState {
    pub fn is_running(&self) -> bool {
        !matches!(self, BatchState::Idle | BatchState::Terminal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BatchOutcome {
    Completed,
    Cancelled,
    ConfigurationError(Vec<&'static str>),
}

/// Final summary of a batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub outcome: BatchOutcome,
    /// One entry per submitted item, in input order
    pub results: Vec<UploadResult>,
    /// Public URLs of the successful uploads, in input order
    pub urls: Vec<String>,
    pub success_count: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Directory for temporary processed files
    pub work_dir: PathBuf,
    /// How long the terminal state is held before the worker goes idle
    pub completion_delay: Duration,
    /// Host key checking applied to every transfer session
    pub host_key_policy: HostKeyPolicy,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("niscp"),
            completion_delay: Duration::from_secs(3),
            host_key_policy: HostKeyPolicy::default(),
        }
    }
}

/// A batch running on a background task
///
/// Every batch publishes its own state; batches spawned from the same
/// [`Uploader`] never observe each other.
pub struct BatchHandle {
    state: watch::Receiver<BatchState>,
    task: JoinHandle<BatchReport>,
}

impl BatchHandle {
    pub fn status(&self) -> BatchState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BatchState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the batch to finish
    pub async fn join(self) -> Result<BatchReport, JoinError> {
        self.task.await
    }
}

/// Runs batches: transform each item, upload it, report, clean up
///
/// Items are handled one at a time, in order, over a single transfer
/// session per batch. A failing item never stops the batch.
pub struct Uploader {
    connector: Arc<dyn RemoteConnector>,
    progress: Arc<dyn ProgressSink>,
    results: Arc<dyn ResultSink>,
    config: UploaderConfig,
}

impl Uploader {
    pub fn new(
        connector: Arc<dyn RemoteConnector>,
        progress: Arc<dyn ProgressSink>,
        results: Arc<dyn ResultSink>,
        config: UploaderConfig,
    ) -> Self {
        Self {
            connector,
            progress,
            results,
            config,
        }
    }

    /// Runs the batch on a background task
    pub fn spawn(
        self: &Arc<Self>,
        request: BatchRequest,
        settings: TransferSettings,
        cancel: CancellationToken,
    ) -> BatchHandle {
        let (state, receiver) = watch::channel(BatchState::Idle);
        let uploader = Arc::clone(self);
        let task = tokio::spawn(async move {
            uploader
                .run_with_state(request, settings, cancel, &state)
                .await
        });
        BatchHandle {
            state: receiver,
            task,
        }
    }

    /// Runs the batch to completion on the current task
    ///
    /// `cancel` is only checked between items; items not started when it
    /// fires are recorded as failures.
    pub async fn run(
        &self,
        request: BatchRequest,
        settings: TransferSettings,
        cancel: CancellationToken,
    ) -> BatchReport {
        let (state, _) = watch::channel(BatchState::Idle);
        self.run_with_state(request, settings, cancel, &state).await
    }

    async fn run_with_state(
        &self,
        request: BatchRequest,
        settings: TransferSettings,
        cancel: CancellationToken,
        state: &watch::Sender<BatchState>,
    ) -> BatchReport {
        state.send_replace(BatchState::Validating);
        let report = match settings.validate() {
            Ok(()) => self.run_items(&request, &settings, &cancel, state).await,
            Err(err) => self.reject(err),
        };

        state.send_replace(BatchState::Terminal);
        if !self.config.completion_delay.is_zero() {
            tokio::time::sleep(self.config.completion_delay).await;
        }
        state.send_replace(BatchState::Idle);
        report
    }

    fn reject(&self, err: ConfigurationError) -> BatchReport {
        error!("Batch rejected: {}", err);
        let message = format!("Upload failed: Missing configuration ({})", err.missing.join(", "));
        self.progress.report(&message, 0, 1);
        self.progress.report(&message, 1, 1);
        BatchReport {
            outcome: BatchOutcome::ConfigurationError(err.missing),
            results: Vec::new(),
            urls: Vec::new(),
            success_count: 0,
            message,
        }
    }

    async fn run_items(
        &self,
        request: &BatchRequest,
        settings: &TransferSettings,
        cancel: &CancellationToken,
        state: &watch::Sender<BatchState>,
    ) -> BatchReport {
        let count = request.items.len();
        let total = count * 2;
        let options = TransformOptions {
            use_original_size: settings.use_original_size,
            custom_width: settings.custom_width,
            prefix: request.prefix.clone(),
            is_batch: request.is_batch(),
            work_dir: self.config.work_dir.clone(),
        };
        info!("Starting batch of {} item(s) to {:?}", count, settings.hostname);

        let target =
            RemoteTarget::from_settings(settings).with_host_key_policy(self.config.host_key_policy);
        let mut channel = TransferChannel::new(self.connector.as_ref(), target);
        let mut results = Vec::with_capacity(count);
        let mut processed_files = Vec::with_capacity(count);
        let mut cancelled = false;

        for (index, item) in request.items.iter().enumerate() {
            if cancel.is_cancelled() {
                if !cancelled {
                    warn!("Batch cancelled before item {}", index + 1);
                    cancelled = true;
                }
                results.push(UploadResult::failed(fallback_name(item)));
                continue;
            }

            state.send_replace(BatchState::Processing(index));
            self.progress.report(
                &format!("Processing item {} of {}", index + 1, count),
                index * 2,
                total,
            );
            let processed = match process(item.clone(), options.clone()).await {
                Ok(processed) => processed,
                Err(err) => {
                    warn!(handle = %item.id(), stage = "process", index, "Item failed: {:#}", err);
                    results.push(UploadResult::failed(fallback_name(item)));
                    continue;
                }
            };

            state.send_replace(BatchState::Uploading(index));
            self.progress.report(
                &format!(
                    "Uploading {} ({} of {})",
                    processed.new_name,
                    index + 1,
                    count
                ),
                index * 2 + 1,
                total,
            );
            let uploaded = channel
                .put(
                    processed.path(),
                    &settings.remote_directory,
                    &processed.new_name,
                )
                .await;

            if uploaded {
                let url = settings.url_for(&processed.new_name);
                results.push(UploadResult::uploaded(processed.new_name.clone(), url));
            } else {
                warn!(handle = %item.id(), stage = "upload", index, "Item failed to upload");
                results.push(UploadResult::failed(processed.new_name.clone()));
            }
            processed_files.push(processed);
        }

        channel.release().await;

        state.send_replace(BatchState::Finalizing);
        for processed in processed_files {
            let path = processed.path().to_path_buf();
            if let Err(err) = processed.discard() {
                warn!("Could not delete temporary file {:?}: {}", path, err);
            }
        }

        let urls: Vec<String> = results.iter().filter_map(|r| r.url.clone()).collect();
        let success_count = results.iter().filter(|r| r.success).count();
        if !urls.is_empty() {
            self.results.deliver(&urls);
        }

        let message = if urls.is_empty() {
            format!("Upload complete: {success_count}/{count} successful")
        } else {
            format!("Upload complete: {success_count}/{count} successful. URLs delivered.")
        };
        info!("{}", message);
        self.progress.report(&message, total, total);

        BatchReport {
            outcome: if cancelled {
                BatchOutcome::Cancelled
            } else {
                BatchOutcome::Completed
            },
            results,
            urls,
            success_count,
            message,
        }
    }
}

fn fallback_name(item: &MediaHandle) -> String {
    item.display_name().unwrap_or_else(|| "unknown".to_string())
}

/// Runs the blocking transform off the async worker threads
async fn process(
    item: MediaHandle,
    options: TransformOptions,
) -> Result<ProcessedMedia, anyhow::Error> {
    let processed = tokio::task::spawn_blocking(move || transform(item.as_ref(), &options))
        .await??;
    Ok(processed)
}
