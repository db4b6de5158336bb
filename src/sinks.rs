use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::info;

/// Receives progress updates for a running batch
///
/// `current >= total` means the batch has finished and the indicator may be
/// dismissed. Implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn report(&self, message: &str, current: usize, total: usize);
}

/// Receives the public URLs of a batch, once, if there are any
pub trait ResultSink: Send + Sync {
    fn deliver(&self, urls: &[String]);
}

/// One progress update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub message: String,
    pub current: usize,
    pub total: usize,
}

impl ProgressEvent {
    pub fn is_complete(&self) -> bool {
        self.current >= self.total
    }
}

/// Writes progress to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, message: &str, current: usize, total: usize) {
        info!("[{}/{}] {}", current, total, message);
    }
}

/// Forwards progress over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, message: &str, current: usize, total: usize) {
        // a closed receiver only means nobody is watching any more
        let _ = self.tx.send(ProgressEvent {
            message: message.to_string(),
            current,
            total,
        });
    }
}

/// Keeps every delivered URL list
#[derive(Debug, Default)]
pub struct CollectingResults {
    deliveries: Mutex<Vec<Vec<String>>>,
}

impl CollectingResults {
    pub fn deliveries(&self) -> Vec<Vec<String>> {
        self.deliveries
            .lock()
            .map(|deliveries| deliveries.clone())
            .unwrap_or_default()
    }
}

impl ResultSink for CollectingResults {
    fn deliver(&self, urls: &[String]) {
        if let Ok(mut deliveries) = self.deliveries.lock() {
            deliveries.push(urls.to_vec());
        }
    }
}

/// Joins URLs one per line, the form pasted into a clipboard
pub fn join_urls(urls: &[String]) -> String {
    urls.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_progress_forwards_events() {
        let (sink, mut rx) = ChannelProgress::new();
        sink.report("Processing item 1 of 1", 0, 2);
        sink.report("done", 2, 2);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.current, 0);
        assert!(!first.is_complete());
        assert!(rx.try_recv().unwrap().is_complete());
    }

    #[test]
    fn channel_progress_survives_dropped_receiver() {
        let (sink, rx) = ChannelProgress::new();
        drop(rx);
        sink.report("nobody listening", 1, 2);
    }

    #[test]
    fn urls_are_newline_joined() {
        let urls = vec!["https://a/1.jpg".to_string(), "https://a/2.jpg".to_string()];
        assert_eq!(join_urls(&urls), "https://a/1.jpg\nhttps://a/2.jpg");
    }
}
