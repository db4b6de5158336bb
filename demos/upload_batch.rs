// demos/upload_batch.rs
// Run with: cargo run --example upload_batch -- <settings.json> [--prefix NAME] <file>...

use niscp::{
    BatchOutcome, BatchRequest, CancellationToken, FileMedia, JsonSettingsStore, ResultSink,
    SettingsStore, SshConnector, TracingProgress, Uploader, UploaderConfig, join_urls,
};
use std::sync::Arc;

/// Prints the URL list the way it would land on a clipboard
struct PrintUrls;

impl ResultSink for PrintUrls {
    fn deliver(&self, urls: &[String]) {
        println!("{}", join_urls(urls));
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let settings_path = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: upload_batch <settings.json> [--prefix NAME] <file>..."))?;

    let mut prefix = None;
    let mut files = Vec::new();
    while let Some(arg) = args.next() {
        if arg == "--prefix" {
            prefix = args.next();
        } else {
            files.push(FileMedia::new(arg).handle());
        }
    }
    if files.is_empty() {
        anyhow::bail!("no files given");
    }

    // 1. Read the settings once for the whole batch
    let store = JsonSettingsStore::new(settings_path);
    let settings = store.snapshot().await?;

    // 2. Run the batch in the background, Ctrl-C stops it between items
    let uploader = Arc::new(Uploader::new(
        Arc::new(SshConnector::default()),
        Arc::new(TracingProgress),
        Arc::new(PrintUrls),
        UploaderConfig::default(),
    ));
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let report = uploader
        .spawn(BatchRequest::new(files, prefix.as_deref()), settings, cancel)
        .join()
        .await?;
    ctrl_c.abort();

    // 3. Summarise
    for result in &report.results {
        let status = if result.success { "ok  " } else { "FAIL" };
        println!("{} {}", status, result.filename);
    }
    println!("{}", report.message);

    match report.outcome {
        BatchOutcome::ConfigurationError(_) => std::process::exit(2),
        _ if report.success_count < report.results.len() => std::process::exit(1),
        _ => Ok(()),
    }
}
