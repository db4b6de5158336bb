// demos/generate_key.rs
// Run with: cargo run --example generate_key -- <settings.json> [--probe]

use niscp::{JsonSettingsStore, PROBE_TIMEOUT, SettingsStore, generate_keypair, probe_connection};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let settings_path = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: generate_key <settings.json> [--probe]"))?;
    let probe_only = args.next().as_deref() == Some("--probe");
    let store = JsonSettingsStore::new(settings_path);

    if !probe_only {
        // 1. Generate and store a new keypair
        let keypair = generate_keypair()?;
        store
            .update_keys(&keypair.private_key, &keypair.public_key)
            .await?;
        println!("Add this line to ~/.ssh/authorized_keys on the server:\n");
        println!("{}\n", keypair.public_key);
    }

    // 2. Check the stored credentials against the configured host
    let settings = store.snapshot().await?;
    if settings.hostname.is_empty() || settings.username.is_empty() {
        println!("No host configured, skipping connection test");
        return Ok(());
    }
    match probe_connection(
        &settings.hostname,
        settings.port,
        &settings.username,
        &settings.private_key,
        PROBE_TIMEOUT,
    )
    .await
    {
        Ok(message) => println!("{message}"),
        Err(err) => println!("{err}"),
    }
    Ok(())
}
