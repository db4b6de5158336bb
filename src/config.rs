use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::SettingsError;
use crate::types::{DEFAULT_CUSTOM_WIDTH, DEFAULT_PORT, TransferSettings};

pub const KEY_HOSTNAME: &str = "hostname";
pub const KEY_PORT: &str = "port";
pub const KEY_USERNAME: &str = "username";
pub const KEY_REMOTE_DIRECTORY: &str = "remote_directory";
pub const KEY_URL_PREFIX: &str = "url_prefix";
pub const KEY_USE_ORIGINAL_SIZE: &str = "use_original_size";
pub const KEY_CUSTOM_WIDTH: &str = "custom_width";
pub const KEY_PRIVATE_KEY: &str = "private_key";
pub const KEY_PUBLIC_KEY: &str = "public_key";

/// Persistent settings with field-level writers
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Current settings; absent keys take their defaults
    async fn snapshot(&self) -> Result<TransferSettings, SettingsError>;

    /// Sets several keys in one atomic write
    async fn upsert(&self, entries: Vec<(&'static str, Value)>) -> Result<(), SettingsError>;

    async fn update_hostname(&self, hostname: &str) -> Result<(), SettingsError> {
        self.upsert(vec![(KEY_HOSTNAME, json!(hostname))]).await
    }

    async fn update_port(&self, port: u16) -> Result<(), SettingsError> {
        self.upsert(vec![(KEY_PORT, json!(port))]).await
    }

    async fn update_username(&self, username: &str) -> Result<(), SettingsError> {
        self.upsert(vec![(KEY_USERNAME, json!(username))]).await
    }

    async fn update_remote_directory(&self, directory: &str) -> Result<(), SettingsError> {
        self.upsert(vec![(KEY_REMOTE_DIRECTORY, json!(directory))])
            .await
    }

    async fn update_url_prefix(&self, url_prefix: &str) -> Result<(), SettingsError> {
        self.upsert(vec![(KEY_URL_PREFIX, json!(url_prefix))]).await
    }

    async fn update_image_size(
        &self,
        use_original_size: bool,
        custom_width: u32,
    ) -> Result<(), SettingsError> {
        self.upsert(vec![
            (KEY_USE_ORIGINAL_SIZE, json!(use_original_size)),
            (KEY_CUSTOM_WIDTH, json!(custom_width)),
        ])
        .await
    }

    async fn update_keys(&self, private_key: &str, public_key: &str) -> Result<(), SettingsError> {
        self.upsert(vec![
            (KEY_PRIVATE_KEY, json!(private_key)),
            (KEY_PUBLIC_KEY, json!(public_key)),
        ])
        .await
    }
}

/// Settings kept as a flat JSON object in one file
#[derive(Debug)]
pub struct JsonSettingsStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<Map<String, Value>, SettingsError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Map::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_map(&self, map: &Map<String, Value>) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, serde_json::to_vec_pretty(map)?).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

/// Builds a settings snapshot from stored values
///
/// Values of the wrong type are treated as absent.
pub fn settings_from_map(map: &Map<String, Value>) -> TransferSettings {
    let text = |key: &str| {
        map.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    TransferSettings {
        hostname: text(KEY_HOSTNAME),
        port: map
            .get(KEY_PORT)
            .and_then(Value::as_u64)
            .and_then(|port| u16::try_from(port).ok())
            .unwrap_or(DEFAULT_PORT),
        username: text(KEY_USERNAME),
        remote_directory: text(KEY_REMOTE_DIRECTORY),
        url_prefix: text(KEY_URL_PREFIX),
        use_original_size: match map.get(KEY_USE_ORIGINAL_SIZE) {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(flag)) => flag.parse().unwrap_or(true),
            _ => true,
        },
        custom_width: map
            .get(KEY_CUSTOM_WIDTH)
            .and_then(Value::as_u64)
            .and_then(|width| u32::try_from(width).ok())
            .unwrap_or(DEFAULT_CUSTOM_WIDTH),
        private_key: text(KEY_PRIVATE_KEY),
        public_key: text(KEY_PUBLIC_KEY),
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn snapshot(&self) -> Result<TransferSettings, SettingsError> {
        Ok(settings_from_map(&self.read_map().await?))
    }

    async fn upsert(&self, entries: Vec<(&'static str, Value)>) -> Result<(), SettingsError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        for (key, value) in entries {
            debug!("Updating setting {}", key);
            map.insert(key.to_string(), value);
        }
        self.write_map(&map).await
    }
}
