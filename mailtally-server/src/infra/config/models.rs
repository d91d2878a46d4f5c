use std::{num::NonZeroUsize, path::PathBuf};

use mailtally_core::report::DEFAULT_TOP_SENDERS;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Fully resolved runtime configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub ingestion: IngestionConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted `/start` request body.
    pub max_upload_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub top_senders_limit: NonZeroUsize,
    /// Where uploads are spooled before ingestion. `None` uses the system
    /// temp directory.
    pub spool_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            top_senders_limit: NonZeroUsize::new(DEFAULT_TOP_SENDERS)
                .unwrap_or(NonZeroUsize::MIN),
            spool_dir: None,
        }
    }
}

impl Config {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Body limit for axum, saturating on 32-bit targets.
    pub fn body_limit(&self) -> usize {
        usize::try_from(self.server.max_upload_bytes).unwrap_or(usize::MAX)
    }
}
