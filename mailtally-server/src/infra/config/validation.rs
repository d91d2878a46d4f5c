use thiserror::Error;

use super::models::Config;

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },
    #[error("spool directory {path} is not a directory")]
    SpoolNotDirectory { path: std::path::PathBuf },
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }
}

/// Hard failures for settings the server cannot run with, plus warnings
/// for ones that are merely suspicious.
pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    if config.server.max_upload_bytes == 0 {
        return Err(ConfigGuardRailError::ZeroValue {
            field: "server.max_upload_bytes",
        });
    }

    if let Some(dir) = &config.ingestion.spool_dir
        && dir.exists()
        && !dir.is_dir()
    {
        return Err(ConfigGuardRailError::SpoolNotDirectory {
            path: dir.clone(),
        });
    }

    if config.server.port == 0 {
        warnings.push_with_hint(
            "server.port is 0; the OS will pick an ephemeral port",
            "Set SERVER_PORT or [server].port to a fixed port",
        );
    }

    if config.server.max_upload_bytes < 1024 * 1024 {
        warnings.push(format!(
            "server.max_upload_bytes is only {} bytes; most archives will be rejected",
            config.server.max_upload_bytes
        ));
    }

    Ok(warnings)
}
