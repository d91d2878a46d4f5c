use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub ingestion: FileIngestionConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_upload_bytes: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileIngestionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_senders_limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spool_dir: Option<PathBuf>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub max_upload_bytes: Option<u64>,
    pub top_senders_limit: Option<usize>,
    pub spool_dir: Option<PathBuf>,
    /// Variables that were set but could not be parsed, as `(name, raw)`.
    pub rejected: Vec<(&'static str, String)>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env_config = Self::default();

        env_config.config_path =
            non_empty(lookup("MAILTALLY_CONFIG")).map(PathBuf::from);
        env_config.server_host = non_empty(lookup("SERVER_HOST"));
        env_config.server_port =
            env_config.parse_var("SERVER_PORT", lookup("SERVER_PORT"));
        env_config.max_upload_bytes = env_config
            .parse_var("MAX_UPLOAD_BYTES", lookup("MAX_UPLOAD_BYTES"));
        env_config.top_senders_limit = env_config
            .parse_var("TOP_SENDERS_LIMIT", lookup("TOP_SENDERS_LIMIT"));
        env_config.spool_dir =
            non_empty(lookup("INGEST_SPOOL_DIR")).map(PathBuf::from);

        env_config
    }

    fn parse_var<T: std::str::FromStr>(
        &mut self,
        name: &'static str,
        raw: Option<String>,
    ) -> Option<T> {
        let raw = non_empty(raw)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                self.rejected.push((name, raw));
                None
            }
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> EnvConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn parses_known_variables() {
        let env = lookup(&[
            ("SERVER_HOST", "127.0.0.1"),
            ("SERVER_PORT", "9090"),
            ("MAX_UPLOAD_BYTES", "1048576"),
            ("TOP_SENDERS_LIMIT", " 25 "),
            ("INGEST_SPOOL_DIR", "/var/spool/mailtally"),
        ]);

        assert_eq!(env.server_host.as_deref(), Some("127.0.0.1"));
        assert_eq!(env.server_port, Some(9090));
        assert_eq!(env.max_upload_bytes, Some(1_048_576));
        assert_eq!(env.top_senders_limit, Some(25));
        assert_eq!(
            env.spool_dir,
            Some(PathBuf::from("/var/spool/mailtally"))
        );
        assert!(env.rejected.is_empty());
    }

    #[test]
    fn unparsable_values_are_rejected_not_fatal() {
        let env = lookup(&[("SERVER_PORT", "eighty"), ("SERVER_HOST", "  ")]);

        assert_eq!(env.server_port, None);
        assert_eq!(env.server_host, None);
        assert_eq!(env.rejected, vec![("SERVER_PORT", "eighty".to_string())]);
    }

    #[test]
    fn file_config_parses_sections() {
        let file: FileConfig = toml::from_str(
            r#"
            [server]
            port = 7000

            [ingestion]
            top_senders_limit = 3
            "#,
        )
        .unwrap();

        assert_eq!(file.server.port, Some(7000));
        assert_eq!(file.server.host, None);
        assert_eq!(file.ingestion.top_senders_limit, Some(3));
    }
}
