use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::auth::EmailConfig;
use crate::translate::DEFAULT_LANGUAGE;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_TRANSLATE_URL: &str = "https://libretranslate.de/translate";
const DEFAULT_SMTP_PORT: u16 = 587;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    fn set(&mut self, value: T, source: ConfigSource) {
        self.value = value;
        self.source = source;
    }
}

/// SMTP section of the config file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    #[serde(skip_serializing)]
    pub pass: Option<String>,
    pub from_email: Option<String>,
}

/// Server configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub port: ConfigValue<u16>,
    pub database_path: ConfigValue<PathBuf>,
    /// Base URL used in share, magic and reset links
    pub public_url: ConfigValue<String>,
    pub translate_url: ConfigValue<String>,
    /// Language the UI strings are written in
    pub default_language: ConfigValue<String>,
    pub smtp: SmtpConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    port: Option<u16>,
    database_path: Option<PathBuf>,
    public_url: Option<String>,
    translate_url: Option<String>,
    default_language: Option<String>,
    smtp: Option<SmtpConfig>,
}

impl ServerConfig {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = config_path
            .or_else(|| std::env::var("SHOPLIST_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(Self::default_config_path);
        Self::load_with(&path, |key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::load`] with an explicit environment lookup.
    pub fn load_with(
        path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut port = ConfigValue::new(DEFAULT_PORT, ConfigSource::Default);
        let mut database_path = ConfigValue::new(
            default_data_dir().join("shoplist.db"),
            ConfigSource::Default,
        );
        let mut public_url: Option<ConfigValue<String>> = None;
        let mut translate_url =
            ConfigValue::new(DEFAULT_TRANSLATE_URL.to_string(), ConfigSource::Default);
        let mut default_language =
            ConfigValue::new(DEFAULT_LANGUAGE.to_string(), ConfigSource::Default);
        let mut smtp = SmtpConfig::default();
        let mut config_file = None;

        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
            let file: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;

            config_file = Some(path.to_path_buf());

            if let Some(value) = file.port {
                port.set(value, ConfigSource::File);
            }
            if let Some(db_path) = file.database_path {
                // Relative paths are relative to the config file
                let resolved = if db_path.is_relative() {
                    path.parent().map(|p| p.join(&db_path)).unwrap_or(db_path)
                } else {
                    db_path
                };
                database_path.set(resolved, ConfigSource::File);
            }
            if let Some(value) = file.public_url {
                public_url = Some(ConfigValue::new(value, ConfigSource::File));
            }
            if let Some(value) = file.translate_url {
                translate_url.set(value, ConfigSource::File);
            }
            if let Some(value) = file.default_language {
                default_language.set(value, ConfigSource::File);
            }
            if let Some(value) = file.smtp {
                smtp = value;
            }
        }

        if let Some(value) = env("SHOPLIST_PORT") {
            let parsed = value
                .parse()
                .map_err(|_| ConfigError::Invalid("SHOPLIST_PORT", value.clone()))?;
            port.set(parsed, ConfigSource::Environment);
        }
        if let Some(value) = env("SHOPLIST_DATABASE_PATH") {
            database_path.set(PathBuf::from(value), ConfigSource::Environment);
        }
        if let Some(value) = env("SHOPLIST_PUBLIC_URL") {
            public_url = Some(ConfigValue::new(value, ConfigSource::Environment));
        }
        if let Some(value) = env("SHOPLIST_TRANSLATE_URL") {
            translate_url.set(value, ConfigSource::Environment);
        }
        if let Some(value) = env("SHOPLIST_DEFAULT_LANGUAGE") {
            default_language.set(value, ConfigSource::Environment);
        }
        if let Some(value) = env("SHOPLIST_SMTP_HOST") {
            smtp.host = Some(value);
        }
        if let Some(value) = env("SHOPLIST_SMTP_PORT") {
            smtp.port = Some(
                value
                    .parse()
                    .map_err(|_| ConfigError::Invalid("SHOPLIST_SMTP_PORT", value.clone()))?,
            );
        }
        if let Some(value) = env("SHOPLIST_SMTP_USER") {
            smtp.user = Some(value);
        }
        if let Some(value) = env("SHOPLIST_SMTP_PASS") {
            smtp.pass = Some(value);
        }
        if let Some(value) = env("SHOPLIST_FROM_EMAIL") {
            smtp.from_email = Some(value);
        }

        let public_url = public_url.unwrap_or_else(|| {
            ConfigValue::new(
                format!("http://localhost:{}", port.value),
                ConfigSource::Default,
            )
        });

        Ok(Self {
            port,
            database_path,
            public_url,
            translate_url,
            default_language,
            smtp,
            config_file,
        })
    }

    /// SMTP settings, when a host is configured.
    pub fn email_config(&self) -> Option<EmailConfig> {
        let host = self.smtp.host.clone()?;
        Some(EmailConfig {
            smtp_host: host,
            smtp_port: self.smtp.port.unwrap_or(DEFAULT_SMTP_PORT),
            smtp_user: self.smtp.user.clone(),
            smtp_pass: self.smtp.pass.clone(),
            from_email: self
                .smtp
                .from_email
                .clone()
                .unwrap_or_else(|| "noreply@localhost".to_string()),
            from_name: "Shoplist".to_string(),
        })
    }

    /// Default config file path: ~/.config/shoplist/server.yaml
    pub fn default_config_path() -> PathBuf {
        default_config_dir().join("server.yaml")
    }
}

/// Platform config directory for shoplist, e.g. ~/.config/shoplist/
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shoplist")
}

/// Platform data directory for shoplist, e.g. ~/.local/share/shoplist/
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shoplist")
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    Read(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    Parse(PathBuf, #[source] serde_yaml::Error),
    #[error("Invalid value for {0}: '{1}'")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let temp_dir = tempdir().unwrap();
        let config =
            ServerConfig::load_with(&temp_dir.path().join("missing.yaml"), no_env).unwrap();

        assert_eq!(config.port.value, 8080);
        assert_eq!(config.port.source, ConfigSource::Default);
        assert_eq!(config.public_url.value, "http://localhost:8080");
        assert_eq!(config.default_language.value, "en");
        assert!(config.config_file.is_none());
        assert!(config.email_config().is_none());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("server.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "port: 9000").unwrap();
        writeln!(file, "database_path: data/shoplist.db").unwrap();
        writeln!(file, "smtp:").unwrap();
        writeln!(file, "  host: smtp.example.com").unwrap();

        let config = ServerConfig::load_with(&config_path, no_env).unwrap();

        assert_eq!(config.port.value, 9000);
        assert_eq!(config.port.source, ConfigSource::File);
        assert_eq!(
            config.database_path.value,
            temp_dir.path().join("data/shoplist.db")
        );
        assert_eq!(config.public_url.value, "http://localhost:9000");

        let email = config.email_config().unwrap();
        assert_eq!(email.smtp_host, "smtp.example.com");
        assert_eq!(email.smtp_port, 587);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("server.yaml");
        std::fs::write(&config_path, "public_url: http://file\n").unwrap();

        let env: HashMap<&str, &str> = [
            ("SHOPLIST_PUBLIC_URL", "https://lists.example.com"),
            ("SHOPLIST_DEFAULT_LANGUAGE", "cs"),
        ]
        .into_iter()
        .collect();

        let config =
            ServerConfig::load_with(&config_path, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.public_url.value, "https://lists.example.com");
        assert_eq!(config.public_url.source, ConfigSource::Environment);
        assert_eq!(config.default_language.value, "cs");
    }

    #[test]
    fn test_invalid_port() {
        let temp_dir = tempdir().unwrap();
        let result = ServerConfig::load_with(&temp_dir.path().join("missing.yaml"), |k| {
            (k == "SHOPLIST_PORT").then(|| "eighty".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid("SHOPLIST_PORT", _))));
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("server.yaml");
        std::fs::write(&config_path, "invalid: yaml: content: [").unwrap();

        let err = ServerConfig::load_with(&config_path, no_env).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
