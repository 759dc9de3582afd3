//! Configuration loading from disk and the environment.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::ApiConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Base name of the configuration file (`api.yml`, `api.yaml` or `api.toml`).
pub const CONFIG_NAME: &str = "api";

/// Extensions tried, in order, for each search directory.
pub const CONFIG_EXTENSIONS: [&str; 3] = ["yml", "yaml", "toml"];

/// Prefix for environment overrides, e.g. `TRANSIT_HTTP_LISTEN_ADDRESS`.
pub const ENV_PREFIX: &str = "TRANSIT_";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no api.{{yml,yaml,toml}} found in {searched:?}")]
    NotFound { searched: Vec<PathBuf> },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unsupported config format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("configuration has {} issue(s)", .0.len())]
    Validation(Vec<ValidationError>),
}

impl ConfigError {
    /// Issue texts when the source was readable but failed validation.
    pub fn issues(&self) -> Option<Vec<String>> {
        match self {
            ConfigError::Validation(issues) => {
                Some(issues.iter().map(ToString::to_string).collect())
            }
            _ => None,
        }
    }
}

/// Where configuration is read from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// A single, explicitly named file.
    File(PathBuf),
    /// Search directories, tried in order, for `api.{yml,yaml,toml}`.
    Search(Vec<PathBuf>),
}

impl ConfigSource {
    /// The standard search path: `/run/config`, the working directory, then `extra`.
    pub fn standard(extra: Option<PathBuf>) -> Self {
        let mut dirs = vec![PathBuf::from("/run/config"), PathBuf::from(".")];
        dirs.extend(extra);
        ConfigSource::Search(dirs)
    }

    /// Resolve the file currently backing this source.
    pub fn resolve(&self) -> Result<PathBuf, ConfigError> {
        match self {
            ConfigSource::File(path) => Ok(path.clone()),
            ConfigSource::Search(dirs) => dirs
                .iter()
                .flat_map(|dir| {
                    CONFIG_EXTENSIONS
                        .iter()
                        .map(move |ext| dir.join(format!("{CONFIG_NAME}.{ext}")))
                })
                .find(|candidate| candidate.is_file())
                .ok_or_else(|| ConfigError::NotFound {
                    searched: dirs.clone(),
                }),
        }
    }

    /// Read, apply environment overrides, and validate.
    pub fn load(&self) -> Result<ApiConfig, ConfigError> {
        let path = self.resolve()?;
        let mut config = parse_file(&path)?;
        apply_env_overrides(&mut config, std::env::vars());

        validate_config(&config).map_err(ConfigError::Validation)?;

        Ok(config)
    }
}

/// Load and validate configuration from a single file.
pub fn load_config(path: &Path) -> Result<ApiConfig, ConfigError> {
    ConfigSource::File(path.to_path_buf()).load()
}

/// Parse a config file without validating it. The format follows the extension.
pub fn parse_file(path: &Path) -> Result<ApiConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yml") | Some("yaml") => {
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })
        }
        Some("toml") => toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        }),
        _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Overlay `TRANSIT_*` variables onto a parsed config.
///
/// List values are comma separated. A duration that does not parse is
/// replaced by zero so that validation reports the field.
pub fn apply_env_overrides<I>(config: &mut ApiConfig, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        let Some(field) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };

        match field {
            "LOG_LEVEL" => config.log_level = value,
            "TIMEOUTS_STARTUP" => config.timeouts.startup = parse_duration(&value),
            "TIMEOUTS_SHUTDOWN" => config.timeouts.shutdown = parse_duration(&value),
            "TIMEOUTS_READ_HEADER" => config.timeouts.read_header = parse_duration(&value),
            "HTTP_LISTEN_ADDRESS" => config.http.listen_address = value,
            "HTTP_CORS_ALLOWED_ORIGINS" => config.http.cors.allowed_origins = split_list(&value),
            "HTTP_TRUSTED_PROXIES" => config.http.trusted_proxies = split_list(&value),
            _ => tracing::debug!(variable = %key, "Ignoring unknown environment override"),
        }
    }
}

fn parse_duration(value: &str) -> std::time::Duration {
    humantime::parse_duration(value.trim()).unwrap_or_default()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
