use figment::{providers::Serialized, Figment};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::env::{env_overrides, expand_yaml_env};
use crate::paths::RootDirError;

/// Key under which the whole document is decoded (the "booter" configuration).
pub const BOOTER_KEY: &str = "booter";

/// Default prefix for environment overrides: `APP__DB__HOST=x` maps to `db.host`.
pub const DEFAULT_ENV_PREFIX: &str = "APP__";

/// Configuration errors. All of them are fatal during bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid root directory")]
    RootDir(#[from] RootDirError),
    #[error("configuration file not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("failed to read configuration file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed YAML in {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to decode configuration key '{key}'")]
    Decode {
        key: String,
        #[source]
        source: Box<figment::Error>,
    },
    #[error("configuration key '{key}' is missing and has no defaults")]
    MissingSection {
        key: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Loaded configuration document: expanded YAML layered under environment overrides.
///
/// Overrides are string-valued; typed fields get their value at decode time.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    path: PathBuf,
    figment: Figment,
}

impl ConfigDocument {
    /// Load `path`, expand `${NAME}` tokens in string values, then layer
    /// environment overrides with `env_prefix` on top (`None` disables them).
    pub fn load(path: impl AsRef<Path>, env_prefix: Option<&str>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();

        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound { path });
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        Self::from_yaml_str(&raw, path, env_prefix)
    }

    /// Build a document from YAML text; `origin` is only used in diagnostics.
    pub fn from_yaml_str(
        raw: &str,
        origin: impl Into<PathBuf>,
        env_prefix: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let path = origin.into();

        let mut value: serde_yaml::Value =
            serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        // An empty file is an empty document, not a null one.
        if value.is_null() {
            value = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
        }
        expand_yaml_env(&mut value);

        let mut figment = Figment::new().merge(Serialized::defaults(value));
        if let Some(prefix) = env_prefix.filter(|p| !p.is_empty()) {
            figment = figment.merge(Serialized::defaults(env_overrides(prefix)));
        }

        Ok(Self { path, figment })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `key` (dotted for nesting, e.g. `db.pool`) is present.
    pub fn contains(&self, key: &str) -> bool {
        key == BOOTER_KEY || self.figment.contains(key)
    }

    /// Decode `key` into `T`.
    ///
    /// [`BOOTER_KEY`] decodes the whole document. An absent key is decoded from
    /// an empty mapping so structs whose fields all have defaults still load.
    ///
    /// Strings are read leniently: `"5432"` decodes into a `u16` and `"true"`
    /// into a `bool`, so `${NAME}` tokens and environment overrides can feed
    /// typed fields.
    pub fn extract<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        let decoded = if key == BOOTER_KEY {
            self.figment.extract_lossy::<T>()
        } else if self.figment.contains(key) {
            self.figment.extract_inner_lossy::<T>(key)
        } else {
            return serde_yaml::from_value(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()))
                .map_err(|source| ConfigError::MissingSection {
                    key: key.to_string(),
                    source,
                });
        };

        decoded.map_err(|e| ConfigError::Decode {
            key: key.to_string(),
            source: Box::new(e),
        })
    }

    /// The `logging` section, or [`default_logging_config`] when absent.
    pub fn logging(&self) -> Result<LoggingConfig, ConfigError> {
        if self.figment.contains("logging") {
            self.extract("logging")
        } else {
            Ok(default_logging_config())
        }
    }
}

/// Logging configuration - maps subsystem names to their logging settings.
/// Key "default" is the catch-all for logs that don't match explicit subsystems.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Section {
    #[serde(default = "default_console_level")]
    pub console_level: String, // "trace" | "debug" | "info" | "warn" | "error" | "off"
    #[serde(default)]
    pub file: String, // empty => no file sink
    #[serde(default)]
    pub file_level: String,
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_backups: Option<usize>,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

fn default_console_level() -> String {
    "info".to_string()
}

impl Default for Section {
    fn default() -> Self {
        Self {
            console_level: default_console_level(),
            file: String::new(),
            file_level: String::new(),
            max_age_days: None,
            max_backups: None,
            max_size_mb: None,
        }
    }
}

/// Console-only `info` logging.
pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert("default".to_string(), Section::default());
    logging
}

/// `--debug`: raise the default console level to debug unless it is already trace.
pub fn apply_debug_level(logging: &mut LoggingConfig) {
    let section = logging.entry("default".to_string()).or_default();
    if !section.console_level.eq_ignore_ascii_case("trace") {
        section.console_level = "debug".to_string();
    }
}

#[cfg(test)]
mod tests;
