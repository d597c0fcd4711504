//! TOML-based configuration for Registrar.
//!
//! Supports a config file (registrar.toml) with environment variable
//! expansion.
//!
//! Example configuration:
//! ```toml
//! [store]
//! path = "./registrar.db"
//!
//! [warehouse]
//! path = "${WAREHOUSE_DB_PATH}"
//!
//! [warehouse.attach]
//! data = "./warehouse/data.db"
//! finance = "./warehouse/finance.db"
//!
//! [catalog]
//! cache_ttl_seconds = 300
//! schemas = ["data", "finance"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub warehouse: WarehouseSettings,
    pub catalog: CatalogSettings,
}

/// Metadata store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Path to the metadata database (supports ${ENV_VAR} expansion).
    pub path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: "./registrar.db".to_string(),
        }
    }
}

/// Warehouse connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WarehouseSettings {
    /// Path to the primary warehouse database (supports ${ENV_VAR} expansion).
    pub path: String,

    /// Databases to attach, keyed by schema name.
    pub attach: BTreeMap<String, String>,
}

impl Default for WarehouseSettings {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            attach: BTreeMap::new(),
        }
    }
}

/// Catalog introspection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// How long an introspected snapshot stays fresh.
    pub cache_ttl_seconds: u64,

    /// Schemas the validator reconciles graphs against.
    pub schemas: Vec<String>,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 300,
            schemas: vec!["main".to_string()],
        }
    }
}

impl StoreSettings {
    /// Store path with environment variables expanded.
    pub fn expanded_path(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.path)
    }
}

impl WarehouseSettings {
    /// Warehouse path with environment variables expanded.
    pub fn expanded_path(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.path)
    }

    /// Attach map with environment variables expanded in each path.
    pub fn expanded_attach(&self) -> Result<BTreeMap<String, String>, SettingsError> {
        self.attach
            .iter()
            .map(|(schema, path)| Ok((schema.clone(), expand_env_vars(path)?)))
            .collect()
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `REGISTRAR_CONFIG`
    /// 2. `./registrar.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("REGISTRAR_CONFIG") {
            return Self::from_file(&path);
        }

        let local = Path::new("registrar.toml");
        if local.exists() {
            return Self::from_file(local);
        }

        Ok(Settings::default())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' {
            if chars.peek() == Some(&'{') {
                chars.next(); // consume '{'
                let mut var_name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch == '}' {
                        chars.next(); // consume '}'
                        break;
                    }
                    var_name.push(ch);
                    chars.next();
                }
                let value = env::var(&var_name)
                    .map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
                result.push_str(&value);
            } else {
                // $VAR (ends at non-alphanumeric/underscore)
                let mut var_name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        var_name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if var_name.is_empty() {
                    // Just a lone $, keep it
                    result.push('$');
                } else {
                    let value = env::var(&var_name)
                        .map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
                    result.push_str(&value);
                }
            }
        } else {
            result.push(c);
        }
    }

    Ok(result)
}
