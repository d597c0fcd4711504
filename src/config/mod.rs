//! Configuration module for Registrar.
//!
//! Handles store, warehouse and catalog settings with environment variable
//! expansion.

mod settings;

pub use settings::{
    expand_env_vars, CatalogSettings, Settings, SettingsError, StoreSettings, WarehouseSettings,
};
