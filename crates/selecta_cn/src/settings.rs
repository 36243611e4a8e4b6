//! Combobox settings file
//!
//! Presentation defaults shared by every combobox of an app, loaded from TOML:
//!
//! ```toml
//! placeholder = "Select your city"
//! search_placeholder = "Search..."
//! searchable = true
//! close_on_select = true
//! debounce_ms = 200
//! dropdown_class_name = "cities"
//! ```
//!
//! Missing keys fall back to their defaults. Apply with
//! [`ComboboxConfig::settings`](crate::components::combobox::ComboboxConfig::settings).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid combobox settings: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ComboboxSettings {
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
    #[serde(default = "default_search_placeholder")]
    pub search_placeholder: String,
    #[serde(default = "default_true")]
    pub searchable: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default = "default_true")]
    pub close_on_select: bool,
    /// Search debounce in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub dropdown_class_name: Option<String>,
}

fn default_placeholder() -> String {
    "Select your city".to_string()
}

fn default_search_placeholder() -> String {
    "Search...".to_string()
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    200
}

impl Default for ComboboxSettings {
    fn default() -> Self {
        Self {
            placeholder: default_placeholder(),
            search_placeholder: default_search_placeholder(),
            searchable: true,
            disabled: false,
            close_on_select: true,
            debounce_ms: default_debounce_ms(),
            class_name: None,
            dropdown_class_name: None,
        }
    }
}

impl ComboboxSettings {
    pub fn from_toml_str(source: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let settings = ComboboxSettings::from_toml_str("").unwrap();
        assert_eq!(settings, ComboboxSettings::default());
        assert_eq!(settings.placeholder, "Select your city");
        assert_eq!(settings.search_placeholder, "Search...");
        assert_eq!(settings.debounce(), Duration::from_millis(200));
        assert!(settings.searchable && settings.close_on_select && !settings.disabled);
    }

    #[test]
    fn test_partial_override() {
        let settings = ComboboxSettings::from_toml_str(
            r#"
            placeholder = "Pick a city"
            close_on_select = false
            debounce_ms = 50
            dropdown_class_name = "cities"
            "#,
        )
        .unwrap();
        assert_eq!(settings.placeholder, "Pick a city");
        assert!(!settings.close_on_select);
        assert_eq!(settings.debounce_ms, 50);
        assert_eq!(settings.dropdown_class_name.as_deref(), Some("cities"));
        assert_eq!(settings.search_placeholder, "Search...");
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            ComboboxSettings::from_toml_str("debounce_ms = \"soon\""),
            Err(SettingsError::Parse(_))
        ));
        assert!(matches!(
            ComboboxSettings::from_path("/definitely/not/here.toml"),
            Err(SettingsError::Io { .. })
        ));
    }
}
