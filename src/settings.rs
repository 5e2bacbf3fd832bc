//! File-backed settings.
//!
//! Stored as TOML in `~/.console-auth/config.toml`. Every field is optional so
//! a partial file only overrides what it names.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Settings loaded from the TOML config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Path prefix of the external login page (e.g. `/auth`).
    #[serde(default)]
    pub auth_path: Option<String>,

    /// Base URL of the SSO identity service.
    #[serde(default)]
    pub sso_url: Option<String>,

    /// HTTP timeout for SSO requests in milliseconds.
    #[serde(default)]
    pub sso_timeout_ms: Option<u64>,

    /// Directory holding the same-origin identity cache.
    #[serde(default)]
    pub identity_cache_dir: Option<PathBuf>,

    /// Chain to request when the console connects without an explicit one.
    #[serde(default)]
    pub default_chain_id: Option<u64>,

    /// `pretty` or `json`.
    #[serde(default)]
    pub log_format: Option<String>,
}

impl Settings {
    /// Default config path (`~/.console-auth/config.toml`).
    pub fn default_toml_path() -> PathBuf {
        crate::config::console_auth_home().join("config.toml")
    }

    /// Load settings from a TOML file. A missing file yields `Ok(None)`.
    pub fn load_toml(path: &Path) -> Result<Option<Self>, String> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("failed reading {}: {e}", path.display())),
        };
        toml::from_str(&data)
            .map(Some)
            .map_err(|e| format!("failed parsing {}: {e}", path.display()))
    }

    /// Overlay every field that `other` sets onto `self`.
    pub fn merge_from(&mut self, other: &Settings) {
        if other.auth_path.is_some() {
            self.auth_path = other.auth_path.clone();
        }
        if other.sso_url.is_some() {
            self.sso_url = other.sso_url.clone();
        }
        if other.sso_timeout_ms.is_some() {
            self.sso_timeout_ms = other.sso_timeout_ms;
        }
        if other.identity_cache_dir.is_some() {
            self.identity_cache_dir = other.identity_cache_dir.clone();
        }
        if other.default_chain_id.is_some() {
            self.default_chain_id = other.default_chain_id;
        }
        if other.log_format.is_some() {
            self.log_format = other.log_format.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        let loaded = Settings::load_toml(&dir.path().join("absent.toml")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "sso_url = \"https://id.example.org\"\ndefault_chain_id = 137\n",
        )
        .unwrap();

        let mut settings = Settings {
            auth_path: Some("/auth".to_string()),
            ..Default::default()
        };
        let overlay = Settings::load_toml(&path).unwrap().unwrap();
        settings.merge_from(&overlay);

        assert_eq!(settings.auth_path.as_deref(), Some("/auth"));
        assert_eq!(settings.sso_url.as_deref(), Some("https://id.example.org"));
        assert_eq!(settings.default_chain_id, Some(137));
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_chain_id = \"polygon\"\n").unwrap();

        let err = Settings::load_toml(&path).unwrap_err();
        assert!(err.contains("config.toml"));
    }
}
