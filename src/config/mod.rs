//! Configuration for console-auth.
//!
//! Settings are loaded with priority: env var > TOML config file > default.
//! `.env` in the working directory is loaded via dotenvy first, which never
//! overwrites variables that are already set.

pub(crate) mod helpers;

use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;
use crate::settings::Settings;
use crate::wallet::ChainId;

use self::helpers::{optional_env, parse_optional_env};

const DEFAULT_AUTH_PATH: &str = "/auth";
const DEFAULT_SSO_TIMEOUT_MS: u64 = 10_000;

/// Root directory for local state (`~/.console-auth`).
pub fn console_auth_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".console-auth")
}

/// Default identity cache directory (`~/.console-auth/identities`).
pub fn default_identity_cache_dir() -> PathBuf {
    console_auth_home().join("identities")
}

/// Main configuration for the session subsystem.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Path prefix of the external login page used by `authorize`.
    pub auth_path: String,
    pub sso: SsoConfig,
    pub default_chain_id: ChainId,
    pub log_format: LogFormat,
}

/// Cross-origin identity store configuration.
#[derive(Debug, Clone)]
pub struct SsoConfig {
    /// Remote identity service. `None` keeps identities in the local cache only.
    pub url: Option<Url>,
    pub timeout: Duration,
    pub cache_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str, key: &str) -> Result<Self, ConfigError> {
        match normalize_variant(value).as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected 'pretty' or 'json', got '{value}'"),
            }),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            auth_path: DEFAULT_AUTH_PATH.to_string(),
            sso: SsoConfig {
                url: None,
                timeout: Duration::from_millis(DEFAULT_SSO_TIMEOUT_MS),
                cache_dir: default_identity_cache_dir(),
            },
            default_chain_id: ChainId::ETHEREUM_MAINNET,
            log_format: LogFormat::Pretty,
        }
    }
}

impl SsoConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let url = optional_env("SSO_URL")?
            .or_else(|| settings.sso_url.clone())
            .map(|raw| parse_http_url(&raw, "SSO_URL"))
            .transpose()?;

        let timeout_ms = parse_optional_env::<u64>("SSO_TIMEOUT_MS", "a positive integer")?
            .or(settings.sso_timeout_ms)
            .unwrap_or(DEFAULT_SSO_TIMEOUT_MS);
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SSO_TIMEOUT_MS".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        let cache_dir = optional_env("IDENTITY_CACHE_DIR")?
            .map(PathBuf::from)
            .or_else(|| settings.identity_cache_dir.clone())
            .unwrap_or_else(default_identity_cache_dir);

        Ok(Self {
            url,
            timeout: Duration::from_millis(timeout_ms),
            cache_dir,
        })
    }
}

impl AuthConfig {
    /// Load from env with an optional TOML config file overlay.
    pub fn from_env_with_toml(toml_path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let mut settings = Settings::default();
        Self::apply_toml_overlay(&mut settings, toml_path)?;
        Self::build(&settings)
    }

    /// Load and merge a TOML config file into settings.
    ///
    /// If `explicit_path` is `Some`, loads from that path (errors are fatal).
    /// If `None`, tries the default path (missing file is silently ignored).
    fn apply_toml_overlay(
        settings: &mut Settings,
        explicit_path: Option<&Path>,
    ) -> Result<(), ConfigError> {
        let path = explicit_path
            .map(PathBuf::from)
            .unwrap_or_else(Settings::default_toml_path);

        match Settings::load_toml(&path) {
            Ok(Some(toml_settings)) => {
                settings.merge_from(&toml_settings);
                tracing::debug!("Loaded TOML config from {}", path.display());
            }
            Ok(None) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
            }
            Err(e) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(e));
                }
                tracing::warn!("Failed to load default config file: {}", e);
            }
        }
        Ok(())
    }

    pub(crate) fn build(settings: &Settings) -> Result<Self, ConfigError> {
        let auth_path = optional_env("AUTH_PATH")?
            .or_else(|| settings.auth_path.clone())
            .unwrap_or_else(|| DEFAULT_AUTH_PATH.to_string());
        let auth_path = auth_path.trim_end_matches('/').to_string();

        let default_chain_id = parse_optional_env::<u64>("DEFAULT_CHAIN_ID", "a chain id")?
            .or(settings.default_chain_id)
            .map(ChainId::new)
            .unwrap_or(ChainId::ETHEREUM_MAINNET);
        if !default_chain_id.is_known() {
            return Err(ConfigError::InvalidValue {
                key: "DEFAULT_CHAIN_ID".to_string(),
                message: format!("unsupported chain id {}", default_chain_id.value()),
            });
        }

        let log_format = LogFormat::parse(
            &optional_env("LOG_FORMAT")?
                .or_else(|| settings.log_format.clone())
                .unwrap_or_else(|| "pretty".to_string()),
            "LOG_FORMAT",
        )?;

        Ok(Self {
            auth_path,
            sso: SsoConfig::resolve(settings)?,
            default_chain_id,
            log_format,
        })
    }
}

fn normalize_variant(value: &str) -> String {
    value.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}

fn parse_http_url(raw: &str, key: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("must be a valid URL: {e}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    Ok(url)
}
