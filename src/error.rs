//! Error types for console-auth.

use serde::Serialize;

/// Top-level error type for the session subsystem.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("{0}")]
    NetworkSwitch(#[from] NetworkSwitchError),
}

/// Failure domains for log and status consumers.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDomain {
    Config,
    Connection,
    Identity,
    Network,
}

/// Structured error payload attached to log events.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub domain: ErrorDomain,
    pub code: &'static str,
    pub retryable: bool,
    pub message: String,
}

impl ErrorPayload {
    fn new(
        domain: ErrorDomain,
        code: &'static str,
        retryable: bool,
        message: impl Into<String>,
    ) -> Self {
        Self {
            domain,
            code,
            retryable,
            message: message.into(),
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while talking to a wallet provider or connector.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("Error getting provider")]
    ProviderUnavailable,

    #[error("Provider is not connected")]
    NotConnected,

    #[error("{message}")]
    Rpc { code: i64, message: String },

    #[error("Unexpected response to {method}: {reason}")]
    InvalidResponse { method: String, reason: String },

    #[error("Invalid connection params: {0}")]
    InvalidConnectionParams(String),

    #[error("Connector failed: {0}")]
    Connector(String),
}

impl WalletError {
    /// EIP-1193 "user rejected request".
    pub const USER_REJECTED: i64 = 4001;
    /// EIP-3085 "unrecognized chain id".
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;

    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }

    /// JSON-RPC error code, when the provider reported one.
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            Self::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn to_error_payload(&self) -> ErrorPayload {
        let (code, retryable) = match self {
            Self::ProviderUnavailable => ("connection.provider_unavailable", true),
            Self::NotConnected => ("connection.no_accounts", true),
            Self::Rpc { code, .. } if *code == Self::USER_REJECTED => {
                ("connection.user_rejected", true)
            }
            Self::Rpc { .. } => ("connection.rpc_failed", true),
            Self::InvalidResponse { .. } => ("connection.invalid_response", false),
            Self::InvalidConnectionParams(_) => ("connection.invalid_params", false),
            Self::Connector(_) => ("connection.connector_failed", true),
        };
        ErrorPayload::new(ErrorDomain::Connection, code, retryable, self.to_string())
    }
}

/// Identity storage and signing errors.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Identity store request failed: {reason}")]
    Store { reason: String },

    #[error("Identity serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid auth chain: {0}")]
    InvalidChain(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of a `switch_to` request. Connection state is never changed by these.
#[derive(Debug, thiserror::Error)]
pub enum NetworkSwitchError {
    #[error("Error switching network: {0}")]
    Switch(String),

    #[error("Error adding network: {0}")]
    AddNetwork(String),
}

impl Error {
    /// Message shown to the console user, without the domain prefix.
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(err) => err.to_string(),
            Self::Wallet(err) => err.to_string(),
            Self::Identity(err) => err.to_string(),
            Self::NetworkSwitch(err) => err.to_string(),
        }
    }

    /// Map errors into a structured surface for log consumers.
    pub fn to_error_payload(&self) -> ErrorPayload {
        match self {
            Self::Config(err) => {
                ErrorPayload::new(ErrorDomain::Config, "config.invalid", false, err.to_string())
            }
            Self::Wallet(err) => err.to_error_payload(),
            Self::Identity(err) => {
                let (code, retryable) = match err {
                    IdentityError::Store { .. } | IdentityError::Io(_) => {
                        ("identity.store_failed", true)
                    }
                    IdentityError::Serialization(_) => ("identity.malformed", false),
                    IdentityError::InvalidChain(_) => ("identity.invalid_chain", false),
                    IdentityError::Signing(_) => ("identity.signing_failed", false),
                };
                ErrorPayload::new(ErrorDomain::Identity, code, retryable, err.to_string())
            }
            Self::NetworkSwitch(err) => {
                let code = match err {
                    NetworkSwitchError::Switch(_) => "network.switch_failed",
                    NetworkSwitchError::AddNetwork(_) => "network.add_failed",
                };
                ErrorPayload::new(ErrorDomain::Network, code, true, err.to_string())
            }
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
