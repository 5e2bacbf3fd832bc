//! Wallet connection seams.
//!
//! A [`Connector`] opens and closes provider sessions and remembers the last
//! provider/chain pair. A [`Provider`] is the live connection: JSON-RPC
//! requests plus an optional event capability.

mod chain;
mod events;
pub mod rpc;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::WalletError;

pub use self::chain::{AddEthereumChainParameter, ChainId, NativeCurrency};
pub use self::events::{
    EventHandler, ListenerId, ListenerRegistry, ProviderEvent, ProviderEventKind, ProviderEvents,
};

/// Wallet integration in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    Injected,
    Magic,
    MagicTest,
    #[serde(rename = "formatic")]
    Fortmatic,
    Network,
    WalletConnect,
    WalletConnectV2,
    WalletLink,
    MetamaskMobile,
    AuthServer,
}

impl ProviderType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Injected => "injected",
            Self::Magic => "magic",
            Self::MagicTest => "magic_test",
            Self::Fortmatic => "formatic",
            Self::Network => "network",
            Self::WalletConnect => "wallet_connect",
            Self::WalletConnectV2 => "wallet_connect_v2",
            Self::WalletLink => "wallet_link",
            Self::MetamaskMobile => "metamask_mobile",
            Self::AuthServer => "auth_server",
        }
    }

    /// Integrations wired for `wallet_switchEthereumChain`.
    pub fn supports_network_switch(self) -> bool {
        matches!(
            self,
            Self::Injected | Self::Magic | Self::WalletConnect | Self::WalletConnectV2
        )
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live wallet connection.
#[async_trait]
pub trait Provider: Send + Sync + fmt::Debug {
    /// EIP-1193 style request.
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, WalletError>;

    /// Event capability, if this provider emits lifecycle events.
    fn events(&self) -> Option<&dyn ProviderEvents> {
        None
    }
}

/// Provider/chain pair remembered from the previous session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionData {
    pub provider_type: ProviderType,
    pub chain_id: ChainId,
}

/// Result of opening a provider session.
#[derive(Debug, Clone)]
pub struct Connection {
    pub provider: Option<Arc<dyn Provider>>,
    pub provider_type: ProviderType,
    pub chain_id: ChainId,
}

/// Wallet connection library.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        provider_type: ProviderType,
        chain_id: ChainId,
    ) -> Result<Connection, WalletError>;

    /// Previously used provider/chain pair, if any.
    fn connection_data(&self) -> Option<ConnectionData>;

    async fn disconnect(&self) -> Result<(), WalletError>;
}
