use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::identity::AuthIdentity;
use crate::wallet::{ChainId, Provider, ProviderType};

/// Lifecycle phase of the wallet session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Restoring,
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Restoring => "restoring",
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        }
    }

    /// Anything other than the two resting states.
    pub fn is_loading(self) -> bool {
        !matches!(self, Self::Connected | Self::Disconnected)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the session. Replaced wholesale on every transition.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub status: SessionStatus,
    pub account: Option<String>,
    pub identity: Option<AuthIdentity>,
    pub provider: Option<Arc<dyn Provider>>,
    pub provider_type: Option<ProviderType>,
    pub chain_id: Option<ChainId>,
    pub error: Option<String>,
    pub selecting: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::initial()
    }
}

impl SessionState {
    /// State at application start.
    pub fn initial() -> Self {
        Self {
            status: SessionStatus::Restoring,
            account: None,
            identity: None,
            provider: None,
            provider_type: None,
            chain_id: None,
            error: None,
            selecting: false,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            status: SessionStatus::Disconnected,
            ..Self::initial()
        }
    }

    pub fn disconnected_with_error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::disconnected()
        }
    }

    pub fn connecting(provider_type: ProviderType, chain_id: ChainId, selecting: bool) -> Self {
        Self {
            status: SessionStatus::Connecting,
            provider_type: Some(provider_type),
            chain_id: Some(chain_id),
            selecting,
            ..Self::initial()
        }
    }

    pub fn disconnecting() -> Self {
        Self {
            status: SessionStatus::Disconnecting,
            ..Self::initial()
        }
    }

    pub fn connected(
        account: String,
        identity: AuthIdentity,
        provider: Arc<dyn Provider>,
        provider_type: ProviderType,
        chain_id: ChainId,
    ) -> Self {
        Self {
            status: SessionStatus::Connected,
            account: Some(account),
            identity: Some(identity),
            provider: Some(provider),
            provider_type: Some(provider_type),
            chain_id: Some(chain_id),
            error: None,
            selecting: false,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status.is_loading()
    }
}

/// Read-only view handed to the rest of the console.
///
/// Provider details are hidden while a transition or network switch is in
/// flight.
#[derive(Debug, Clone)]
pub struct SessionActions {
    pub loading: bool,
    pub error: Option<String>,
    pub selecting: bool,
    pub provider: Option<Arc<dyn Provider>>,
    pub provider_type: Option<ProviderType>,
    pub chain_id: Option<ChainId>,
}

impl SessionActions {
    pub(crate) fn from_state(state: &SessionState, switching: bool) -> Self {
        let loading = state.is_loading() || switching;
        Self {
            loading,
            error: state.error.clone(),
            selecting: state.selecting,
            provider: if loading { None } else { state.provider.clone() },
            provider_type: if loading { None } else { state.provider_type },
            chain_id: if loading { None } else { state.chain_id },
        }
    }
}
