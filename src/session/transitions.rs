//! Transition handlers for the asynchronous phases.
//!
//! Each handler runs its steps strictly in sequence and always resolves to a
//! resting state; failures are rendered into `SessionState::error` rather
//! than returned.

use std::sync::Arc;

use crate::error::{Error, WalletError};
use crate::identity::{self, AuthIdentity, CurrentIdentity, IdentityStore};
use crate::wallet::{ChainId, Connector, Provider, ProviderType, rpc};

use super::state::SessionState;

/// Collaborators shared by every transition.
#[derive(Clone)]
pub struct SessionDeps {
    pub connector: Arc<dyn Connector>,
    pub store: Arc<dyn IdentityStore>,
    pub identity: Arc<CurrentIdentity>,
}

/// Where to look for a previously issued identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdentitySource {
    /// Local cache first, then the remote store.
    CacheThenRemote,
    RemoteOnly,
}

/// `Restoring` → `Connected` | `Disconnected`.
///
/// A missing, expired or unsigned identity is a normal outcome and resolves
/// to `Disconnected` without an error.
pub async fn restore_connection(deps: SessionDeps) -> SessionState {
    let Some(data) = deps.connector.connection_data() else {
        tracing::debug!("No previous wallet connection to restore");
        return SessionState::disconnected();
    };

    tracing::info!(
        provider_type = %data.provider_type,
        chain_id = data.chain_id.value(),
        "Restoring wallet session"
    );

    match establish(
        &deps,
        data.provider_type,
        data.chain_id,
        IdentitySource::CacheThenRemote,
    )
    .await
    {
        Ok(Some(state)) => state,
        Ok(None) => SessionState::disconnected(),
        Err(err) => {
            let payload = err.to_error_payload();
            tracing::error!(code = payload.code, "Error restoring session: {}", err);
            SessionState::disconnected_with_error(err.user_message())
        }
    }
}

/// `Connecting` → `Connected` | `Disconnected`.
///
/// On failure the current identity is cleared before falling back.
pub async fn create_connection(
    deps: SessionDeps,
    provider_type: ProviderType,
    chain_id: ChainId,
) -> SessionState {
    tracing::info!(
        provider_type = %provider_type,
        chain_id = chain_id.value(),
        "Connecting wallet"
    );

    match establish(&deps, provider_type, chain_id, IdentitySource::RemoteOnly).await {
        Ok(Some(state)) => state,
        Ok(None) => SessionState::disconnected(),
        Err(err) => {
            let payload = err.to_error_payload();
            tracing::error!(code = payload.code, "Error creating session: {}", err);
            if let Err(clear_err) = deps.identity.set(None).await {
                tracing::warn!("Failed to clear current identity: {}", clear_err);
            }
            SessionState::disconnected_with_error(err.user_message())
        }
    }
}

/// open session → accounts → chain id → identity → validate → persist
async fn establish(
    deps: &SessionDeps,
    provider_type: ProviderType,
    chain_id: ChainId,
    source: IdentitySource,
) -> Result<Option<SessionState>, Error> {
    let connection = deps.connector.connect(provider_type, chain_id).await?;
    let provider: Arc<dyn Provider> = connection
        .provider
        .ok_or(WalletError::ProviderUnavailable)?;

    let accounts = rpc::fetch_accounts(provider.as_ref()).await?;
    let account = accounts
        .into_iter()
        .next()
        .ok_or(WalletError::NotConnected)?;
    let current_chain_id = rpc::fetch_chain_id(provider.as_ref()).await?;

    let Some(identity) = lookup_identity(deps.store.as_ref(), &account, source).await? else {
        tracing::info!(account = %account, "No usable identity for account");
        return Ok(None);
    };

    deps.identity.set(Some(identity.clone())).await?;
    tracing::info!(account = %account, chain_id = current_chain_id.value(), "Wallet session connected");

    Ok(Some(SessionState::connected(
        account,
        identity,
        provider,
        connection.provider_type,
        current_chain_id,
    )))
}

async fn lookup_identity(
    store: &dyn IdentityStore,
    account: &str,
    source: IdentitySource,
) -> Result<Option<AuthIdentity>, Error> {
    if source == IdentitySource::CacheThenRemote
        && let Some(identity) = identity::usable(store.local_get_identity(account))
    {
        tracing::debug!(account = %account, "Identity restored from local cache");
        return Ok(Some(identity));
    }

    let identity = store.get_identity(account).await?;
    Ok(identity::usable(identity))
}
