use std::sync::Arc;

use tokio::sync::watch;

use super::{AuthIdentity, IdentityStore};
use crate::error::IdentityError;

/// The identity the console is currently acting as.
///
/// Setting an identity also persists it to the store under its owner
/// address; watchers observe every change through [`CurrentIdentity::subscribe`].
pub struct CurrentIdentity {
    store: Arc<dyn IdentityStore>,
    slot: watch::Sender<Option<AuthIdentity>>,
}

impl CurrentIdentity {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        let (slot, _) = watch::channel(None);
        Self { store, slot }
    }

    pub fn get(&self) -> Option<AuthIdentity> {
        self.slot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<AuthIdentity>> {
        self.slot.subscribe()
    }

    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }

    /// Replace the current identity, persisting a new one under its owner.
    pub async fn set(
        &self,
        identity: Option<AuthIdentity>,
    ) -> Result<Option<AuthIdentity>, IdentityError> {
        self.slot.send_replace(identity.clone());

        if let Some(identity) = &identity {
            let owner = identity.owner_address().ok_or_else(|| {
                IdentityError::InvalidChain("auth chain has no owner address".to_string())
            })?;
            self.store.store_identity(&owner, identity).await?;
        }
        Ok(identity)
    }

    /// Drop the identity locally and from the remote store for `account`.
    pub async fn sign_out(&self, account: &str) -> Result<(), IdentityError> {
        self.slot.send_replace(None);
        self.store.clear_identity(account).await
    }
}

impl std::fmt::Debug for CurrentIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrentIdentity")
            .field("owner", &self.slot.borrow().as_ref().and_then(|i| i.owner_address()))
            .finish()
    }
}
