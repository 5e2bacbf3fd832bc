//! Signed wallet identities.
//!
//! An [`AuthIdentity`] is an auth chain rooted at the wallet (`SIGNER`) that
//! delegates to a short-lived ephemeral key, plus the ephemeral key itself and
//! the delegation's expiration. The JSON shape is shared with the SSO service.

pub mod authenticator;
mod current;
pub mod store;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};

pub use self::current::CurrentIdentity;
pub use self::store::{IdentityStore, LocalIdentityCache, SsoIdentityStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthLinkType {
    #[serde(rename = "SIGNER")]
    Signer,
    #[serde(rename = "ECDSA_EPHEMERAL")]
    EcdsaPersonalEphemeral,
    #[serde(rename = "ECDSA_SIGNED_ENTITY")]
    EcdsaPersonalSignedEntity,
    #[serde(rename = "ECDSA_EIP_1654_EPHEMERAL")]
    EcdsaEip1654Ephemeral,
    #[serde(rename = "ECDSA_EIP_1654_SIGNED_ENTITY")]
    EcdsaEip1654SignedEntity,
}

impl AuthLinkType {
    pub fn is_ephemeral(self) -> bool {
        matches!(
            self,
            Self::EcdsaPersonalEphemeral | Self::EcdsaEip1654Ephemeral
        )
    }
}

/// One attestation in an auth chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthLink {
    #[serde(rename = "type")]
    pub kind: AuthLinkType,
    pub payload: String,
    #[serde(default)]
    pub signature: String,
}

impl AuthLink {
    pub fn signer(address: impl Into<String>) -> Self {
        Self {
            kind: AuthLinkType::Signer,
            payload: address.into(),
            signature: String::new(),
        }
    }
}

pub type AuthChain = Vec<AuthLink>;

/// Ephemeral key pair the chain delegates to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EphemeralIdentity {
    pub address: String,
    pub public_key: String,
    #[serde(serialize_with = "serialize_secret")]
    pub private_key: SecretString,
}

impl PartialEq for EphemeralIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
            && self.public_key == other.public_key
            && self.private_key.expose_secret() == other.private_key.expose_secret()
    }
}

impl Eq for EphemeralIdentity {}

fn serialize_secret<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthIdentity {
    pub ephemeral_identity: EphemeralIdentity,
    pub expiration: DateTime<Utc>,
    pub auth_chain: AuthChain,
}

impl AuthIdentity {
    /// Expired once `now` reaches the expiration timestamp.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// At least one ephemeral link carries a non-empty signature.
    pub fn has_ephemeral_signature(&self) -> bool {
        self.auth_chain
            .iter()
            .any(|link| link.kind.is_ephemeral() && !link.signature.is_empty())
    }

    /// Lowercased wallet address that owns this identity.
    pub fn owner_address(&self) -> Option<String> {
        authenticator::owner_address(&self.auth_chain)
    }
}

/// Whether an identity is present, unexpired at `now`, and ephemerally signed.
pub fn is_valid_at(identity: Option<&AuthIdentity>, now: DateTime<Utc>) -> bool {
    match identity {
        Some(identity) => !identity.is_expired_at(now) && identity.has_ephemeral_signature(),
        None => false,
    }
}

pub fn is_valid(identity: Option<&AuthIdentity>) -> bool {
    is_valid_at(identity, Utc::now())
}

/// Keep only a usable identity.
pub fn usable(identity: Option<AuthIdentity>) -> Option<AuthIdentity> {
    identity.filter(|identity| is_valid(Some(identity)))
}
