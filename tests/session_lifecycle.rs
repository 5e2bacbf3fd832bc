//! End-to-end session lifecycle against the file-backed identity store.
//!
//! A scripted wallet stands in for the connector; identities are real
//! EIP-191 chains signed with a well-known development key.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};
use tempfile::tempdir;
use tokio::time::timeout;
use tokio_test::assert_ok;

use console_auth::config::AuthConfig;
use console_auth::error::WalletError;
use console_auth::identity::{IdentityStore, LocalIdentityCache, SsoIdentityStore, authenticator};
use console_auth::session::{SessionManager, SessionStatus};
use console_auth::wallet::{
    ChainId, Connection, ConnectionData, Connector, ListenerRegistry, Provider, ProviderEvent,
    ProviderEventKind, ProviderEvents, ProviderType,
};

const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const DEV_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct ScriptedWallet {
    chain_id: Mutex<ChainId>,
    events: ListenerRegistry,
}

#[async_trait]
impl Provider for ScriptedWallet {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, WalletError> {
        match method {
            "eth_accounts" => Ok(json!([DEV_ADDRESS.to_ascii_uppercase().replace("0X", "0x")])),
            "eth_chainId" => Ok(json!(self.chain_id.lock().unwrap().to_hex())),
            "wallet_switchEthereumChain" => {
                let requested = params
                    .as_ref()
                    .and_then(|p| p[0]["chainId"].as_str())
                    .and_then(ChainId::parse)
                    .ok_or_else(|| WalletError::rpc(-32602, "invalid params"))?;
                if requested == ChainId::POLYGON_AMOY {
                    return Err(WalletError::rpc(
                        WalletError::UNRECOGNIZED_CHAIN,
                        "Unrecognized chain ID",
                    ));
                }
                *self.chain_id.lock().unwrap() = requested;
                Ok(Value::Null)
            }
            "wallet_addEthereumChain" => {
                let added = params
                    .as_ref()
                    .and_then(|p| p[0]["chainId"].as_str())
                    .and_then(ChainId::parse)
                    .ok_or_else(|| WalletError::rpc(-32602, "invalid params"))?;
                *self.chain_id.lock().unwrap() = added;
                Ok(Value::Null)
            }
            other => Err(WalletError::rpc(-32601, format!("method {other} not found"))),
        }
    }

    fn events(&self) -> Option<&dyn ProviderEvents> {
        Some(&self.events)
    }
}

struct ScriptedConnector {
    previous: Mutex<Option<ConnectionData>>,
    wallet: Arc<ScriptedWallet>,
    disconnects: AtomicUsize,
}

impl ScriptedConnector {
    fn new(previous: Option<ConnectionData>) -> Arc<Self> {
        Arc::new(Self {
            previous: Mutex::new(previous),
            wallet: Arc::new(ScriptedWallet {
                chain_id: Mutex::new(ChainId::POLYGON),
                events: ListenerRegistry::new(),
            }),
            disconnects: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        provider_type: ProviderType,
        chain_id: ChainId,
    ) -> Result<Connection, WalletError> {
        *self.wallet.chain_id.lock().unwrap() = chain_id;
        *self.previous.lock().unwrap() = Some(ConnectionData {
            provider_type,
            chain_id,
        });
        let provider: Arc<dyn Provider> = self.wallet.clone();
        Ok(Connection {
            provider: Some(provider),
            provider_type,
            chain_id,
        })
    }

    fn connection_data(&self) -> Option<ConnectionData> {
        *self.previous.lock().unwrap()
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        *self.previous.lock().unwrap() = None;
        Ok(())
    }
}

fn local_store(dir: &std::path::Path) -> Arc<SsoIdentityStore> {
    Arc::new(assert_ok!(SsoIdentityStore::new(
        LocalIdentityCache::new(dir),
        None,
        Duration::from_secs(1),
    )))
}

#[tokio::test]
async fn connect_sign_and_sign_out() {
    let dir = tempdir().unwrap();
    let store = local_store(dir.path());
    let identity = assert_ok!(authenticator::initialize_identity(
        &SecretString::from(DEV_KEY),
        Utc::now() + ChronoDuration::days(30),
    ));
    assert_ok!(store.store_identity(DEV_ADDRESS, &identity).await);

    let connector = ScriptedConnector::new(None);
    let manager = SessionManager::new(&AuthConfig::default(), connector.clone(), store.clone());

    assert_eq!(manager.restore().await.status, SessionStatus::Disconnected);

    let state = manager
        .connect(ProviderType::Injected, ChainId::POLYGON)
        .await;
    assert_eq!(state.status, SessionStatus::Connected);
    assert_eq!(manager.account().as_deref(), Some(DEV_ADDRESS));
    assert_eq!(state.identity.as_ref(), Some(&identity));

    let chain = assert_ok!(manager.sign_payload("POST:/missions"));
    assert_eq!(chain.len(), 3);
    assert_eq!(assert_ok!(authenticator::verify_auth_chain(&chain)), DEV_ADDRESS);

    let state = manager.disconnect(true).await;
    assert_eq!(state.status, SessionStatus::Disconnected);
    assert_eq!(connector.disconnects.load(Ordering::SeqCst), 1);
    assert!(store.local_get_identity(DEV_ADDRESS).is_none());
}

#[tokio::test]
async fn restore_picks_up_previous_session() {
    let dir = tempdir().unwrap();
    let store = local_store(dir.path());
    let identity = assert_ok!(authenticator::initialize_identity(
        &SecretString::from(DEV_KEY),
        Utc::now() + ChronoDuration::days(1),
    ));
    assert_ok!(store.store_identity(DEV_ADDRESS, &identity).await);

    let connector = ScriptedConnector::new(Some(ConnectionData {
        provider_type: ProviderType::WalletConnectV2,
        chain_id: ChainId::SEPOLIA,
    }));
    let manager = SessionManager::new(&AuthConfig::default(), connector.clone(), store);

    let state = manager.restore().await;
    assert_eq!(state.status, SessionStatus::Connected);
    assert_eq!(state.provider_type, Some(ProviderType::WalletConnectV2));
    assert_eq!(state.chain_id, Some(ChainId::SEPOLIA));

    let actions = manager.actions();
    assert!(!actions.loading);
    assert_eq!(actions.chain_id, Some(ChainId::SEPOLIA));
}

#[tokio::test]
async fn expired_identity_is_not_restored() {
    let dir = tempdir().unwrap();
    let store = local_store(dir.path());
    let identity = assert_ok!(authenticator::initialize_identity(
        &SecretString::from(DEV_KEY),
        Utc::now() - ChronoDuration::seconds(1),
    ));
    assert_ok!(store.store_identity(DEV_ADDRESS, &identity).await);

    let connector = ScriptedConnector::new(Some(ConnectionData {
        provider_type: ProviderType::Injected,
        chain_id: ChainId::POLYGON,
    }));
    let manager = SessionManager::new(&AuthConfig::default(), connector, store);

    let state = manager.restore().await;
    assert_eq!(state.status, SessionStatus::Disconnected);
    assert_eq!(state.error, None);
}

#[tokio::test]
async fn switching_to_an_unknown_network_registers_it() {
    let dir = tempdir().unwrap();
    let store = local_store(dir.path());
    let identity = assert_ok!(authenticator::initialize_identity(
        &SecretString::from(DEV_KEY),
        Utc::now() + ChronoDuration::days(1),
    ));
    assert_ok!(store.store_identity(DEV_ADDRESS, &identity).await);

    let connector = ScriptedConnector::new(None);
    let manager = SessionManager::new(&AuthConfig::default(), connector, store);
    manager.restore().await;
    manager
        .connect(ProviderType::Injected, ChainId::POLYGON)
        .await;

    let state = manager.switch_to(ChainId::POLYGON_AMOY).await;
    assert_eq!(state.status, SessionStatus::Connected);
    assert_eq!(state.chain_id, Some(ChainId::POLYGON_AMOY));
    assert_eq!(state.error, None);
}

#[tokio::test]
async fn wallet_disconnect_event_ends_the_session() {
    let dir = tempdir().unwrap();
    let store = local_store(dir.path());
    let identity = assert_ok!(authenticator::initialize_identity(
        &SecretString::from(DEV_KEY),
        Utc::now() + ChronoDuration::days(1),
    ));
    assert_ok!(store.store_identity(DEV_ADDRESS, &identity).await);

    let connector = ScriptedConnector::new(None);
    let manager = Arc::new(SessionManager::new(
        &AuthConfig::default(),
        connector.clone(),
        store.clone(),
    ));
    let event_loop = manager.spawn_event_loop();
    manager.restore().await;
    manager
        .connect(ProviderType::Injected, ChainId::POLYGON)
        .await;
    assert_eq!(
        connector
            .wallet
            .events
            .listener_count(ProviderEventKind::Disconnect),
        1
    );

    let mut updates = manager.subscribe();
    connector.wallet.events.emit(ProviderEvent::Disconnect);
    assert_ok!(
        timeout(
            TIMEOUT,
            updates.wait_for(|s| s.status == SessionStatus::Disconnected)
        )
        .await
    );

    // Wallet-initiated disconnects keep the identity for the next login.
    assert!(store.local_get_identity(DEV_ADDRESS).is_some());
    assert_eq!(
        connector
            .wallet
            .events
            .listener_count(ProviderEventKind::Disconnect),
        0
    );
    event_loop.abort();
}
