//! Session manager: owns the session state and drives every transition.
//!
//! All mutation goes through [`SessionManager::transition`], which replaces
//! the state wholesale and re-wires provider listeners. Restoration and
//! connection share one in-flight attempt slot so that repeated triggers join
//! the pending attempt instead of opening a second wallet session.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{Error, IdentityError, WalletError};
use crate::identity::{AuthChain, AuthIdentity, CurrentIdentity, IdentityStore, authenticator};
use crate::wallet::{
    ChainId, Connector, ListenerId, Provider, ProviderEvent, ProviderEventKind, ProviderType, rpc,
};

use super::state::{SessionActions, SessionState, SessionStatus};
use super::transitions::{self, SessionDeps};

#[derive(Clone)]
struct Attempt {
    id: Uuid,
    future: Shared<BoxFuture<'static, SessionState>>,
}

/// Listener registrations on the live provider; dropping detaches them.
struct ListenerGuard {
    provider: Arc<dyn Provider>,
    registrations: Vec<(ProviderEventKind, ListenerId)>,
}

impl ListenerGuard {
    fn attach(
        provider: Arc<dyn Provider>,
        generation: u64,
        events_tx: &mpsc::UnboundedSender<ForwardedEvent>,
    ) -> Option<Self> {
        let registrations = {
            let events = provider.events()?;
            ProviderEventKind::ALL
                .iter()
                .map(|&kind| {
                    let tx = events_tx.clone();
                    let id = events.subscribe(
                        kind,
                        Arc::new(move |event| {
                            let _ = tx.send(ForwardedEvent { generation, event });
                        }),
                    );
                    (kind, id)
                })
                .collect()
        };
        Some(Self {
            provider,
            registrations,
        })
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(events) = self.provider.events() {
            for (kind, id) in self.registrations.drain(..) {
                events.unsubscribe(kind, id);
            }
        }
    }
}

/// Login page under `auth_path` that redirects back to `current_url`.
pub fn authorize_url(auth_path: &str, current_url: &str) -> String {
    format!(
        "{}/login?redirectTo={}",
        auth_path.trim_end_matches('/'),
        urlencoding::encode(current_url)
    )
}

/// Provider event tagged with the listener registration it arrived through.
struct ForwardedEvent {
    generation: u64,
    event: ProviderEvent,
}

/// Counts in-flight network switches; dropping the guard releases one.
struct SwitchGuard<'a>(&'a AtomicUsize);

impl<'a> SwitchGuard<'a> {
    fn enter(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for SwitchGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Owns the wallet session for one console instance.
pub struct SessionManager {
    auth_path: String,
    deps: SessionDeps,
    state: watch::Sender<SessionState>,
    /// In-flight restore/connect attempt shared by concurrent triggers.
    attempt: Mutex<Option<Attempt>>,
    /// Bumped on shutdown; attempts started under an older epoch are discarded.
    epoch: AtomicU64,
    /// Network switches in flight.
    switching: AtomicUsize,
    listeners: StdMutex<Option<ListenerGuard>>,
    /// Bumped on every listener re-wire; events from older registrations are dropped.
    listener_generation: AtomicU64,
    events_tx: mpsc::UnboundedSender<ForwardedEvent>,
    events_rx: StdMutex<Option<mpsc::UnboundedReceiver<ForwardedEvent>>>,
}

impl SessionManager {
    pub fn new(
        config: &AuthConfig,
        connector: Arc<dyn Connector>,
        store: Arc<dyn IdentityStore>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::initial());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            auth_path: config.auth_path.clone(),
            deps: SessionDeps {
                connector,
                identity: Arc::new(CurrentIdentity::new(Arc::clone(&store))),
                store,
            },
            state,
            attempt: Mutex::new(None),
            epoch: AtomicU64::new(0),
            switching: AtomicUsize::new(0),
            listeners: StdMutex::new(None),
            listener_generation: AtomicU64::new(0),
            events_tx,
            events_rx: StdMutex::new(Some(events_rx)),
        }
    }

    /// Current snapshot.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status
    }

    /// Connected account, if any.
    pub fn account(&self) -> Option<String> {
        self.state.borrow().account.clone()
    }

    pub fn actions(&self) -> SessionActions {
        SessionActions::from_state(
            &self.state.borrow(),
            self.switching.load(Ordering::SeqCst) > 0,
        )
    }

    /// Observe every state replacement.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn current_identity(&self) -> &CurrentIdentity {
        &self.deps.identity
    }

    /// Replace the state if `next` yields one, then re-wire provider listeners.
    fn transition(&self, next: impl FnOnce(&SessionState) -> Option<SessionState>) -> bool {
        let changed = self.state.send_if_modified(|state| match next(state) {
            Some(replacement) => {
                *state = replacement;
                true
            }
            None => false,
        });
        if changed {
            self.rewire_listeners();
        }
        changed
    }

    fn rewire_listeners(&self) {
        let Ok(mut slot) = self.listeners.lock() else {
            return;
        };
        let previous = slot.take();

        let provider = {
            let state = self.state.borrow();
            if state.status == SessionStatus::Connected {
                state.provider.clone()
            } else {
                None
            }
        };
        let Some(provider) = provider else {
            self.listener_generation.fetch_add(1, Ordering::SeqCst);
            return;
        };

        // Same live provider: events already queued from it stay valid.
        let same_provider = previous
            .as_ref()
            .is_some_and(|guard| Arc::ptr_eq(&guard.provider, &provider));
        drop(previous);
        let generation = if same_provider {
            self.listener_generation.load(Ordering::SeqCst)
        } else {
            self.listener_generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        *slot = ListenerGuard::attach(provider, generation, &self.events_tx);
    }

    async fn join_or_start<F>(&self, start: F) -> Attempt
    where
        F: FnOnce() -> BoxFuture<'static, SessionState> + Send,
    {
        let mut slot = self.attempt.lock().await;
        if let Some(attempt) = slot.as_ref() {
            tracing::debug!(attempt_id = %attempt.id, "Joining in-flight session attempt");
            return attempt.clone();
        }
        let attempt = Attempt {
            id: Uuid::new_v4(),
            future: start().shared(),
        };
        *slot = Some(attempt.clone());
        attempt
    }

    async fn settle(&self, id: Uuid) {
        let mut slot = self.attempt.lock().await;
        if slot.as_ref().is_some_and(|attempt| attempt.id == id) {
            *slot = None;
        }
    }

    /// Apply an attempt's result unless it is stale or the phase already moved on.
    fn apply_attempt(&self, epoch: u64, from: SessionStatus, result: SessionState) -> bool {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!("Discarding stale {} result", from);
            return false;
        }
        self.transition(|current| (current.status == from).then_some(result))
    }

    async fn run_attempt<F>(&self, from: SessionStatus, start: F) -> SessionState
    where
        F: FnOnce() -> BoxFuture<'static, SessionState> + Send,
    {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let attempt = self.join_or_start(start).await;
        let result = attempt.future.clone().await;
        self.settle(attempt.id).await;
        let _ = self.apply_attempt(epoch, from, result);
        self.state()
    }

    /// Silently restore the previous wallet session. Only acts in `Restoring`.
    pub async fn restore(&self) -> SessionState {
        if self.status() != SessionStatus::Restoring {
            return self.state();
        }
        let deps = self.deps.clone();
        self.run_attempt(SessionStatus::Restoring, move || {
            transitions::restore_connection(deps).boxed()
        })
        .await
    }

    /// Connect a wallet provider on `chain_id`.
    ///
    /// No-op while a transition is in flight or an account is already connected.
    pub async fn connect(&self, provider_type: ProviderType, chain_id: ChainId) -> SessionState {
        if chain_id.value() == 0 {
            let err = WalletError::InvalidConnectionParams(
                serde_json::json!({ "providerType": provider_type, "chainId": chain_id })
                    .to_string(),
            );
            tracing::error!("{}", err);
            return self.state();
        }

        let started = self.transition(|current| {
            if current.is_loading() {
                tracing::debug!(status = %current.status, "Ignoring connect while {}", current.status);
                return None;
            }
            if let Some(account) = &current.account {
                tracing::warn!("Already connected as \"{}\"", account);
                return None;
            }
            Some(SessionState::connecting(
                provider_type,
                chain_id,
                current.selecting,
            ))
        });
        if !started {
            return self.state();
        }

        self.drive_connecting().await
    }

    async fn drive_connecting(&self) -> SessionState {
        let (provider_type, chain_id, selecting) = {
            let current = self.state.borrow();
            match (current.status, current.provider_type, current.chain_id) {
                (SessionStatus::Connecting, Some(provider_type), Some(chain_id)) => {
                    (provider_type, chain_id, current.selecting)
                }
                _ => return current.clone(),
            }
        };

        let epoch = self.epoch.load(Ordering::SeqCst);
        let deps = self.deps.clone();
        let attempt = self
            .join_or_start(move || {
                transitions::create_connection(deps, provider_type, chain_id).boxed()
            })
            .await;
        let mut result = attempt.future.clone().await;
        self.settle(attempt.id).await;

        if result.status != SessionStatus::Connected {
            result.selecting = selecting;
        }
        let _ = self.apply_attempt(epoch, SessionStatus::Connecting, result);
        self.state()
    }

    /// Disconnect the wallet. With `sign_out`, the identity is also removed
    /// from the remote store.
    pub async fn disconnect(&self, sign_out: bool) -> SessionState {
        let mut previous_account = None;
        self.transition(|current| {
            if current.is_loading() {
                tracing::debug!(status = %current.status, "Ignoring disconnect while {}", current.status);
                return None;
            }
            previous_account = Some(current.account.clone()?);
            Some(SessionState::disconnecting())
        });
        let Some(account) = previous_account else {
            return self.state();
        };

        if sign_out && let Err(e) = self.deps.identity.sign_out(&account).await {
            tracing::warn!(account = %account, "Failed to clear identity on sign-out: {}", e);
        }

        if let Err(e) = self.deps.connector.disconnect().await {
            tracing::error!("Error closing wallet connection: {}", e);
        }
        if let Err(e) = self.deps.identity.set(None).await {
            tracing::warn!("Failed to reset current identity: {}", e);
        }

        self.transition(|current| {
            (current.status == SessionStatus::Disconnecting).then(SessionState::disconnected)
        });
        tracing::info!(account = %account, sign_out, "Wallet session disconnected");
        self.state()
    }

    /// Ask the provider to move to `chain_id`. Failures only set `error`.
    pub async fn switch_to(&self, chain_id: ChainId) -> SessionState {
        let (provider_type, provider) = {
            let current = self.state.borrow();
            (current.provider_type, current.provider.clone())
        };
        let (Some(provider_type), Some(provider)) = (provider_type, provider) else {
            return self.state();
        };
        if !provider_type.supports_network_switch() {
            tracing::debug!(provider_type = %provider_type, "Network switch not wired for provider");
            return self.state();
        }

        let outcome = {
            let _switching = SwitchGuard::enter(&self.switching);
            rpc::switch_to_chain_id(provider.as_ref(), chain_id).await
        };

        // The session may have been torn down or replaced while the wallet answered.
        let same_session = |current: &SessionState| {
            current.status == SessionStatus::Connected
                && current
                    .provider
                    .as_ref()
                    .is_some_and(|live| Arc::ptr_eq(live, &provider))
        };
        let applied = match outcome {
            Ok(()) => self.transition(|current| {
                same_session(current).then(|| SessionState {
                    chain_id: Some(chain_id),
                    ..current.clone()
                })
            }),
            Err(err) => {
                let payload = Error::from(err).to_error_payload();
                tracing::warn!(code = payload.code, "{}", payload.message);
                self.transition(|current| {
                    same_session(current).then(|| SessionState {
                        error: Some(payload.message),
                        ..current.clone()
                    })
                })
            }
        };
        if applied {
            tracing::info!(chain_id = chain_id.value(), "Network switch settled");
        } else {
            tracing::debug!(chain_id = chain_id.value(), "Discarding network switch for a closed session");
        }
        self.state()
    }

    /// Open the account-selection UI.
    pub fn select(&self) -> bool {
        self.transition(|current| {
            (!current.is_loading()).then(|| SessionState {
                selecting: true,
                ..current.clone()
            })
        })
    }

    /// External login URL that returns to `current_url` afterwards.
    pub fn authorize(&self, current_url: &str) -> String {
        authorize_url(&self.auth_path, current_url)
    }

    /// Sign `payload` with the active identity's ephemeral key.
    pub fn sign_payload(&self, payload: &str) -> Result<AuthChain, Error> {
        let identity: AuthIdentity = self
            .state
            .borrow()
            .identity
            .clone()
            .ok_or_else(|| IdentityError::Signing("no active identity".to_string()))?;
        Ok(authenticator::sign_payload(&identity, payload)?)
    }

    /// React to a provider lifecycle event.
    pub async fn handle_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::ChainChanged(chain_id) => {
                self.transition(|current| {
                    (current.status == SessionStatus::Connected).then(|| SessionState {
                        chain_id: Some(chain_id),
                        ..current.clone()
                    })
                });
            }
            ProviderEvent::AccountsChanged(_) | ProviderEvent::Disconnect => {
                self.disconnect(false).await;
            }
        }
    }

    async fn handle_forwarded(&self, forwarded: ForwardedEvent) {
        let current = self.listener_generation.load(Ordering::SeqCst);
        if forwarded.generation != current {
            tracing::debug!(
                kind = forwarded.event.kind().as_str(),
                "Dropping event from a detached provider registration"
            );
            return;
        }
        self.handle_event(forwarded.event).await;
    }

    /// Forward provider events to [`SessionManager::handle_event`] until the
    /// manager is dropped.
    pub fn spawn_event_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let receiver = self.events_rx.lock().ok().and_then(|mut slot| slot.take());
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let Some(mut receiver) = receiver else {
                tracing::warn!("Session event loop is already running");
                return;
            };
            while let Some(forwarded) = receiver.recv().await {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.handle_forwarded(forwarded).await;
            }
        })
    }

    /// Discard any in-flight result and detach provider listeners.
    pub fn shutdown(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.listener_generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut slot) = self.listeners.lock() {
            slot.take();
        }
    }
}
