//! Provider event capability.
//!
//! Wallet providers expose lifecycle events through different API shapes.
//! Each provider adapts its own shape to [`ProviderEvents`] once, and the
//! session manager only ever talks to that interface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::ChainId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderEventKind {
    ChainChanged,
    AccountsChanged,
    Disconnect,
}

impl ProviderEventKind {
    pub const ALL: [Self; 3] = [Self::ChainChanged, Self::AccountsChanged, Self::Disconnect];

    /// EIP-1193 event name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChainChanged => "chainChanged",
            Self::AccountsChanged => "accountsChanged",
            Self::Disconnect => "disconnect",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    ChainChanged(ChainId),
    AccountsChanged(Vec<String>),
    Disconnect,
}

impl ProviderEvent {
    pub fn kind(&self) -> ProviderEventKind {
        match self {
            Self::ChainChanged(_) => ProviderEventKind::ChainChanged,
            Self::AccountsChanged(_) => ProviderEventKind::AccountsChanged,
            Self::Disconnect => ProviderEventKind::Disconnect,
        }
    }
}

pub type EventHandler = Arc<dyn Fn(ProviderEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Subscribe/unsubscribe capability of a live provider.
pub trait ProviderEvents: Send + Sync {
    fn subscribe(&self, kind: ProviderEventKind, handler: EventHandler) -> ListenerId;

    fn unsubscribe(&self, kind: ProviderEventKind, id: ListenerId);
}

/// In-process listener table that providers can embed to implement
/// [`ProviderEvents`] and fan out events.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<ProviderEventKind, Vec<(ListenerId, EventHandler)>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to every listener registered for its kind.
    pub fn emit(&self, event: ProviderEvent) {
        let handlers: Vec<EventHandler> = match self.listeners.lock() {
            Ok(guard) => guard
                .get(&event.kind())
                .map(|entries| entries.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default(),
            Err(_) => return,
        };
        for handler in handlers {
            handler(event.clone());
        }
    }

    pub fn listener_count(&self, kind: ProviderEventKind) -> usize {
        self.listeners
            .lock()
            .map(|guard| guard.get(&kind).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

impl ProviderEvents for ListenerRegistry {
    fn subscribe(&self, kind: ProviderEventKind, handler: EventHandler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut guard) = self.listeners.lock() {
            guard.entry(kind).or_default().push((id, handler));
        }
        id
    }

    fn unsubscribe(&self, kind: ProviderEventKind, id: ListenerId) {
        if let Ok(mut guard) = self.listeners.lock()
            && let Some(entries) = guard.get_mut(&kind)
        {
            entries.retain(|(existing, _)| *existing != id);
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field(
                "chain_changed",
                &self.listener_count(ProviderEventKind::ChainChanged),
            )
            .field(
                "accounts_changed",
                &self.listener_count(ProviderEventKind::AccountsChanged),
            )
            .field(
                "disconnect",
                &self.listener_count(ProviderEventKind::Disconnect),
            )
            .finish()
    }
}
