//! Wallet session lifecycle.
//!
//! ```text
//! Restoring ──restore──▶ Connected | Disconnected
//! Disconnected ──connect──▶ Connecting ──▶ Connected | Disconnected
//! Connected ──disconnect──▶ Disconnecting ──▶ Disconnected
//! ```

mod manager;
mod state;
pub mod transitions;

pub use self::manager::{SessionManager, authorize_url};
pub use self::state::{SessionActions, SessionState, SessionStatus};
pub use self::transitions::SessionDeps;
