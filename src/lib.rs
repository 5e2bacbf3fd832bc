//! Wallet authentication and session state for the console.
//!
//! The [`session::SessionManager`] restores, connects, switches and
//! disconnects a wallet session against pluggable [`wallet::Connector`] and
//! [`identity::IdentityStore`] implementations.

pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod session;
pub mod settings;
pub mod wallet;

pub use config::AuthConfig;
pub use error::{Error, Result};
pub use session::{SessionActions, SessionManager, SessionState, SessionStatus};
