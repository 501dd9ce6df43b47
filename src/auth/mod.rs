//! Authentication-state signal consumed by the tracker.
//!
//! The tracker never authenticates anyone; it follows a watch channel that
//! the surrounding application drives on login/logout, and holds a producer
//! handle solely to force a logout when the store rejects the credential.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Opaque bearer credential forwarded to the session store on every call.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens must not leak into logs.
impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub token: BearerToken,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: BearerToken::new(token),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    Authenticated(Principal),
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            AuthState::Authenticated(principal) => Some(principal),
            AuthState::Unauthenticated => None,
        }
    }
}

/// Shared login/logout signal. Starts `Unauthenticated`; producers flip it
/// with [`set_authenticated`](Self::set_authenticated) / [`logout`](Self::logout),
/// consumers follow it through [`subscribe`](Self::subscribe).
#[derive(Clone)]
pub struct AuthSignal {
    tx: Arc<watch::Sender<AuthState>>,
}

impl AuthSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthState::Unauthenticated);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_authenticated()
    }

    pub fn token(&self) -> Option<BearerToken> {
        self.tx.borrow().principal().map(|p| p.token.clone())
    }

    pub fn set_authenticated(&self, principal: Principal) {
        self.tx.send_replace(AuthState::Authenticated(principal));
    }

    pub fn logout(&self) {
        self.tx.send_replace(AuthState::Unauthenticated);
    }
}

impl Default for AuthSignal {
    fn default() -> Self {
        Self::new()
    }
}
