//! Remote session-store boundary.
//!
//! The store owns the authoritative [`WorkSession`] record; the tracker only
//! ever displays a locally-interpolated estimate between round-trips and
//! snaps to the store's values on every response. Transport (HTTP, IPC,
//! whatever) lives behind this trait, outside the crate.

mod memory;

use std::future::Future;

use thiserror::Error;

use crate::auth::BearerToken;
use crate::models::WorkSession;

pub use memory::MemorySessionStore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("credential rejected by session store")]
    Unauthorized,
    #[error("no session with id {0}")]
    NotFound(String),
    #[error("session state conflict: {0}")]
    Conflict(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

impl StoreError {
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, StoreError::Unauthorized)
    }
}

/// The five idempotent-by-id operations the tracker requires from its
/// environment. Futures are `Send` so tracker-owned tasks can drive them.
pub trait SessionStore: Send + Sync + 'static {
    /// Creates a new `active` session for the authenticated principal.
    fn create_session(
        &self,
        token: &BearerToken,
        notes: Option<String>,
    ) -> impl Future<Output = Result<WorkSession, StoreError>> + Send;

    /// Marks the session `paused`; the store stamps `pause_start_time`.
    fn pause_session(
        &self,
        token: &BearerToken,
        id: &str,
    ) -> impl Future<Output = Result<WorkSession, StoreError>> + Send;

    /// Marks the session `active` again; the store folds the closed pause
    /// segment into `total_pause_time`.
    fn resume_session(
        &self,
        token: &BearerToken,
        id: &str,
    ) -> impl Future<Output = Result<WorkSession, StoreError>> + Send;

    /// Marks the session `completed` and stamps `end_time`.
    fn end_session(
        &self,
        token: &BearerToken,
        id: &str,
    ) -> impl Future<Output = Result<WorkSession, StoreError>> + Send;

    /// The single open session for the principal, or `None`.
    fn current_session(
        &self,
        token: &BearerToken,
    ) -> impl Future<Output = Result<Option<WorkSession>, StoreError>> + Send;
}
