//! In-process reference implementation of [`SessionStore`].
//!
//! Backs the test suite and stands in for the real remote store during
//! development. It enforces the same contract a production backend must:
//! at most one open session per principal, pause segments folded into
//! `total_pause_time` only when they close.

use std::sync::Arc;

use chrono::Utc;
use log::debug;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::auth::BearerToken;
use crate::models::{HmsDuration, SessionStatus, WorkSession};

use super::{SessionStore, StoreError};

#[derive(Default)]
struct MemoryInner {
    current: Option<WorkSession>,
    completed: Vec<WorkSession>,
}

#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<Mutex<MemoryInner>>,
    expected_token: Option<BearerToken>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects calls whose bearer token differs from `token`, mimicking a
    /// backend that expires credentials.
    pub fn with_expected_token(token: BearerToken) -> Self {
        Self {
            inner: Arc::default(),
            expected_token: Some(token),
        }
    }

    pub async fn completed_sessions(&self) -> Vec<WorkSession> {
        self.inner.lock().await.completed.clone()
    }

    fn check_token(&self, token: &BearerToken) -> Result<(), StoreError> {
        match &self.expected_token {
            Some(expected) if expected != token => Err(StoreError::Unauthorized),
            _ => Ok(()),
        }
    }
}

impl SessionStore for MemorySessionStore {
    async fn create_session(
        &self,
        token: &BearerToken,
        notes: Option<String>,
    ) -> Result<WorkSession, StoreError> {
        self.check_token(token)?;
        let mut inner = self.inner.lock().await;
        if inner.current.as_ref().is_some_and(WorkSession::is_open) {
            return Err(StoreError::Conflict("a session is already open".into()));
        }

        let session = WorkSession {
            id: Uuid::new_v4().to_string(),
            status: SessionStatus::Active,
            start_time: Utc::now(),
            end_time: None,
            pause_start_time: None,
            total_pause_time: HmsDuration::ZERO,
            notes,
        };
        debug!("memory store created session {}", session.id);
        inner.current = Some(session.clone());
        Ok(session)
    }

    async fn pause_session(&self, token: &BearerToken, id: &str) -> Result<WorkSession, StoreError> {
        self.check_token(token)?;
        let mut inner = self.inner.lock().await;
        let session = inner
            .current
            .as_mut()
            .filter(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if session.status != SessionStatus::Active {
            return Err(StoreError::Conflict(format!(
                "cannot pause a {} session",
                session.status.as_str()
            )));
        }

        session.status = SessionStatus::Paused;
        session.pause_start_time = Some(Utc::now());
        Ok(session.clone())
    }

    async fn resume_session(&self, token: &BearerToken, id: &str) -> Result<WorkSession, StoreError> {
        self.check_token(token)?;
        let mut inner = self.inner.lock().await;
        let session = inner
            .current
            .as_mut()
            .filter(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if session.status != SessionStatus::Paused {
            return Err(StoreError::Conflict(format!(
                "cannot resume a {} session",
                session.status.as_str()
            )));
        }

        let now = Utc::now();
        if let Some(pause_start) = session.pause_start_time.take() {
            let segment = HmsDuration::from_millis_i64((now - pause_start).num_milliseconds());
            session.total_pause_time = session.total_pause_time.saturating_add(segment);
        }
        session.status = SessionStatus::Active;
        Ok(session.clone())
    }

    async fn end_session(&self, token: &BearerToken, id: &str) -> Result<WorkSession, StoreError> {
        self.check_token(token)?;
        let mut inner = self.inner.lock().await;
        let mut session = match inner.current.take() {
            Some(s) if s.id == id => s,
            other => {
                inner.current = other;
                return Err(StoreError::NotFound(id.to_string()));
            }
        };

        let now = Utc::now();
        if let Some(pause_start) = session.pause_start_time.take() {
            let segment = HmsDuration::from_millis_i64((now - pause_start).num_milliseconds());
            session.total_pause_time = session.total_pause_time.saturating_add(segment);
        }
        session.status = SessionStatus::Completed;
        session.end_time = Some(now);
        inner.completed.push(session.clone());
        Ok(session)
    }

    async fn current_session(&self, token: &BearerToken) -> Result<Option<WorkSession>, StoreError> {
        self.check_token(token)?;
        let inner = self.inner.lock().await;
        Ok(inner.current.clone().filter(|s| s.is_open()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> BearerToken {
        BearerToken::new("tok")
    }

    #[tokio::test]
    async fn rejects_second_open_session() {
        let store = MemorySessionStore::new();
        store.create_session(&token(), None).await.unwrap();

        let err = store.create_session(&token(), None).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn pause_resume_folds_segment() {
        let store = MemorySessionStore::new();
        let session = store.create_session(&token(), None).await.unwrap();

        let paused = store.pause_session(&token(), &session.id).await.unwrap();
        assert_eq!(paused.status, SessionStatus::Paused);
        assert!(paused.pause_start_time.is_some());
        // closed segments only; the in-progress one is not counted yet
        assert_eq!(paused.total_pause_time, HmsDuration::ZERO);

        let resumed = store.resume_session(&token(), &session.id).await.unwrap();
        assert_eq!(resumed.status, SessionStatus::Active);
        assert!(resumed.pause_start_time.is_none());
    }

    #[tokio::test]
    async fn end_clears_current_and_archives() {
        let store = MemorySessionStore::new();
        let session = store.create_session(&token(), Some("block".into())).await.unwrap();

        let ended = store.end_session(&token(), &session.id).await.unwrap();
        assert_eq!(ended.status, SessionStatus::Completed);
        assert!(ended.end_time.is_some());
        assert!(store.current_session(&token()).await.unwrap().is_none());
        assert_eq!(store.completed_sessions().await.len(), 1);

        // a second end cannot find the session any more
        let err = store.end_session(&token(), &session.id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn pause_requires_active() {
        let store = MemorySessionStore::new();
        let session = store.create_session(&token(), None).await.unwrap();
        store.pause_session(&token(), &session.id).await.unwrap();

        let err = store.pause_session(&token(), &session.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn stale_token_is_rejected() {
        let store = MemorySessionStore::with_expected_token(token());
        let err = store
            .create_session(&BearerToken::new("expired"), None)
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Unauthorized);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let store = MemorySessionStore::new();
        store.create_session(&token(), None).await.unwrap();
        let err = store.pause_session(&token(), "nope").await.unwrap_err();
        assert_eq!(err, StoreError::NotFound("nope".into()));
    }
}
