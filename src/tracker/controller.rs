use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthSignal, BearerToken};
use crate::config::TrackerConfig;
use crate::models::{HmsDuration, SessionStatus, WorkSession};
use crate::store::{SessionStore, StoreError};

use super::error::{SessionOp, TrackerError};
use super::state::{resume_anchor, Checkpoint, TrackerState};
use super::ticker::{self, TickerGuard};

/// State and output channels shared with the tick loops.
pub(crate) struct Shared {
    pub state: Mutex<TrackerState>,
    pub session_tx: watch::Sender<Option<WorkSession>>,
    pub work_tx: watch::Sender<String>,
    pub pause_tx: watch::Sender<String>,
    pub pause_total_tx: watch::Sender<String>,
}

/// The work-session state machine.
///
/// Owns the local view of the user's current session and keeps it
/// consistent with the remote store across start/pause/resume/end and
/// authentication changes. Consumers read the published watch channels;
/// all mutation goes through the commands here.
///
/// Cheap to clone; clones share state, exactly like handing the same
/// service instance around.
pub struct WorkSessionTracker<S> {
    store: Arc<S>,
    auth: AuthSignal,
    config: TrackerConfig,
    shared: Arc<Shared>,
    work_ticker: Arc<Mutex<Option<TickerGuard>>>,
    pause_ticker: Arc<Mutex<Option<TickerGuard>>>,
    watcher: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<S> Clone for WorkSessionTracker<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            auth: self.auth.clone(),
            config: self.config.clone(),
            shared: self.shared.clone(),
            work_ticker: self.work_ticker.clone(),
            pause_ticker: self.pause_ticker.clone(),
            watcher: self.watcher.clone(),
        }
    }
}

impl<S: SessionStore> WorkSessionTracker<S> {
    pub fn new(store: S, auth: AuthSignal) -> Self {
        Self::with_config(store, auth, TrackerConfig::default())
    }

    pub fn with_config(store: S, auth: AuthSignal, config: TrackerConfig) -> Self {
        let zero = HmsDuration::ZERO.to_string();
        let (session_tx, _) = watch::channel(None);
        let (work_tx, _) = watch::channel(zero.clone());
        let (pause_tx, _) = watch::channel(zero.clone());
        let (pause_total_tx, _) = watch::channel(zero);

        Self {
            store: Arc::new(store),
            auth,
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(TrackerState::new()),
                session_tx,
                work_tx,
                pause_tx,
                pause_total_tx,
            }),
            work_ticker: Arc::new(Mutex::new(None)),
            pause_ticker: Arc::new(Mutex::new(None)),
            watcher: Arc::new(Mutex::new(None)),
        }
    }

    // ---- observable outputs -------------------------------------------------

    pub fn subscribe_session(&self) -> watch::Receiver<Option<WorkSession>> {
        self.shared.session_tx.subscribe()
    }

    pub fn subscribe_work_elapsed(&self) -> watch::Receiver<String> {
        self.shared.work_tx.subscribe()
    }

    /// The in-progress pause segment; resets to zero on resume.
    pub fn subscribe_pause_elapsed(&self) -> watch::Receiver<String> {
        self.shared.pause_tx.subscribe()
    }

    /// Cumulative pause across the session; never resets until the session ends.
    pub fn subscribe_pause_total(&self) -> watch::Receiver<String> {
        self.shared.pause_total_tx.subscribe()
    }

    pub fn current_session(&self) -> Option<WorkSession> {
        self.shared.session_tx.borrow().clone()
    }

    pub fn work_display(&self) -> String {
        self.shared.work_tx.borrow().clone()
    }

    pub fn pause_display(&self) -> String {
        self.shared.pause_tx.borrow().clone()
    }

    pub fn pause_total_display(&self) -> String {
        self.shared.pause_total_tx.borrow().clone()
    }

    /// Repaints the work display from the current anchor immediately instead
    /// of waiting for the next tick.
    pub async fn force_display_update(&self) {
        let state = self.shared.state.lock().await;
        if let Some(ms) = state.work_elapsed_ms(Utc::now()) {
            self.shared
                .work_tx
                .send_replace(HmsDuration::from_millis(ms).to_string());
        }
    }

    // ---- lifecycle ----------------------------------------------------------

    /// Follows the authentication signal: reconciles against the store on
    /// login (including the state current at call time) and clears local
    /// state on logout. Calling again replaces the previous watcher.
    pub async fn run(&self) {
        let mut rx = self.auth.subscribe();
        let tracker = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                let authenticated = rx.borrow_and_update().is_authenticated();
                if authenticated {
                    tracker.refresh().await;
                } else {
                    tracker.handle_logout().await;
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.watcher.lock().await.replace(handle) {
            previous.abort();
        }
    }

    pub async fn shutdown(&self) {
        if let Some(watcher) = self.watcher.lock().await.take() {
            watcher.abort();
        }
        self.stop_work_ticker().await;
        self.stop_pause_ticker().await;
    }

    // ---- commands -----------------------------------------------------------

    pub async fn start(&self) -> Result<WorkSession, TrackerError> {
        self.start_with_notes(None).await
    }

    pub async fn start_with_notes(
        &self,
        notes: Option<String>,
    ) -> Result<WorkSession, TrackerError> {
        let token = self.require_token()?;

        let epoch = {
            let mut state = self.shared.state.lock().await;
            if state.session.as_ref().is_some_and(WorkSession::is_open) {
                return Err(TrackerError::invalid("a session is already open"));
            }
            // paint zero before setting the anchor so the first frame the
            // user sees cannot jump
            self.publish_cleared();
            state.pause_anchor = None;
            state.pause_baseline_ms = 0;
            state.work_anchor = Some(Utc::now());
            state.epoch
        };
        self.stop_pause_ticker().await;
        self.start_work_ticker(epoch).await;

        match self.store.create_session(&token, notes).await {
            Ok(session) => {
                let mut state = self.shared.state.lock().await;
                if state.epoch != epoch {
                    return Err(TrackerError::Superseded {
                        op: SessionOp::Start,
                    });
                }
                state.session = Some(session.clone());
                self.shared.session_tx.send_replace(Some(session.clone()));
                info!("session {} started", session.id);
                Ok(session)
            }
            Err(err) => {
                let mapped = self.fail(SessionOp::Start, err).await;
                // roll the optimistic start back to NoSession
                {
                    let mut state = self.shared.state.lock().await;
                    if state.epoch == epoch {
                        state.clear();
                        self.publish_cleared();
                    }
                }
                self.stop_work_ticker().await;
                Err(mapped)
            }
        }
    }

    pub async fn pause(&self, id: &str) -> Result<WorkSession, TrackerError> {
        let token = self.require_token()?;

        let (epoch, checkpoint) = {
            let mut state = self.shared.state.lock().await;
            self.ensure_session(&state, id, SessionStatus::Active, "pause")?;
            let checkpoint = self.capture(&state);

            let now = Utc::now();
            // freeze at the value computed right now, not at the last
            // painted tick
            if let Some(ms) = state.work_elapsed_ms(now) {
                self.shared
                    .work_tx
                    .send_replace(HmsDuration::from_millis(ms).to_string());
            }
            state.work_anchor = None;
            state.pause_anchor = Some(now);
            self.shared
                .pause_tx
                .send_replace(HmsDuration::ZERO.to_string());
            self.shared
                .pause_total_tx
                .send_replace(HmsDuration::from_millis(state.pause_baseline_ms).to_string());
            (state.epoch, checkpoint)
        };
        self.stop_work_ticker().await;
        self.start_pause_ticker(epoch).await;

        match self.store.pause_session(&token, id).await {
            Ok(session) => {
                {
                    let mut state = self.shared.state.lock().await;
                    if state.epoch != epoch {
                        return Err(TrackerError::Superseded {
                            op: SessionOp::Pause,
                        });
                    }
                    // server anchors win: pause start and the closed-pause total
                    let now = Utc::now();
                    state.pause_anchor = Some(session.pause_start_time.unwrap_or(now));
                    state.pause_baseline_ms = session.total_pause_time.as_millis();
                    state.session = Some(session.clone());
                    self.shared.session_tx.send_replace(Some(session.clone()));
                    self.shared.pause_tx.send_replace(
                        HmsDuration::from_millis(state.pause_segment_ms(now).unwrap_or(0))
                            .to_string(),
                    );
                    self.shared.pause_total_tx.send_replace(
                        HmsDuration::from_millis(state.pause_total_ms(now)).to_string(),
                    );
                }
                info!("session {} paused", session.id);
                Ok(session)
            }
            Err(err) => {
                let mapped = self.fail(SessionOp::Pause, err).await;
                self.restore_checkpoint(checkpoint, epoch).await;
                Err(mapped)
            }
        }
    }

    pub async fn resume(&self, id: &str) -> Result<WorkSession, TrackerError> {
        let token = self.require_token()?;

        let (epoch, checkpoint) = {
            let mut state = self.shared.state.lock().await;
            self.ensure_session(&state, id, SessionStatus::Paused, "resume")?;
            let checkpoint = self.capture(&state);

            let now = Utc::now();
            // fold the in-progress segment locally; the store's total
            // arrives with the response and wins
            let folded = state.pause_total_ms(now);
            state.pause_baseline_ms = folded;
            state.pause_anchor = None;
            self.shared
                .pause_tx
                .send_replace(HmsDuration::ZERO.to_string());
            self.shared
                .pause_total_tx
                .send_replace(HmsDuration::from_millis(folded).to_string());

            // re-anchor from the string the user was watching, not from
            // start_time; the two may have drifted and the display must not
            // jump
            let displayed = self.work_display();
            state.work_anchor = Some(resume_anchor(&displayed, now));
            self.shared.work_tx.send_replace(displayed);
            (state.epoch, checkpoint)
        };
        self.stop_pause_ticker().await;
        self.start_work_ticker(epoch).await;

        match self.store.resume_session(&token, id).await {
            Ok(session) => {
                {
                    let mut state = self.shared.state.lock().await;
                    if state.epoch != epoch {
                        return Err(TrackerError::Superseded {
                            op: SessionOp::Resume,
                        });
                    }
                    state.pause_baseline_ms = session.total_pause_time.as_millis();
                    state.session = Some(session.clone());
                    self.shared.session_tx.send_replace(Some(session.clone()));
                    self.shared
                        .pause_total_tx
                        .send_replace(session.total_pause_time.to_string());
                }
                info!("session {} resumed", session.id);
                Ok(session)
            }
            Err(err) => {
                let mapped = self.fail(SessionOp::Resume, err).await;
                self.restore_checkpoint(checkpoint, epoch).await;
                Err(mapped)
            }
        }
    }

    pub async fn end(&self, id: &str) -> Result<WorkSession, TrackerError> {
        let token = self.require_token()?;

        let (epoch, checkpoint) = {
            let mut state = self.shared.state.lock().await;
            match &state.session {
                Some(s) if s.id != id => {
                    return Err(TrackerError::invalid(format!("unknown session id {id}")))
                }
                Some(s) if !s.is_open() => {
                    return Err(TrackerError::invalid("session is already completed"))
                }
                Some(_) => {}
                None => return Err(TrackerError::invalid("no session to end")),
            }
            let checkpoint = self.capture(&state);
            // the Ending state is transient: the presentation collapses to
            // NoSession now; the checkpoint brings it back if the store
            // says no
            state.clear();
            self.publish_cleared();
            (state.epoch, checkpoint)
        };
        self.stop_work_ticker().await;
        self.stop_pause_ticker().await;

        match self.store.end_session(&token, id).await {
            Ok(session) => {
                let state = self.shared.state.lock().await;
                if state.epoch != epoch {
                    return Err(TrackerError::Superseded { op: SessionOp::End });
                }
                info!("session {} ended", session.id);
                Ok(session)
            }
            Err(err) => {
                let mapped = self.fail(SessionOp::End, err).await;
                self.restore_checkpoint(checkpoint, epoch).await;
                Err(mapped)
            }
        }
    }

    /// Re-fetches the remote record and re-derives the local anchors from
    /// it. Safe to call repeatedly; fetch failures degrade to "no session
    /// known" rather than erroring, and are logged.
    pub async fn refresh(&self) -> Option<WorkSession> {
        let Some(token) = self.auth.token() else {
            debug!("refresh without authentication; clearing session state");
            self.handle_logout().await;
            return None;
        };

        match self.store.current_session(&token).await {
            Ok(remote) => self.reconcile(remote).await,
            Err(err) if err.is_auth_rejection() => {
                warn!("session fetch rejected: credential invalid; forcing logout");
                self.force_logout().await;
                None
            }
            Err(err) => {
                // an authenticated user should still end up tracked
                warn!("session fetch failed ({err}); treating as no session");
                self.reconcile(None).await
            }
        }
    }

    // ---- reconciliation -----------------------------------------------------

    async fn reconcile(&self, remote: Option<WorkSession>) -> Option<WorkSession> {
        let now = Utc::now();
        match remote {
            Some(session) if session.status == SessionStatus::Active => {
                let epoch = {
                    let mut state = self.shared.state.lock().await;
                    state.session = Some(session.clone());
                    state.work_anchor = Some(session.start_time);
                    // a fresh in-progress segment has not started yet
                    state.pause_anchor = None;
                    state.pause_baseline_ms = 0;
                    self.shared.session_tx.send_replace(Some(session.clone()));
                    self.shared.work_tx.send_replace(
                        HmsDuration::from_millis_i64((now - session.start_time).num_milliseconds())
                            .to_string(),
                    );
                    self.shared
                        .pause_tx
                        .send_replace(HmsDuration::ZERO.to_string());
                    self.shared
                        .pause_total_tx
                        .send_replace(HmsDuration::ZERO.to_string());
                    state.epoch
                };
                self.stop_pause_ticker().await;
                self.start_work_ticker(epoch).await;
                info!("reconciled active session {}", session.id);
                Some(session)
            }
            Some(session) if session.status == SessionStatus::Paused => {
                let epoch = {
                    let mut state = self.shared.state.lock().await;
                    state.session = Some(session.clone());
                    state.work_anchor = None;
                    state.pause_anchor = Some(session.pause_start_time.unwrap_or(now));
                    state.pause_baseline_ms = session.total_pause_time.as_millis();
                    self.shared.session_tx.send_replace(Some(session.clone()));
                    self.shared
                        .work_tx
                        .send_replace(HmsDuration::from_millis(session.elapsed_work_ms(now)).to_string());
                    self.shared.pause_tx.send_replace(
                        HmsDuration::from_millis(state.pause_segment_ms(now).unwrap_or(0))
                            .to_string(),
                    );
                    self.shared.pause_total_tx.send_replace(
                        HmsDuration::from_millis(state.pause_total_ms(now)).to_string(),
                    );
                    state.epoch
                };
                self.stop_work_ticker().await;
                self.start_pause_ticker(epoch).await;
                info!("reconciled paused session {}", session.id);
                Some(session)
            }
            Some(done) => {
                debug!("remote session {} is already completed", done.id);
                self.clear_presentation().await;
                None
            }
            None => {
                self.clear_presentation().await;
                self.maybe_auto_start().await;
                self.current_session()
            }
        }
    }

    async fn maybe_auto_start(&self) {
        if !self.config.auto_start {
            return;
        }
        {
            let mut state = self.shared.state.lock().await;
            if state.auto_started || !self.auth.is_authenticated() {
                return;
            }
            state.auto_started = true;
        }

        info!("no open session for authenticated user; starting one automatically");
        if let Err(err) = self.start().await {
            error!("auto-start failed: {err}");
            // release the guard so a later reconciliation can retry
            self.shared.state.lock().await.auto_started = false;
        }
    }

    // ---- internals ----------------------------------------------------------

    fn require_token(&self) -> Result<BearerToken, TrackerError> {
        self.auth.token().ok_or(TrackerError::AuthenticationRequired)
    }

    fn ensure_session(
        &self,
        state: &TrackerState,
        id: &str,
        expected: SessionStatus,
        verb: &str,
    ) -> Result<(), TrackerError> {
        match &state.session {
            Some(s) if s.id != id => Err(TrackerError::invalid(format!("unknown session id {id}"))),
            Some(s) if s.status != expected => Err(TrackerError::invalid(format!(
                "cannot {verb} a {} session",
                s.status.as_str()
            ))),
            Some(_) => Ok(()),
            None => Err(TrackerError::invalid(format!("no session to {verb}"))),
        }
    }

    fn capture(&self, state: &TrackerState) -> Checkpoint {
        state.capture(
            self.work_display(),
            self.pause_display(),
            self.pause_total_display(),
        )
    }

    /// Puts the presentation back the way the checkpoint recorded it. A
    /// restored active session re-derives its anchor from the displayed
    /// string so the timer resumes from the value the user was watching.
    /// No-op if the epoch moved on (logout already cleared everything).
    async fn restore_checkpoint(&self, checkpoint: Checkpoint, epoch: u64) {
        let respawn = {
            let mut state = self.shared.state.lock().await;
            if state.epoch != epoch {
                return;
            }
            state.restore(&checkpoint);
            self.shared
                .session_tx
                .send_replace(checkpoint.session.clone());
            self.shared
                .work_tx
                .send_replace(checkpoint.work_display.clone());
            self.shared
                .pause_tx
                .send_replace(checkpoint.pause_display.clone());
            self.shared
                .pause_total_tx
                .send_replace(checkpoint.pause_total_display.clone());

            match checkpoint.session.as_ref().map(|s| s.status) {
                Some(SessionStatus::Active) => {
                    state.work_anchor =
                        Some(resume_anchor(&checkpoint.work_display, Utc::now()));
                    state.pause_anchor = None;
                    Some(SessionStatus::Active)
                }
                Some(SessionStatus::Paused) => Some(SessionStatus::Paused),
                _ => None,
            }
        };

        match respawn {
            Some(SessionStatus::Active) => {
                self.stop_pause_ticker().await;
                self.start_work_ticker(epoch).await;
            }
            Some(SessionStatus::Paused) => {
                self.stop_work_ticker().await;
                self.start_pause_ticker(epoch).await;
            }
            _ => {
                self.stop_work_ticker().await;
                self.stop_pause_ticker().await;
            }
        }
    }

    async fn fail(&self, op: SessionOp, err: StoreError) -> TrackerError {
        if err.is_auth_rejection() {
            warn!("{op} rejected: credential invalid; forcing logout");
            self.force_logout().await;
            TrackerError::AuthenticationRequired
        } else {
            error!("{op} failed: {err}");
            TrackerError::Store { op, source: err }
        }
    }

    async fn clear_presentation(&self) {
        {
            let mut state = self.shared.state.lock().await;
            state.clear();
            self.publish_cleared();
        }
        self.stop_work_ticker().await;
        self.stop_pause_ticker().await;
    }

    /// Unconditional teardown: bumps the epoch so stale ticks and in-flight
    /// responses are discarded, clears everything, re-arms the auto-start
    /// guard.
    async fn handle_logout(&self) {
        {
            let mut state = self.shared.state.lock().await;
            state.logout_reset();
            self.publish_cleared();
        }
        self.stop_work_ticker().await;
        self.stop_pause_ticker().await;
    }

    async fn force_logout(&self) {
        self.handle_logout().await;
        // propagate; the auth watcher's duplicate clear is a no-op
        self.auth.logout();
    }

    fn publish_cleared(&self) {
        let zero = HmsDuration::ZERO.to_string();
        self.shared.session_tx.send_replace(None);
        self.shared.work_tx.send_replace(zero.clone());
        self.shared.pause_tx.send_replace(zero.clone());
        self.shared.pause_total_tx.send_replace(zero);
    }

    async fn start_work_ticker(&self, epoch: u64) {
        let token = CancellationToken::new();
        let handle = tokio::spawn(ticker::work_loop(
            self.shared.clone(),
            epoch,
            self.config.tick_interval,
            token.clone(),
        ));
        // dropping the previous guard cancels its loop
        let _previous = self
            .work_ticker
            .lock()
            .await
            .replace(TickerGuard::new(token, handle));
    }

    async fn stop_work_ticker(&self) {
        let _ = self.work_ticker.lock().await.take();
    }

    async fn start_pause_ticker(&self, epoch: u64) {
        let token = CancellationToken::new();
        let handle = tokio::spawn(ticker::pause_loop(
            self.shared.clone(),
            epoch,
            self.config.tick_interval,
            token.clone(),
        ));
        let _previous = self
            .pause_ticker
            .lock()
            .await
            .replace(TickerGuard::new(token, handle));
    }

    async fn stop_pause_ticker(&self) {
        let _ = self.pause_ticker.lock().await.take();
    }
}
