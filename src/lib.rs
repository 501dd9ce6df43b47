//! Work-session tracking core.
//!
//! [`WorkSessionTracker`] maintains the local view of a user's current work
//! session and keeps it consistent with a remote [`SessionStore`] across
//! start/pause/resume/end transitions, reloads, and authentication changes.
//! It publishes the session snapshot and three formatted elapsed-time
//! displays (work, in-progress pause, cumulative pause) as read-only watch
//! channels, ticking once a second.
//!
//! The store and the authentication mechanics live outside this crate: the
//! tracker consumes an [`AuthSignal`] and any [`SessionStore`]
//! implementation. [`MemorySessionStore`] is the in-process reference used
//! by the test suite.

pub mod auth;
pub mod config;
pub mod models;
pub mod store;
pub mod tracker;

/// Initializes logging for consumers and tests that want it (reads the
/// `RUST_LOG` env var). Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

pub use auth::{AuthSignal, AuthState, BearerToken, Principal};
pub use config::TrackerConfig;
pub use models::{HmsDuration, SessionStatus, WorkSession};
pub use store::{MemorySessionStore, SessionStore, StoreError};
pub use tracker::{SessionOp, TrackerError, WorkSessionTracker};
