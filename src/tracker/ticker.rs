use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::models::HmsDuration;

use super::controller::Shared;

/// Owns one running tick loop. Dropping the guard cancels the loop, so a
/// ticker can never outlive the transition that replaced it.
pub(crate) struct TickerGuard {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl TickerGuard {
    pub fn new(token: CancellationToken, handle: JoinHandle<()>) -> Self {
        Self { token, handle }
    }
}

impl Drop for TickerGuard {
    fn drop(&mut self) {
        self.token.cancel();
        self.handle.abort();
    }
}

/// Repaints the work-elapsed display every tick while the work anchor is
/// set. Exits on cancellation, on a cleared anchor, or when the epoch no
/// longer matches; a stale tick must never write into a newer state.
pub(crate) async fn work_loop(
    shared: Arc<Shared>,
    epoch: u64,
    tick: Duration,
    token: CancellationToken,
) {
    let mut interval = time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately; the command that spawned us
    // already painted the display
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let display = {
                    let state = shared.state.lock().await;
                    if state.epoch != epoch {
                        break;
                    }
                    let Some(ms) = state.work_elapsed_ms(Utc::now()) else {
                        break;
                    };
                    HmsDuration::from_millis(ms).to_string()
                };
                shared.work_tx.send_replace(display);
            }
            _ = token.cancelled() => break,
        }
    }
}

/// Repaints the in-progress pause segment and the cumulative pause total
/// every tick while the pause anchor is set.
pub(crate) async fn pause_loop(
    shared: Arc<Shared>,
    epoch: u64,
    tick: Duration,
    token: CancellationToken,
) {
    let mut interval = time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let (segment, total) = {
                    let state = shared.state.lock().await;
                    if state.epoch != epoch {
                        break;
                    }
                    let now = Utc::now();
                    let Some(segment_ms) = state.pause_segment_ms(now) else {
                        break;
                    };
                    (
                        HmsDuration::from_millis(segment_ms).to_string(),
                        HmsDuration::from_millis(state.pause_total_ms(now)).to_string(),
                    )
                };
                shared.pause_tx.send_replace(segment);
                shared.pause_total_tx.send_replace(total);
            }
            _ = token.cancelled() => break,
        }
    }
}
