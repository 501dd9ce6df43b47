use chrono::{DateTime, Duration, Utc};

use crate::models::{HmsDuration, WorkSession};

/// Local tracker state. The remote store owns the truth; these fields are
/// the anchors the display tickers interpolate from between round-trips.
///
/// Every computation takes an explicit `now` so the state machine stays
/// deterministic under test.
#[derive(Debug, Clone, Default)]
pub(crate) struct TrackerState {
    /// Cached copy of the store's record, `None` while no session exists.
    pub session: Option<WorkSession>,
    /// Wall-clock anchor of the running work timer; `None` freezes it.
    pub work_anchor: Option<DateTime<Utc>>,
    /// Start of the in-progress pause segment; `None` while not paused.
    pub pause_anchor: Option<DateTime<Utc>>,
    /// Closed pause segments, as last reported by the store (or folded
    /// locally while a response is pending).
    pub pause_baseline_ms: u64,
    /// One-shot auto-start guard; reset only on logout.
    pub auto_started: bool,
    /// Bumped on logout. Tickers and in-flight responses carrying an older
    /// epoch are discarded instead of writing into the cleared state.
    pub epoch: u64,
}

/// Everything needed to put the presentation back the way it was when a
/// remote call fails: the four state fields a command touches plus the
/// display strings the user was watching.
#[derive(Debug, Clone)]
pub(crate) struct Checkpoint {
    pub session: Option<WorkSession>,
    pub work_anchor: Option<DateTime<Utc>>,
    pub pause_anchor: Option<DateTime<Utc>>,
    pub pause_baseline_ms: u64,
    pub work_display: String,
    pub pause_display: String,
    pub pause_total_display: String,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn work_elapsed_ms(&self, now: DateTime<Utc>) -> Option<u64> {
        self.work_anchor
            .map(|anchor| HmsDuration::from_millis_i64((now - anchor).num_milliseconds()).as_millis())
    }

    pub fn pause_segment_ms(&self, now: DateTime<Utc>) -> Option<u64> {
        self.pause_anchor
            .map(|anchor| HmsDuration::from_millis_i64((now - anchor).num_milliseconds()).as_millis())
    }

    /// Cumulative pause: closed segments plus the one in progress.
    pub fn pause_total_ms(&self, now: DateTime<Utc>) -> u64 {
        self.pause_baseline_ms
            .saturating_add(self.pause_segment_ms(now).unwrap_or(0))
    }

    /// Drops the session and every timer anchor. Leaves the auto-start
    /// guard and epoch alone; logout is the only thing that touches those.
    pub fn clear(&mut self) {
        self.session = None;
        self.work_anchor = None;
        self.pause_anchor = None;
        self.pause_baseline_ms = 0;
    }

    pub fn logout_reset(&mut self) {
        self.clear();
        self.auto_started = false;
        self.epoch = self.epoch.wrapping_add(1);
    }

    pub fn capture(
        &self,
        work_display: String,
        pause_display: String,
        pause_total_display: String,
    ) -> Checkpoint {
        Checkpoint {
            session: self.session.clone(),
            work_anchor: self.work_anchor,
            pause_anchor: self.pause_anchor,
            pause_baseline_ms: self.pause_baseline_ms,
            work_display,
            pause_display,
            pause_total_display,
        }
    }

    pub fn restore(&mut self, checkpoint: &Checkpoint) {
        self.session = checkpoint.session.clone();
        self.work_anchor = checkpoint.work_anchor;
        self.pause_anchor = checkpoint.pause_anchor;
        self.pause_baseline_ms = checkpoint.pause_baseline_ms;
    }
}

/// Synthetic work anchor derived from the string the user was watching:
/// `now − parse(displayed)`. Re-anchoring from the displayed value instead
/// of recomputing from `start_time` keeps the timer visually continuous
/// even when the two have drifted (slow round-trips, reloads). An
/// unparseable display re-anchors at `now`, matching a reading of zero.
pub(crate) fn resume_anchor(displayed: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let elapsed = displayed
        .parse::<HmsDuration>()
        .unwrap_or(HmsDuration::ZERO);
    now - Duration::milliseconds(elapsed.as_millis() as i64)
}
