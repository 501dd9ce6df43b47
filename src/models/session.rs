use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::duration::HmsDuration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
        }
    }
}

/// The remote-authoritative session record, as the store serves it.
///
/// Timestamps are ISO-8601; `total_pause_time` covers closed pause segments
/// only. The segment currently in progress (while `status` is `paused`) is
/// tracked locally against `pause_start_time` and folded in by the store on
/// resume or end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkSession {
    pub id: String,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_pause_time: HmsDuration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl WorkSession {
    pub fn is_open(&self) -> bool {
        matches!(self.status, SessionStatus::Active | SessionStatus::Paused)
    }

    /// Work time accrued up to `now`: wall time since `start_time` minus the
    /// closed pause total, clamped at zero.
    pub fn elapsed_work_ms(&self, now: DateTime<Utc>) -> u64 {
        let wall = (now - self.start_time).num_milliseconds();
        HmsDuration::from_millis_i64(wall - self.total_pause_time.as_millis() as i64).as_millis()
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
