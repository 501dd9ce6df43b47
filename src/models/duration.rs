use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Millisecond duration that crosses the wire as a zero-padded `HH:MM:SS`
/// string. The store reports pause totals in this shape; locally everything
/// is millisecond arithmetic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct HmsDuration(u64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid HH:MM:SS duration '{0}'")]
pub struct HmsParseError(String);

impl HmsDuration {
    pub const ZERO: HmsDuration = HmsDuration(0);

    pub fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Clamps negative spans to zero. Clock skew between the local machine
    /// and the store can make naive subtraction go negative.
    pub fn from_millis_i64(ms: i64) -> Self {
        Self(ms.max(0) as u64)
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs * 1_000)
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }

    pub fn saturating_add(self, other: HmsDuration) -> HmsDuration {
        Self(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for HmsDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_seconds = self.0 / 1_000;
        let hours = total_seconds / 3_600;
        let minutes = (total_seconds % 3_600) / 60;
        let seconds = total_seconds % 60;
        write!(f, "{hours:02}:{minutes:02}:{seconds:02}")
    }
}

impl FromStr for HmsDuration {
    type Err = HmsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The store serializes sub-second precision as a ".ffffff" suffix;
        // truncate it rather than reject the record.
        let whole = s.split('.').next().unwrap_or(s);
        let mut parts = whole.split(':');
        let (hours, minutes, seconds) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(h), Some(m), Some(sec), None) => (h, m, sec),
            _ => return Err(HmsParseError(s.to_string())),
        };

        let hours: u64 = hours.parse().map_err(|_| HmsParseError(s.to_string()))?;
        let minutes: u64 = minutes.parse().map_err(|_| HmsParseError(s.to_string()))?;
        let seconds: u64 = seconds.parse().map_err(|_| HmsParseError(s.to_string()))?;
        if minutes > 59 || seconds > 59 {
            return Err(HmsParseError(s.to_string()));
        }

        Ok(Self((hours * 3_600 + minutes * 60 + seconds) * 1_000))
    }
}

impl Serialize for HmsDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HmsDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_zero_padded() {
        assert_eq!(HmsDuration::ZERO.to_string(), "00:00:00");
        assert_eq!(HmsDuration::from_secs(125).to_string(), "00:02:05");
        assert_eq!(HmsDuration::from_secs(3_600 + 62).to_string(), "01:01:02");
        assert_eq!(HmsDuration::from_secs(100 * 3_600).to_string(), "100:00:00");
    }

    #[test]
    fn truncates_sub_second_millis() {
        assert_eq!(HmsDuration::from_millis(1_999).to_string(), "00:00:01");
    }

    #[test]
    fn parses_wire_shapes() {
        assert_eq!("00:02:35".parse::<HmsDuration>().unwrap().as_millis(), 155_000);
        assert_eq!("00:00:00".parse::<HmsDuration>().unwrap(), HmsDuration::ZERO);
        // Django-style microsecond suffix
        assert_eq!(
            "00:00:30.500000".parse::<HmsDuration>().unwrap(),
            HmsDuration::from_secs(30)
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!("".parse::<HmsDuration>().is_err());
        assert!("1:2".parse::<HmsDuration>().is_err());
        assert!("aa:bb:cc".parse::<HmsDuration>().is_err());
        assert!("00:99:00".parse::<HmsDuration>().is_err());
        assert!("00:00:01:02".parse::<HmsDuration>().is_err());
    }

    #[test]
    fn clamps_negative_spans() {
        assert_eq!(HmsDuration::from_millis_i64(-42), HmsDuration::ZERO);
        assert_eq!(HmsDuration::from_millis_i64(1_000).as_millis(), 1_000);
    }

    #[test]
    fn serde_round_trip() {
        let json = serde_json::to_string(&HmsDuration::from_secs(155)).unwrap();
        assert_eq!(json, "\"00:02:35\"");
        let back: HmsDuration = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_millis(), 155_000);
    }
}
