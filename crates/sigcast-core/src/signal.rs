//! Signal data model.
//!
//! A signal has an immutable static identity (`SignalStatic`) assigned at
//! creation and a dynamic sample (`SignalSample`) mutated only by the loop of
//! the ticker that owns it.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Dense, zero-based signal index.
pub type SignalIndex = u32;

/// Value generation family of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Continuous value in [0, 100).
    Analog,
    /// Integer step value in [0, 10].
    Discrete,
    /// 0 or 1.
    Digital,
}

impl SignalKind {
    /// Kind for the i-th generated signal (cycles through all kinds).
    pub fn cycle(i: usize) -> Self {
        match i % 3 {
            0 => Self::Analog,
            1 => Self::Discrete,
            _ => Self::Digital,
        }
    }
}

/// Quality of the last sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalState {
    /// The ticker has not produced a sample yet.
    #[default]
    NeverUpdated,
    Ok,
    Bad,
    /// The ticker is not running and cannot report.
    InternalError,
}

/// Static identity of a signal. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalStatic {
    pub name: String,
    pub index: SignalIndex,
    #[serde(rename = "type")]
    pub kind: SignalKind,
    /// Sample period, serialized in milliseconds.
    #[serde(rename = "period", with = "duration_ms")]
    pub sample_period: Duration,
}

impl SignalStatic {
    /// Create a signal identity, rejecting a zero sample period.
    pub fn new(
        name: impl Into<String>,
        index: SignalIndex,
        kind: SignalKind,
        sample_period: Duration,
    ) -> Result<Self> {
        if sample_period.is_zero() {
            return Err(CoreError::InvalidSignal(format!(
                "signal {index} has a zero sample period"
            )));
        }
        Ok(Self {
            name: name.into(),
            index,
            kind,
            sample_period,
        })
    }
}

/// Dynamic data of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SignalSample {
    pub value: f32,
    pub state: SignalState,
    /// Ticks since the aggregator last took this sample.
    pub updates: u32,
    /// Time of the last update, Unix nanoseconds.
    pub timestamp: i64,
}

impl SignalSample {
    /// Sample reported for a ticker that is not running.
    pub fn internal_error() -> Self {
        Self {
            state: SignalState::InternalError,
            ..Self::default()
        }
    }
}

/// Catalogue entry: static identity plus current sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEntry {
    #[serde(flatten)]
    pub signal: SignalStatic,
    #[serde(flatten)]
    pub sample: SignalSample,
}

/// Delta entry: index plus sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexedSample {
    pub index: SignalIndex,
    #[serde(flatten)]
    pub sample: SignalSample,
}

/// Current wall-clock time in Unix nanoseconds.
pub fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_static_rejects_zero_period() {
        let err = SignalStatic::new("Sig0", 0, SignalKind::Analog, Duration::ZERO).unwrap_err();
        assert!(err.to_string().contains("zero sample period"));
    }

    #[test]
    fn test_entry_serializes_flat() {
        let entry = SignalEntry {
            signal: SignalStatic::new("Sig0", 0, SignalKind::Analog, Duration::from_secs(10))
                .unwrap(),
            sample: SignalSample {
                value: 42.5,
                state: SignalState::Ok,
                updates: 1,
                timestamp: 1_700_000_000_000_000_000,
            },
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["name"], "Sig0");
        assert_eq!(json["index"], 0);
        assert_eq!(json["type"], "analog");
        assert_eq!(json["period"], 10_000);
        assert_eq!(json["value"], 42.5);
        assert_eq!(json["state"], "ok");
        assert_eq!(json["timestamp"], 1_700_000_000_000_000_000i64);
    }

    #[test]
    fn test_internal_error_sample() {
        let sample = SignalSample::internal_error();
        assert_eq!(sample.state, SignalState::InternalError);
        assert_eq!(sample.updates, 0);
    }

    #[test]
    fn test_kind_cycle() {
        assert_eq!(SignalKind::cycle(0), SignalKind::Analog);
        assert_eq!(SignalKind::cycle(1), SignalKind::Discrete);
        assert_eq!(SignalKind::cycle(2), SignalKind::Digital);
        assert_eq!(SignalKind::cycle(3), SignalKind::Analog);
    }
}
