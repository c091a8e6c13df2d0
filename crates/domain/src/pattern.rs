//! Pattern records — immutable historical observations of entity state.
//!
//! Records carry contextual tags (hour-of-day, day-of-week) so a
//! predictive capability can ask "what state does this entity usually
//! hold at 7am on a weekday". Records are never mutated or deleted.

use std::collections::HashMap;

use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};

use crate::id::EntityId;
use crate::time::Timestamp;

/// Contextual tags attached to an observation at record time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextTags {
    /// Hour of day, `0..=23`.
    pub hour: u8,
    /// Day of week, `0..=6` with Monday as `0`.
    pub weekday: u8,
}

impl ContextTags {
    /// Derive tags from a timestamp.
    #[must_use]
    pub fn from_timestamp(ts: &Timestamp) -> Self {
        Self {
            hour: ts.hour() as u8,
            weekday: ts.weekday().num_days_from_monday() as u8,
        }
    }
}

/// Context filter for pattern queries. `None` fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextQuery {
    pub hour: Option<u8>,
    pub weekday: Option<u8>,
}

impl ContextQuery {
    /// Match every observation regardless of context.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Match observations recorded in the given hour of day.
    #[must_use]
    pub fn at_hour(hour: u8) -> Self {
        Self {
            hour: Some(hour),
            weekday: None,
        }
    }

    /// Whether the given tags satisfy this filter.
    #[must_use]
    pub fn matches(&self, tags: ContextTags) -> bool {
        self.hour.is_none_or(|h| h == tags.hour)
            && self.weekday.is_none_or(|w| w == tags.weekday)
    }
}

/// An immutable historical observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub entity_id: EntityId,
    pub state: String,
    pub recorded_at: Timestamp,
    pub context: ContextTags,
}

impl PatternRecord {
    /// Record an observation, deriving context tags from the timestamp.
    #[must_use]
    pub fn observed(
        entity_id: impl Into<EntityId>,
        state: impl Into<String>,
        recorded_at: Timestamp,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            recorded_at,
            context: ContextTags::from_timestamp(&recorded_at),
        }
    }
}

/// Historical distribution of observed states for one entity/context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyTable {
    counts: HashMap<String, u64>,
    total: u64,
}

impl FrequencyTable {
    /// Count one observation of `state`.
    pub fn add(&mut self, state: impl Into<String>) {
        *self.counts.entry(state.into()).or_insert(0) += 1;
        self.total += 1;
    }

    /// The most frequently observed state, with its count.
    /// Ties break towards the lexicographically smaller state so the
    /// answer is deterministic.
    #[must_use]
    pub fn most_likely(&self) -> Option<(&str, u64)> {
        self.counts
            .iter()
            .max_by(|(sa, ca), (sb, cb)| ca.cmp(cb).then_with(|| sb.cmp(sa)))
            .map(|(state, count)| (state.as_str(), *count))
    }

    /// Relative frequency of `state` in `0.0..=1.0`.
    #[must_use]
    pub fn frequency(&self, state: &str) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.counts.get(state).copied().unwrap_or(0) as f64 / self.total as f64
    }

    /// Total observations counted.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Whether no observations were counted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Mean/spread summary over numeric observations, used for anomaly
/// flagging. The flag is informational only and never blocks execution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericProfile {
    pub mean: f64,
    pub std_dev: f64,
    pub samples: usize,
}

impl NumericProfile {
    /// Summarize a set of numeric observations. Returns `None` for an
    /// empty set.
    #[must_use]
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            mean,
            std_dev: variance.sqrt(),
            samples: values.len(),
        })
    }

    /// Whether `value` lies more than `sigma` standard deviations from
    /// the historical mean. A profile without spread (fewer than two
    /// samples, or identical samples) never flags.
    #[must_use]
    pub fn is_anomalous(&self, value: f64, sigma: f64) -> bool {
        self.samples >= 2 && self.std_dev > 0.0 && (value - self.mean).abs() > sigma * self.std_dev
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(hour: u32) -> Timestamp {
        // 2024-01-01 was a Monday.
        chrono::Utc
            .with_ymd_and_hms(2024, 1, 1, hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn should_derive_context_tags_from_timestamp() {
        let tags = ContextTags::from_timestamp(&ts(7));
        assert_eq!(tags.hour, 7);
        assert_eq!(tags.weekday, 0);
    }

    #[test]
    fn should_match_any_context_with_empty_query() {
        let tags = ContextTags::from_timestamp(&ts(23));
        assert!(ContextQuery::any().matches(tags));
    }

    #[test]
    fn should_filter_by_hour() {
        let tags = ContextTags::from_timestamp(&ts(7));
        assert!(ContextQuery::at_hour(7).matches(tags));
        assert!(!ContextQuery::at_hour(8).matches(tags));
    }

    #[test]
    fn should_filter_by_hour_and_weekday() {
        let tags = ContextTags::from_timestamp(&ts(7));
        let query = ContextQuery {
            hour: Some(7),
            weekday: Some(1),
        };
        assert!(!query.matches(tags));
    }

    #[test]
    fn should_build_record_with_derived_context() {
        let record = PatternRecord::observed("light.kitchen", "on", ts(19));
        assert_eq!(record.context.hour, 19);
        assert_eq!(record.state, "on");
    }

    #[test]
    fn should_count_frequencies() {
        let mut table = FrequencyTable::default();
        table.add("on");
        table.add("on");
        table.add("off");

        assert_eq!(table.total(), 3);
        assert_eq!(table.most_likely(), Some(("on", 2)));
        assert!((table.frequency("off") - 1.0 / 3.0).abs() < 1e-9);
        assert!((table.frequency("unknown") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn should_break_frequency_ties_deterministically() {
        let mut table = FrequencyTable::default();
        table.add("off");
        table.add("on");
        assert_eq!(table.most_likely(), Some(("off", 1)));
    }

    #[test]
    fn should_return_none_for_empty_table() {
        let table = FrequencyTable::default();
        assert!(table.most_likely().is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn should_compute_numeric_profile() {
        let profile = NumericProfile::from_values(&[20.0, 21.0, 22.0]).unwrap();
        assert!((profile.mean - 21.0).abs() < 1e-9);
        assert_eq!(profile.samples, 3);
        assert!(profile.std_dev > 0.0);
    }

    #[test]
    fn should_flag_values_far_from_mean() {
        let profile = NumericProfile::from_values(&[20.0, 21.0, 22.0, 20.5, 21.5]).unwrap();
        assert!(profile.is_anomalous(40.0, 3.0));
        assert!(!profile.is_anomalous(21.2, 3.0));
    }

    #[test]
    fn should_never_flag_without_spread() {
        let flat = NumericProfile::from_values(&[21.0, 21.0, 21.0]).unwrap();
        assert!(!flat.is_anomalous(100.0, 3.0));

        let single = NumericProfile::from_values(&[21.0]).unwrap();
        assert!(!single.is_anomalous(100.0, 3.0));
    }

    #[test]
    fn should_return_none_profile_for_empty_values() {
        assert!(NumericProfile::from_values(&[]).is_none());
    }
}
