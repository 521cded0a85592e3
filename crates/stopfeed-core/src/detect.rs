//! Change detection against the cached publish baselines.
//!
//! Predictions pass two thresholds: a pre-journey filter bounding publish
//! volume to near-term, actionable predictions, and a change threshold that
//! suppresses sub-second jitter from the source. Events are observation
//! facts; only an unseen key or a state transition publishes.

use crate::cache::{BoundedCache, CacheEntry};
use crate::model::{EventKey, EventRecord, PredictionKey, PredictionRecord};
use chrono::{DateTime, Duration, Utc};

/// How a freshly polled record relates to its cached baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// No baseline exists for the key
    New,
    /// Differs from the baseline by at least the change threshold
    Changed,
    /// Differs from the baseline by less than the change threshold
    Unchanged,
    /// Too far in the future to be actionable; never published
    Suppressed,
}

impl Classification {
    /// Whether records with this classification are published.
    #[must_use]
    pub fn is_publishable(self) -> bool {
        matches!(self, Self::New | Self::Changed)
    }
}

/// What to store for an unchanged prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BaselinePolicy {
    /// Keep the original baseline, so sub-threshold drift keeps accumulating
    /// against it until the threshold is crossed
    #[default]
    Hold,
    /// Store the latest polled time; repeated small moves in one direction
    /// can then stay below the threshold indefinitely
    Refresh,
}

/// Two-threshold change detection for predictions.
#[derive(Debug, Clone)]
pub struct PredictionDetector {
    pre_journey_threshold: Duration,
    change_threshold: Duration,
    baseline: BaselinePolicy,
}

impl PredictionDetector {
    /// Build a detector from the configured thresholds (seconds).
    #[must_use]
    pub fn new(
        pre_journey_threshold_s: u32,
        change_threshold_s: u32,
        baseline: BaselinePolicy,
    ) -> Self {
        Self {
            pre_journey_threshold: Duration::seconds(i64::from(pre_journey_threshold_s)),
            change_threshold: Duration::seconds(i64::from(change_threshold_s)),
            baseline,
        }
    }

    /// Classify a polled prediction against its cached baseline.
    #[must_use]
    pub fn classify(
        &self,
        record: &PredictionRecord,
        cached: Option<&CacheEntry<PredictionRecord>>,
        now: DateTime<Utc>,
    ) -> Classification {
        if record.predicted_time - now > self.pre_journey_threshold {
            return Classification::Suppressed;
        }
        match cached {
            None => Classification::New,
            Some(entry) => {
                let delta = (record.predicted_time - entry.record.predicted_time).abs();
                if delta >= self.change_threshold {
                    Classification::Changed
                } else {
                    Classification::Unchanged
                }
            }
        }
    }

    /// Fold one record's publish outcome back into the cache.
    ///
    /// A published record becomes the new baseline. A failed publish leaves
    /// the old baseline in place so the next cycle re-detects the record and
    /// re-publishes it; delivery is at-least-once across cycles, not via
    /// in-cycle retries. Suppressed records never become a baseline — a key
    /// first seen far in the future is still published as new on its first
    /// eligible observation.
    ///
    /// Returns the key evicted to make room, if any.
    pub fn commit(
        &self,
        cache: &mut BoundedCache<PredictionKey, PredictionRecord>,
        record: PredictionRecord,
        classification: Classification,
        published: bool,
        cycle: u64,
    ) -> Option<PredictionKey> {
        let key = record.key();
        match classification {
            Classification::New | Classification::Changed if published => {
                cache.put(key, record, cycle)
            }
            Classification::New => None,
            Classification::Changed | Classification::Suppressed => {
                cache.refresh_seen(&key, cycle);
                None
            }
            Classification::Unchanged => match self.baseline {
                BaselinePolicy::Hold => {
                    cache.refresh_seen(&key, cycle);
                    None
                }
                BaselinePolicy::Refresh => cache.put(key, record, cycle),
            },
        }
    }
}

/// Change detection for vehicle events.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventDetector;

impl EventDetector {
    /// Classify a polled event against its cached baseline.
    ///
    /// An unseen key is always new. An existing key republishes only on a
    /// state transition; the event time alone never triggers a publish.
    #[must_use]
    pub fn classify(
        &self,
        record: &EventRecord,
        cached: Option<&CacheEntry<EventRecord>>,
    ) -> Classification {
        match cached {
            None => Classification::New,
            Some(entry) if entry.record.event_type != record.event_type => Classification::Changed,
            Some(_) => Classification::Unchanged,
        }
    }

    /// Fold one event's publish outcome back into the cache.
    ///
    /// Returns the key evicted to make room, if any.
    pub fn commit(
        &self,
        cache: &mut BoundedCache<EventKey, EventRecord>,
        record: EventRecord,
        classification: Classification,
        published: bool,
        cycle: u64,
    ) -> Option<EventKey> {
        let key = record.key();
        match classification {
            Classification::New | Classification::Changed if published => {
                cache.put(key, record, cycle)
            }
            Classification::New => None,
            Classification::Changed | Classification::Unchanged | Classification::Suppressed => {
                cache.refresh_seen(&key, cycle);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventType;
    use chrono::TimeZone;
    use std::num::NonZeroUsize;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap()
    }

    fn prediction(seconds_after_noon: i64) -> PredictionRecord {
        PredictionRecord {
            stop_id: "1020453".to_string(),
            journey_id: "7517".to_string(),
            stop_sequence: 4,
            scheduled_time: None,
            predicted_time: noon() + Duration::seconds(seconds_after_noon),
        }
    }

    fn event(event_type: EventType) -> EventRecord {
        EventRecord {
            stop_id: "1020453".to_string(),
            vehicle_id: "V-112".to_string(),
            event_type,
            event_time: noon(),
        }
    }

    fn prediction_cache() -> BoundedCache<PredictionKey, PredictionRecord> {
        BoundedCache::new(NonZeroUsize::new(16).unwrap())
    }

    fn event_cache() -> BoundedCache<EventKey, EventRecord> {
        BoundedCache::new(NonZeroUsize::new(16).unwrap())
    }

    #[test]
    fn unseen_key_is_new() {
        let detector = PredictionDetector::new(600, 5, BaselinePolicy::Hold);
        let record = prediction(60);

        assert_eq!(detector.classify(&record, None, noon()), Classification::New);
    }

    #[test]
    fn change_below_threshold_is_unchanged() {
        // Threshold 5s: cached 12:00:00, polled 12:00:03.
        let detector = PredictionDetector::new(600, 5, BaselinePolicy::Hold);
        let mut cache = prediction_cache();
        let baseline = prediction(0);
        detector.commit(&mut cache, baseline.clone(), Classification::New, true, 1);

        let polled = prediction(3);
        let cached = cache.get(&polled.key());
        assert_eq!(
            detector.classify(&polled, cached, noon()),
            Classification::Unchanged
        );
    }

    #[test]
    fn change_at_threshold_republishes_and_advances_baseline() {
        // Threshold 5s: cached 12:00:00, polled 12:00:06.
        let detector = PredictionDetector::new(600, 5, BaselinePolicy::Hold);
        let mut cache = prediction_cache();
        detector.commit(&mut cache, prediction(0), Classification::New, true, 1);

        let polled = prediction(6);
        let classification = detector.classify(&polled, cache.get(&polled.key()), noon());
        assert_eq!(classification, Classification::Changed);

        detector.commit(&mut cache, polled.clone(), classification, true, 2);
        assert_eq!(
            cache.get(&polled.key()).unwrap().record.predicted_time,
            noon() + Duration::seconds(6)
        );
    }

    #[test]
    fn far_future_prediction_is_suppressed_even_when_changed() {
        let detector = PredictionDetector::new(600, 5, BaselinePolicy::Hold);
        let mut cache = prediction_cache();
        detector.commit(&mut cache, prediction(0), Classification::New, true, 1);

        let polled = prediction(601);
        assert_eq!(
            detector.classify(&polled, cache.get(&polled.key()), noon()),
            Classification::Suppressed
        );
    }

    #[test]
    fn suppressed_record_is_not_cached_as_baseline() {
        let detector = PredictionDetector::new(600, 5, BaselinePolicy::Hold);
        let mut cache = prediction_cache();

        let polled = prediction(4000);
        let classification = detector.classify(&polled, cache.get(&polled.key()), noon());
        assert_eq!(classification, Classification::Suppressed);
        detector.commit(&mut cache, polled.clone(), classification, false, 1);

        // Once the prediction becomes near-term it is a brand-new key.
        let eligible = prediction(300);
        assert_eq!(
            detector.classify(&eligible, cache.get(&eligible.key()), noon()),
            Classification::New
        );
    }

    #[test]
    fn hold_policy_lets_drift_accumulate() {
        let detector = PredictionDetector::new(600, 5, BaselinePolicy::Hold);
        let mut cache = prediction_cache();
        detector.commit(&mut cache, prediction(0), Classification::New, true, 1);

        // +3s: unchanged, baseline held at 12:00:00.
        let drift = prediction(3);
        let classification = detector.classify(&drift, cache.get(&drift.key()), noon());
        assert_eq!(classification, Classification::Unchanged);
        detector.commit(&mut cache, drift, classification, false, 2);

        // Another +3s crosses the threshold against the original baseline.
        let more = prediction(6);
        assert_eq!(
            detector.classify(&more, cache.get(&more.key()), noon()),
            Classification::Changed
        );
    }

    #[test]
    fn refresh_policy_tracks_the_latest_value() {
        let detector = PredictionDetector::new(600, 5, BaselinePolicy::Refresh);
        let mut cache = prediction_cache();
        detector.commit(&mut cache, prediction(0), Classification::New, true, 1);

        let drift = prediction(3);
        let classification = detector.classify(&drift, cache.get(&drift.key()), noon());
        detector.commit(&mut cache, drift, classification, false, 2);

        // Only +3s from the refreshed baseline: still unchanged.
        let more = prediction(6);
        assert_eq!(
            detector.classify(&more, cache.get(&more.key()), noon()),
            Classification::Unchanged
        );
    }

    #[test]
    fn failed_publish_keeps_the_old_baseline() {
        let detector = PredictionDetector::new(600, 5, BaselinePolicy::Hold);
        let mut cache = prediction_cache();
        detector.commit(&mut cache, prediction(0), Classification::New, true, 1);

        let changed = prediction(10);
        let classification = detector.classify(&changed, cache.get(&changed.key()), noon());
        assert_eq!(classification, Classification::Changed);
        detector.commit(&mut cache, changed.clone(), classification, false, 2);

        // The baseline did not advance, so the next cycle re-detects.
        let entry = cache.get(&changed.key()).unwrap();
        assert_eq!(entry.record.predicted_time, noon());
        assert_eq!(entry.last_seen_cycle, 2);
        assert_eq!(
            detector.classify(&changed, cache.get(&changed.key()), noon()),
            Classification::Changed
        );
    }

    #[test]
    fn failed_publish_of_a_new_key_stays_new() {
        let detector = PredictionDetector::new(600, 5, BaselinePolicy::Hold);
        let mut cache = prediction_cache();

        let record = prediction(60);
        detector.commit(&mut cache, record.clone(), Classification::New, false, 1);

        assert!(cache.get(&record.key()).is_none());
        assert_eq!(detector.classify(&record, None, noon()), Classification::New);
    }

    #[test]
    fn unseen_event_is_new() {
        let detector = EventDetector;
        assert_eq!(
            detector.classify(&event(EventType::AtStop), None),
            Classification::New
        );
    }

    #[test]
    fn repeated_event_is_unchanged() {
        let detector = EventDetector;
        let mut cache = event_cache();
        detector.commit(&mut cache, event(EventType::AtStop), Classification::New, true, 1);

        let again = event(EventType::AtStop);
        assert_eq!(
            detector.classify(&again, cache.get(&again.key())),
            Classification::Unchanged
        );
    }

    #[test]
    fn state_transition_republishes() {
        let detector = EventDetector;
        let mut cache = event_cache();
        detector.commit(&mut cache, event(EventType::AtStop), Classification::New, true, 1);

        let departed = event(EventType::Departed);
        assert_eq!(
            detector.classify(&departed, cache.get(&departed.key())),
            Classification::Changed
        );
    }
}
