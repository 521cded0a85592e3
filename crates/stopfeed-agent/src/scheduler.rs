//! The poll scheduler.
//!
//! Drives the fetch → detect → publish → update loop at a fixed interval.
//! Cycles run inline on the scheduler task: cache access is single-writer by
//! construction and two cycles can never overlap — a tick that comes due
//! mid-cycle is coalesced into the next one. Predictions and events run as
//! independent sub-cycles against independent caches, so a fetch failure on
//! one side never stalls the other.

use crate::config::PipelineConfig;
use crate::publisher::PublishSink;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use stopfeed_core::{
    BoundedCache, Classification, EventDetector, EventKey, EventRecord, EventRow,
    PredictionDetector, PredictionKey, PredictionRecord, PredictionRow, SourceClient, SourceError,
};
use stopfeed_proto::{arrange_events, arrange_predictions, TopicScheme};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Per-domain outcome counters for one poll cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DomainStats {
    /// Whether the fetch succeeded; a failed fetch leaves the cache untouched
    pub fetch_ok: bool,
    /// Rows returned by the source
    pub fetched: usize,
    /// Rows dropped by validation
    pub malformed: usize,
    /// Records published
    pub published: usize,
    /// Records whose publish failed
    pub failed: usize,
    /// Entries evicted to respect the cache capacity
    pub evicted: usize,
    /// Entries swept because the source stopped reporting them
    pub expired: usize,
}

/// One cycle's combined report.
#[derive(Debug, Clone, Copy)]
pub struct CycleStats {
    /// Monotonically increasing cycle stamp
    pub cycle: u64,
    /// Prediction sub-cycle counters
    pub predictions: DomainStats,
    /// Event sub-cycle counters
    pub events: DomainStats,
}

/// Drives poll cycles against a source and a publish sink.
pub struct PollScheduler<S, P> {
    source: S,
    sink: P,
    scheme: TopicScheme,
    prediction_detector: PredictionDetector,
    event_detector: EventDetector,
    predictions: BoundedCache<PredictionKey, PredictionRecord>,
    events: BoundedCache<EventKey, EventRecord>,
    poll_interval: std::time::Duration,
    stale_after_cycles: u64,
    cycle: u64,
}

impl<S: SourceClient, P: PublishSink> PollScheduler<S, P> {
    /// Build a scheduler with fresh caches.
    #[must_use]
    pub fn new(pipeline: &PipelineConfig, scheme: TopicScheme, source: S, sink: P) -> Self {
        Self {
            source,
            sink,
            scheme,
            prediction_detector: PredictionDetector::new(
                pipeline.pre_journey_threshold_s,
                pipeline.change_threshold_s,
                pipeline.baseline_policy,
            ),
            event_detector: EventDetector,
            predictions: BoundedCache::new(pipeline.prediction_cache_size),
            events: BoundedCache::new(pipeline.event_cache_size),
            poll_interval: pipeline.poll_interval,
            stale_after_cycles: pipeline.stale_after_cycles,
            cycle: 0,
        }
    }

    /// Run cycles at the configured interval until shutdown is signalled.
    ///
    /// The first cycle starts immediately. Shutdown is observed between
    /// cycles, so an in-flight cycle always completes before the loop
    /// returns.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            let stats = self.run_cycle().await;
            tracing::info!(
                cycle = stats.cycle,
                predictions_fetched = stats.predictions.fetched,
                predictions_published = stats.predictions.published,
                prediction_failures = stats.predictions.failed,
                events_fetched = stats.events.fetched,
                events_published = stats.events.published,
                event_failures = stats.events.failed,
                "Poll cycle complete"
            );
            if *shutdown.borrow() {
                break;
            }
        }
        tracing::info!("Poll loop stopped");
    }

    /// Run one fetch → detect → publish → update pass.
    pub async fn run_cycle(&mut self) -> CycleStats {
        self.cycle += 1;
        let now = Utc::now();
        let (prediction_rows, event_rows) = tokio::join!(
            self.source.fetch_predictions(),
            self.source.fetch_events()
        );
        let predictions = self.prediction_cycle(prediction_rows, now).await;
        let events = self.event_cycle(event_rows, now).await;
        CycleStats {
            cycle: self.cycle,
            predictions,
            events,
        }
    }

    async fn prediction_cycle(
        &mut self,
        rows: Result<Vec<PredictionRow>, SourceError>,
        now: DateTime<Utc>,
    ) -> DomainStats {
        let mut stats = DomainStats::default();
        let rows = match rows {
            Ok(rows) => {
                stats.fetch_ok = true;
                rows
            }
            Err(error) => {
                tracing::error!(%error, "Prediction fetch failed, skipping this cycle");
                return stats;
            }
        };
        stats.fetched = rows.len();

        let mut outcomes: Vec<(PredictionRecord, Classification)> =
            Vec::with_capacity(rows.len());
        for row in rows {
            match row.validate() {
                Ok(record) => {
                    let classification = self.prediction_detector.classify(
                        &record,
                        self.predictions.get(&record.key()),
                        now,
                    );
                    outcomes.push((record, classification));
                }
                Err(error) => {
                    stats.malformed += 1;
                    tracing::debug!(%error, "Dropping malformed prediction row");
                }
            }
        }

        let publishable: Vec<&PredictionRecord> = outcomes
            .iter()
            .filter(|(_, classification)| classification.is_publishable())
            .map(|(record, _)| record)
            .collect();
        let mut failed_stops = HashSet::new();
        for outbound in arrange_predictions(&publishable, &self.scheme, now) {
            let payload = match outbound.message.to_json() {
                Ok(payload) => payload,
                Err(error) => {
                    tracing::error!(%error, topic = %outbound.topic, "Could not serialize message");
                    failed_stops.insert(outbound.stop_id);
                    continue;
                }
            };
            if let Err(error) = self.sink.publish(&outbound.topic, payload).await {
                tracing::warn!(
                    %error,
                    topic = %outbound.topic,
                    "Publish failed; records stay eligible for the next cycle"
                );
                failed_stops.insert(outbound.stop_id);
            }
        }

        for (record, classification) in outcomes {
            let published =
                classification.is_publishable() && !failed_stops.contains(&record.stop_id);
            if classification.is_publishable() {
                if published {
                    stats.published += 1;
                } else {
                    stats.failed += 1;
                }
            }
            if let Some(evicted) = self.prediction_detector.commit(
                &mut self.predictions,
                record,
                classification,
                published,
                self.cycle,
            ) {
                stats.evicted += 1;
                tracing::debug!(?evicted, "Prediction cache full, evicted an entry");
            }
        }

        let swept = self.predictions.remove_stale(self.cycle, self.stale_after_cycles);
        stats.expired = swept.len();
        if !swept.is_empty() {
            tracing::debug!(count = swept.len(), "Swept stale prediction entries");
        }
        stats
    }

    async fn event_cycle(
        &mut self,
        rows: Result<Vec<EventRow>, SourceError>,
        now: DateTime<Utc>,
    ) -> DomainStats {
        let mut stats = DomainStats::default();
        let rows = match rows {
            Ok(rows) => {
                stats.fetch_ok = true;
                rows
            }
            Err(error) => {
                tracing::error!(%error, "Event fetch failed, skipping this cycle");
                return stats;
            }
        };
        stats.fetched = rows.len();

        let mut outcomes: Vec<(EventRecord, Classification)> = Vec::with_capacity(rows.len());
        for row in rows {
            match row.validate() {
                Ok(record) => {
                    let classification = self
                        .event_detector
                        .classify(&record, self.events.get(&record.key()));
                    outcomes.push((record, classification));
                }
                Err(error) => {
                    stats.malformed += 1;
                    tracing::debug!(%error, "Dropping malformed event row");
                }
            }
        }

        let publishable: Vec<&EventRecord> = outcomes
            .iter()
            .filter(|(_, classification)| classification.is_publishable())
            .map(|(record, _)| record)
            .collect();
        let mut failed_stops = HashSet::new();
        for outbound in arrange_events(&publishable, &self.scheme, now) {
            let payload = match outbound.message.to_json() {
                Ok(payload) => payload,
                Err(error) => {
                    tracing::error!(%error, topic = %outbound.topic, "Could not serialize message");
                    failed_stops.insert(outbound.stop_id);
                    continue;
                }
            };
            if let Err(error) = self.sink.publish(&outbound.topic, payload).await {
                tracing::warn!(
                    %error,
                    topic = %outbound.topic,
                    "Publish failed; records stay eligible for the next cycle"
                );
                failed_stops.insert(outbound.stop_id);
            }
        }

        for (record, classification) in outcomes {
            let published =
                classification.is_publishable() && !failed_stops.contains(&record.stop_id);
            if classification.is_publishable() {
                if published {
                    stats.published += 1;
                } else {
                    stats.failed += 1;
                }
            }
            if let Some(evicted) = self.event_detector.commit(
                &mut self.events,
                record,
                classification,
                published,
                self.cycle,
            ) {
                stats.evicted += 1;
                tracing::debug!(?evicted, "Event cache full, evicted an entry");
            }
        }

        let swept = self.events.remove_stale(self.cycle, self.stale_after_cycles);
        stats.expired = swept.len();
        if !swept.is_empty() {
            tracing::debug!(count = swept.len(), "Swept stale event entries");
        }
        stats
    }
}
