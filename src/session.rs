//! Scan session
//!
//! Owns the detection pipeline and at most one in-flight scan. A second
//! scan requested while one is running is rejected with `Busy`; `stop()`
//! cancels the running scan. Winning detections go to the storage sink and
//! progress is published as [`SessionEvent`]s.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capture::CapturedImage;
use crate::shared::SessionEvent;
use crate::storage::{Competitor, CompetitorLookup, DetectionRecord, DetectionSink};
use crate::vision::{DetectionPipeline, ScanError, ScanTrace, VariantOutcome};

/// Everything a completed scan produced
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub scan_id: Uuid,
    pub outcome: VariantOutcome,
    /// Registered competitor for the best detection
    pub competitor: Option<Competitor>,
}

/// Clears the in-flight slot when a scan ends or its future is dropped
struct InFlight<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}

pub struct ScanSession {
    pipeline: DetectionPipeline,
    sink: Option<Arc<dyn DetectionSink>>,
    lookup: Option<Arc<dyn CompetitorLookup>>,
    in_flight: Mutex<Option<CancellationToken>>,
    last_trace: Mutex<Option<ScanTrace>>,
    /// One sender per `events()` receiver; dropped receivers are pruned on publish
    subscribers: Mutex<Vec<Sender<SessionEvent>>>,
}

impl ScanSession {
    pub fn new(pipeline: DetectionPipeline) -> Self {
        Self {
            pipeline,
            sink: None,
            lookup: None,
            in_flight: Mutex::new(None),
            last_trace: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Store winning detections in `sink`
    pub fn with_sink(mut self, sink: Arc<dyn DetectionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Resolve the best detection through `lookup`
    pub fn with_lookup(mut self, lookup: Arc<dyn CompetitorLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Subscribe to session events published from now on.
    /// Dropping the receiver unsubscribes.
    pub fn events(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Intermediate trace of the most recent scan that reached the pipeline
    pub fn last_trace(&self) -> Option<ScanTrace> {
        self.last_trace.lock().clone()
    }

    pub fn is_scanning(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    /// Cancel the in-flight scan. Returns false if nothing was running.
    pub fn stop(&self) -> bool {
        match self.in_flight.lock().as_ref() {
            Some(token) => {
                info!("Stopping in-flight scan");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Run one scan over a captured image
    pub async fn scan(&self, image: &CapturedImage) -> Result<ScanReport, ScanError> {
        let cancel = {
            let mut slot = self.in_flight.lock();
            if slot.is_some() {
                debug!("Rejecting scan, another one is in flight");
                return Err(ScanError::Busy);
            }
            let token = CancellationToken::new();
            *slot = Some(token.clone());
            token
        };
        let _in_flight = InFlight { slot: &self.in_flight };

        let scan_id = Uuid::new_v4();
        info!("Scan {} started ({} bytes)", scan_id, image.len());
        self.publish(SessionEvent::ScanStarted {
            scan_id,
            at: image.captured_at,
        });

        let (result, trace) = self.pipeline.run_traced(&image.data, &cancel).await;
        *self.last_trace.lock() = Some(trace);
        let result = result.and_then(|outcome| {
            self.store(&outcome, image)?;
            Ok(outcome)
        });

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                info!("Scan {} ended without detection: {}", scan_id, e);
                self.publish(SessionEvent::ScanFailed {
                    scan_id,
                    kind: e.kind(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        self.publish(SessionEvent::ScanCompleted {
            scan_id,
            variant: outcome.variant_name.clone(),
            results: outcome.results.clone(),
        });

        let competitor = self.identify(&outcome);
        if let Some(competitor) = &competitor {
            info!(
                "Sail {} identified: {}",
                competitor.sail_number,
                competitor.boat_name.as_deref().unwrap_or("unnamed boat")
            );
            self.publish(SessionEvent::CompetitorIdentified {
                scan_id,
                competitor: competitor.clone(),
            });
        }

        Ok(ScanReport {
            scan_id,
            outcome,
            competitor,
        })
    }

    /// Record every result of the winning variant, all or none
    fn store(&self, outcome: &VariantOutcome, image: &CapturedImage) -> Result<(), ScanError> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };

        let records: Vec<DetectionRecord> = outcome
            .results
            .iter()
            .map(|result| DetectionRecord {
                value: result.value,
                confidence: result.confidence,
                timestamp: image.captured_at,
            })
            .collect();
        if records.is_empty() {
            return Ok(());
        }

        sink.record_all(&records)
            .map_err(|e| ScanError::Storage(format!("{:#}", e)))?;
        debug!("Recorded {} detection(s)", records.len());
        Ok(())
    }

    /// Lookup failures are logged and treated as not found
    fn identify(&self, outcome: &VariantOutcome) -> Option<Competitor> {
        let lookup = self.lookup.as_ref()?;
        let best = outcome.best()?;

        match lookup.lookup(best.value) {
            Ok(found) => found,
            Err(e) => {
                warn!("Competitor lookup for {} failed: {:#}", best.value, e);
                None
            }
        }
    }

    fn publish(&self, event: SessionEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}
