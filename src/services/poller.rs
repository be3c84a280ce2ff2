//! Periodic movement-anomaly polling
//!
//! The poller owns the held assessment. The session loop asks it for a
//! request on each tick, runs the network call off-loop and hands the
//! result back through `apply`.

use crate::domain::types::{AnomalyAssessment, Position, SafeZone, Severity};
use crate::io::analyzer::{AnalyzerError, MovementRequest, MovementVerdict, TrackPoint};
use crate::services::sampler::PositionPair;
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Called once for every High-severity assessment
#[async_trait]
pub trait AnomalyHook: Send + Sync {
    async fn on_high_severity_anomaly(&self, assessment: &AnomalyAssessment, position: &Position);
}

/// Hook that only records the anomaly in the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAnomalyHook;

#[async_trait]
impl AnomalyHook for LogAnomalyHook {
    async fn on_high_severity_anomaly(&self, assessment: &AnomalyAssessment, position: &Position) {
        warn!(
            reason = %assessment.reason,
            confidence = %assessment.confidence,
            lat = %position.latitude,
            lon = %position.longitude,
            "high_severity_anomaly"
        );
    }
}

/// Effect of applying one poll result
#[derive(Debug, Clone, PartialEq)]
pub enum AssessmentChange {
    Raised(AnomalyAssessment),
    Cleared,
    Unchanged,
    Failed(AnalyzerError),
}

impl AssessmentChange {
    /// High-severity raise that the hook must see
    pub fn is_high_severity(&self) -> bool {
        matches!(self, AssessmentChange::Raised(a) if a.severity == Severity::High)
    }
}

pub struct AnomalyPoller {
    zone: SafeZone,
    held_tx: watch::Sender<Option<AnomalyAssessment>>,
}

impl AnomalyPoller {
    pub fn new(zone: SafeZone) -> Self {
        let (held_tx, _) = watch::channel(None);
        Self { zone, held_tx }
    }

    /// Observers of the held assessment
    pub fn subscribe(&self) -> watch::Receiver<Option<AnomalyAssessment>> {
        self.held_tx.subscribe()
    }

    pub fn held(&self) -> Option<AnomalyAssessment> {
        self.held_tx.borrow().clone()
    }

    /// Request for the current register, or `None` until two fixes exist
    pub fn prepare(&self, pair: &PositionPair) -> Option<MovementRequest> {
        let Some((previous, current)) = pair.both() else {
            debug!("anomaly_poll_skipped_insufficient_fixes");
            return None;
        };

        let current_distance = self.zone.distance_from_center(&current);
        let previous_distance = self.zone.distance_from_center(&previous);
        let zone_risk = u8::from(current_distance > self.zone.radius_meters());
        // Moving away from the zone center
        let deviation = u8::from(current_distance > previous_distance);

        Some(MovementRequest {
            prev_point: TrackPoint::from(&previous),
            curr_point: TrackPoint::from(&current),
            zone_risk,
            deviation,
        })
    }

    /// Fold a poll result into the held assessment
    pub fn apply(&self, result: Result<MovementVerdict, AnalyzerError>) -> AssessmentChange {
        match result {
            Ok(MovementVerdict::Anomaly(assessment)) => {
                info!(
                    severity = %assessment.severity,
                    reason = %assessment.reason,
                    confidence = %assessment.confidence,
                    kind = %assessment.kind,
                    "anomaly_detected"
                );
                self.held_tx.send_replace(Some(assessment.clone()));
                AssessmentChange::Raised(assessment)
            }
            Ok(MovementVerdict::Clear) => {
                if self.held_tx.send_replace(None).is_some() {
                    info!("anomaly_cleared");
                    AssessmentChange::Cleared
                } else {
                    AssessmentChange::Unchanged
                }
            }
            Err(e) => {
                warn!(error = %e, "anomaly_poll_failed");
                AssessmentChange::Failed(e)
            }
        }
    }
}
