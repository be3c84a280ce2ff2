//! Shared types for the safe-zone monitor

use crate::domain::geo::distance_m;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A single normalized location fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: DateTime<Utc>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, captured_at: DateTime<Utc>) -> Self {
        Self { latitude, longitude, captured_at }
    }

    /// Position captured right now
    pub fn now(latitude: f64, longitude: f64) -> Self {
        Self::new(latitude, longitude, Utc::now())
    }

    /// Capture time as epoch milliseconds
    pub fn epoch_ms(&self) -> i64 {
        self.captured_at.timestamp_millis()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ZoneError {
    #[error("zone radius must be a positive number of meters, got {0}")]
    InvalidRadius(f64),
    #[error("zone center ({0}, {1}) is not a valid coordinate")]
    InvalidCenter(f64, f64),
}

/// Circular geofence around a trip destination
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SafeZone {
    center_latitude: f64,
    center_longitude: f64,
    radius_meters: f64,
}

impl SafeZone {
    pub fn new(center_latitude: f64, center_longitude: f64, radius_meters: f64) -> Result<Self, ZoneError> {
        if !(radius_meters.is_finite() && radius_meters > 0.0) {
            return Err(ZoneError::InvalidRadius(radius_meters));
        }
        let lat_ok = center_latitude.is_finite() && (-90.0..=90.0).contains(&center_latitude);
        let lon_ok = center_longitude.is_finite() && (-180.0..=180.0).contains(&center_longitude);
        if !(lat_ok && lon_ok) {
            return Err(ZoneError::InvalidCenter(center_latitude, center_longitude));
        }
        Ok(Self { center_latitude, center_longitude, radius_meters })
    }

    pub fn center_latitude(&self) -> f64 {
        self.center_latitude
    }

    pub fn center_longitude(&self) -> f64 {
        self.center_longitude
    }

    pub fn radius_meters(&self) -> f64 {
        self.radius_meters
    }

    /// Radius rounded to whole kilometers for human-facing text
    pub fn radius_km(&self) -> f64 {
        (self.radius_meters / 1000.0 * 10.0).round() / 10.0
    }

    pub fn distance_from_center(&self, position: &Position) -> f64 {
        distance_m(position.latitude, position.longitude, self.center_latitude, self.center_longitude)
    }
}

/// Inside/outside classification of the latest fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZoneState {
    #[default]
    Unknown,
    Inside,
    Outside,
}

impl ZoneState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneState::Unknown => "unknown",
            ZoneState::Inside => "inside",
            ZoneState::Outside => "outside",
        }
    }
}

impl std::fmt::Display for ZoneState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emergency contact from the user's profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    #[serde(alias = "phone")]
    pub phone_number: String,
}

impl Contact {
    pub fn new(name: impl Into<String>, phone_number: impl Into<String>) -> Self {
        Self { name: name.into(), phone_number: phone_number.into() }
    }
}

/// Severity tier reported by the movement-analysis service
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[serde(alias = "low", alias = "Low")]
    Low,
    #[serde(alias = "medium", alias = "Medium")]
    Medium,
    #[serde(alias = "high", alias = "High")]
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest anomaly verdict; superseded wholesale by the next one
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyAssessment {
    pub severity: Severity,
    pub reason: String,
    /// Always within [0, 1]
    pub confidence: f64,
    pub kind: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    BoundaryExit,
    Sos,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::BoundaryExit => "boundary_exit",
            AlertKind::Sos => "sos",
        }
    }
}

/// Delivery result for one recipient of one dispatch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipientResult {
    pub contact: Contact,
    /// Number actually sent to, after normalization
    pub to: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

/// Overall classification of a dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    FullSuccess { sent: usize },
    PartialSuccess { sent: usize, total: usize, failed: Vec<String> },
    TotalFailure { total: usize },
}

impl DispatchOutcome {
    /// At least one recipient got the message
    pub fn delivered(&self) -> bool {
        !matches!(self, DispatchOutcome::TotalFailure { .. })
    }
}

/// One dispatch attempt. Created per attempt, never reused.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    pub id: Uuid,
    pub kind: AlertKind,
    pub recipients: Vec<Contact>,
    pub message: String,
    pub results: Vec<RecipientResult>,
    pub created_at: DateTime<Utc>,
}

impl AlertRecord {
    pub fn new(kind: AlertKind, message: String, results: Vec<RecipientResult>) -> Self {
        let recipients = results.iter().map(|r| r.contact.clone()).collect();
        Self { id: Uuid::now_v7(), kind, recipients, message, results, created_at: Utc::now() }
    }

    pub fn sent_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn outcome(&self) -> DispatchOutcome {
        let total = self.results.len();
        let sent = self.sent_count();
        if sent == total && total > 0 {
            DispatchOutcome::FullSuccess { sent }
        } else if sent > 0 {
            let failed =
                self.results.iter().filter(|r| !r.success).map(|r| r.contact.name.clone()).collect();
            DispatchOutcome::PartialSuccess { sent, total, failed }
        } else {
            DispatchOutcome::TotalFailure { total }
        }
    }

    /// Human-readable result line for the user-visible layer
    pub fn summary(&self) -> String {
        match (self.kind, self.outcome()) {
            (AlertKind::BoundaryExit, DispatchOutcome::FullSuccess { .. }) => {
                let to = self.results.first().map(|r| r.to.as_str()).unwrap_or_default();
                format!("Boundary alert SMS sent to {}", to)
            }
            (AlertKind::BoundaryExit, _) => {
                let (to, detail) = self
                    .results
                    .first()
                    .map(|r| (r.to.as_str(), r.error_detail.as_deref().unwrap_or("unknown error")))
                    .unwrap_or(("", "no recipient"));
                format!("Failed to send boundary alert SMS to {}: {}", to, detail)
            }
            (AlertKind::Sos, DispatchOutcome::FullSuccess { sent }) => {
                format!("SOS alert sent successfully to all {} emergency contacts", sent)
            }
            (AlertKind::Sos, DispatchOutcome::PartialSuccess { sent, total, failed }) => {
                format!(
                    "SOS alert sent to {}/{} contacts. Failed to reach: {}",
                    sent,
                    total,
                    failed.join(", ")
                )
            }
            (AlertKind::Sos, DispatchOutcome::TotalFailure { total }) => format!(
                "Failed to send SOS alerts to any of {} contacts. Call emergency services directly",
                total
            ),
        }
    }
}
