//! Movement-analysis service client
//!
//! Request: `{prev_point, curr_point, zone_risk, deviation}` where points are
//! `{lat, lon, timestamp}` (epoch ms). Response: `{status: "ALERT"|"OK",
//! data?: {severity, reason, confidence, type}}`.

use crate::domain::types::{AnomalyAssessment, Position, Severity};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyzerError {
    #[error("analyzer unreachable: {0}")]
    Transport(String),
    #[error("analyzer returned HTTP {0}")]
    Status(u16),
    #[error("analyzer response malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    pub timestamp: i64,
}

impl From<&Position> for TrackPoint {
    fn from(p: &Position) -> Self {
        Self { lat: p.latitude, lon: p.longitude, timestamp: p.epoch_ms() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovementRequest {
    pub prev_point: TrackPoint,
    pub curr_point: TrackPoint,
    pub zone_risk: u8,
    pub deviation: u8,
}

/// Interpreted analyzer answer
#[derive(Debug, Clone, PartialEq)]
pub enum MovementVerdict {
    Anomaly(AnomalyAssessment),
    Clear,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzerResponse {
    pub status: String,
    #[serde(default)]
    pub data: Option<AnalyzerAlertData>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzerAlertData {
    pub severity: Severity,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl AnalyzerResponse {
    pub fn into_verdict(self) -> Result<MovementVerdict, AnalyzerError> {
        if self.status.eq_ignore_ascii_case("OK") {
            return Ok(MovementVerdict::Clear);
        }
        if !self.status.eq_ignore_ascii_case("ALERT") {
            return Err(AnalyzerError::Malformed(format!("unknown status {:?}", self.status)));
        }

        let data = self
            .data
            .ok_or_else(|| AnalyzerError::Malformed("ALERT without data".to_string()))?;
        let confidence = match data.confidence {
            Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
            Some(c) => return Err(AnalyzerError::Malformed(format!("confidence {}", c))),
            None => 0.0,
        };

        Ok(MovementVerdict::Anomaly(AnomalyAssessment {
            severity: data.severity,
            reason: data.reason.unwrap_or_else(|| "unusual movement".to_string()),
            confidence,
            kind: data.kind.unwrap_or_else(|| "movement".to_string()),
        }))
    }
}

#[async_trait]
pub trait MovementAnalyzer: Send + Sync {
    async fn analyze(&self, request: &MovementRequest) -> Result<MovementVerdict, AnalyzerError>;
}

pub struct HttpMovementAnalyzer {
    url: String,
    client: reqwest::Client,
}

impl HttpMovementAnalyzer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AnalyzerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnalyzerError::Transport(e.to_string()))?;
        Ok(Self { url: url.into(), client })
    }
}

#[async_trait]
impl MovementAnalyzer for HttpMovementAnalyzer {
    async fn analyze(&self, request: &MovementRequest) -> Result<MovementVerdict, AnalyzerError> {
        let start = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| AnalyzerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalyzerError::Status(status.as_u16()));
        }

        let body: AnalyzerResponse =
            response.json().await.map_err(|e| AnalyzerError::Malformed(e.to_string()))?;
        debug!(
            status = %body.status,
            latency_us = %start.elapsed().as_micros(),
            "analyzer_response"
        );
        body.into_verdict()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<MovementVerdict, AnalyzerError> {
        serde_json::from_str::<AnalyzerResponse>(json).unwrap().into_verdict()
    }

    #[test]
    fn test_ok_is_clear() {
        assert_eq!(parse(r#"{"status":"OK"}"#), Ok(MovementVerdict::Clear));
    }

    #[test]
    fn test_alert_with_data() {
        let verdict = parse(
            r#"{"status":"ALERT","data":{"severity":"HIGH","reason":"sudden stop","confidence":0.92,"type":"STOP"}}"#,
        )
        .unwrap();
        assert_eq!(
            verdict,
            MovementVerdict::Anomaly(AnomalyAssessment {
                severity: Severity::High,
                reason: "sudden stop".to_string(),
                confidence: 0.92,
                kind: "STOP".to_string(),
            })
        );
    }

    #[test]
    fn test_confidence_is_clamped() {
        let verdict =
            parse(r#"{"status":"ALERT","data":{"severity":"LOW","confidence":1.7}}"#).unwrap();
        match verdict {
            MovementVerdict::Anomaly(a) => assert_eq!(a.confidence, 1.0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_alert_without_data_is_malformed() {
        assert!(matches!(parse(r#"{"status":"ALERT"}"#), Err(AnalyzerError::Malformed(_))));
    }

    #[test]
    fn test_unknown_status_is_malformed() {
        assert!(matches!(parse(r#"{"status":"MAYBE"}"#), Err(AnalyzerError::Malformed(_))));
    }

    #[test]
    fn test_request_wire_format() {
        let request = MovementRequest {
            prev_point: TrackPoint { lat: 1.0, lon: 2.0, timestamp: 1000 },
            curr_point: TrackPoint { lat: 1.5, lon: 2.5, timestamp: 31000 },
            zone_risk: 1,
            deviation: 0,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["prev_point"]["lat"], 1.0);
        assert_eq!(json["curr_point"]["timestamp"], 31000);
        assert_eq!(json["zone_risk"], 1);
        assert_eq!(json["deviation"], 0);
    }
}
