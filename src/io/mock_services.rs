//! Local stand-ins for the notification relay, the movement-analysis service
//! and the reverse geocoder
//!
//! Endpoints:
//! - `POST /api/send-sms` - relay contract, `{to, message}` -> `{ok, error?}`
//! - `POST /api/analyze` - analyzer contract, scripted or rule-based verdicts
//! - `GET /reverse` - Nominatim-shaped reverse lookup
//! - `GET /api/sent` - messages accepted so far
//! - `GET /health`
//!
//! Uses hyper for the HTTP server.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// One message accepted by the relay stand-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentSms {
    pub to: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct AnalyzeBody {
    #[serde(default)]
    zone_risk: u8,
    #[serde(default)]
    deviation: u8,
}

/// Shared behavior and recordings of the mock server
#[derive(Default)]
pub struct MockServices {
    failing_numbers: HashSet<String>,
    required_token: Option<String>,
    sent: Mutex<Vec<SentSms>>,
    analyzer_script: Mutex<VecDeque<Value>>,
    analyze_requests: Mutex<Vec<Value>>,
}

impl MockServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relay answers `{ok: false}` for these numbers (after normalization)
    pub fn with_failing_numbers<I, S>(mut self, numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing_numbers = numbers.into_iter().map(Into::into).collect();
        self
    }

    /// Reject sends whose bearer token differs
    pub fn with_required_token(mut self, token: impl Into<String>) -> Self {
        self.required_token = Some(token.into());
        self
    }

    /// Queue a raw analyzer response body; queued bodies are served before
    /// the built-in rules
    pub fn script_analysis(&self, response: Value) {
        self.analyzer_script.lock().push_back(response);
    }

    pub fn sent(&self) -> Vec<SentSms> {
        self.sent.lock().clone()
    }

    pub fn analyze_requests(&self) -> Vec<Value> {
        self.analyze_requests.lock().clone()
    }

    fn send_sms(&self, auth: Option<&str>, body: &[u8]) -> (StatusCode, Value) {
        if let Some(required) = &self.required_token {
            let presented = auth.and_then(|a| a.strip_prefix("Bearer "));
            if presented != Some(required.as_str()) {
                warn!("mock_relay_unauthorized");
                return (StatusCode::UNAUTHORIZED, json!({"ok": false, "error": "unauthorized"}));
            }
        }

        let sms: SentSms = match serde_json::from_slice(body) {
            Ok(sms) => sms,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, json!({"ok": false, "error": format!("invalid body: {}", e)}))
            }
        };

        if self.failing_numbers.contains(&sms.to) {
            info!(to = %sms.to, "mock_relay_rejected");
            return (StatusCode::BAD_REQUEST, json!({"ok": false, "error": "number is not reachable"}));
        }

        info!(to = %sms.to, chars = %sms.message.chars().count(), "mock_relay_sent");
        self.sent.lock().push(sms);
        (StatusCode::OK, json!({"ok": true}))
    }

    fn analyze(&self, body: &[u8]) -> (StatusCode, Value) {
        let raw: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => return (StatusCode::BAD_REQUEST, json!({"error": format!("invalid body: {}", e)})),
        };
        self.analyze_requests.lock().push(raw.clone());

        if let Some(scripted) = self.analyzer_script.lock().pop_front() {
            return (StatusCode::OK, scripted);
        }

        let request: AnalyzeBody = serde_json::from_value(raw).unwrap_or(AnalyzeBody { zone_risk: 0, deviation: 0 });
        let verdict = match (request.zone_risk, request.deviation) {
            (1, 1) => json!({
                "status": "ALERT",
                "data": {"severity": "HIGH", "reason": "moving away outside the safe zone", "confidence": 0.9, "type": "DEVIATION"}
            }),
            (1, _) => json!({
                "status": "ALERT",
                "data": {"severity": "MEDIUM", "reason": "outside the safe zone", "confidence": 0.6, "type": "ZONE"}
            }),
            _ => json!({"status": "OK"}),
        };
        debug!(verdict = %verdict["status"], "mock_analyzer_verdict");
        (StatusCode::OK, verdict)
    }

    fn reverse(&self, query: Option<&str>) -> (StatusCode, Value) {
        let mut lat = None;
        let mut lon = None;
        for pair in query.unwrap_or_default().split('&') {
            match pair.split_once('=') {
                Some(("lat", v)) => lat = v.parse::<f64>().ok(),
                Some(("lon", v)) => lon = v.parse::<f64>().ok(),
                _ => {}
            }
        }
        match (lat, lon) {
            (Some(lat), Some(lon)) => (
                StatusCode::OK,
                json!({
                    "display_name": format!("Mock Place near {:.4}, {:.4}, Mocktown, Test State, India", lat, lon),
                    "address": {"city": "Mocktown", "state": "Test State", "country": "India"}
                }),
            ),
            _ => (StatusCode::BAD_REQUEST, json!({"error": "lat and lon are required"})),
        }
    }
}

fn json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    services: Arc<MockServices>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let auth = req.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok()).map(str::to_string);

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return Ok(json_response(StatusCode::BAD_REQUEST, &json!({"error": e.to_string()})));
        }
    };

    let (status, value) = match (&method, path.as_str()) {
        (&Method::POST, "/api/send-sms") => services.send_sms(auth.as_deref(), &body),
        (&Method::POST, "/api/analyze") => services.analyze(&body),
        (&Method::GET, "/reverse") => services.reverse(query.as_deref()),
        (&Method::GET, "/api/sent") => (StatusCode::OK, json!(services.sent())),
        (&Method::GET, "/health") => (StatusCode::OK, json!({"ok": true})),
        _ => (StatusCode::NOT_FOUND, json!({"error": "not found"})),
    };
    Ok(json_response(status, &value))
}

/// Serve on an already-bound listener until shutdown
pub async fn serve_mock_services(
    listener: TcpListener,
    services: Arc<MockServices>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!(addr = %listener.local_addr()?, "mock_services_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let services = services.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let services = services.clone();
                                async move { handle_request(req, services).await }
                            });

                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                error!(error = %e, "mock_services_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "mock_services_accept_error");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("mock_services_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
