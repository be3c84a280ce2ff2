//! Location sources and cancellable subscriptions
//!
//! A source is subscribed once per monitoring session. The returned
//! `Subscription` yields fixes (or location errors) in delivery order and
//! stops yielding the moment it is cancelled or dropped.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Buffered fixes between a producer and the session loop
const SUBSCRIPTION_BUFFER: usize = 64;

/// Raw fix as delivered by the platform, before normalization
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawFix {
    pub latitude: f64,
    pub longitude: f64,
    /// When the platform captured the fix; `None` means "now"
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawFix {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude, timestamp: None }
    }

    pub fn captured_at(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self { latitude, longitude, timestamp: Some(timestamp) }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    Unavailable(String),
    #[error("timed out waiting for a position")]
    Timeout,
    #[error("malformed fix: {0}")]
    Malformed(String),
}

pub type LocationUpdate = Result<RawFix, LocationError>;

/// Platform watch options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    /// Oldest cached fix the platform may hand back
    pub max_age: Option<Duration>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self { high_accuracy: true, max_age: Some(Duration::from_secs(10)) }
    }
}

/// Continuous location stream
pub trait LocationSource: Send {
    fn subscribe(&mut self, options: WatchOptions) -> Subscription;
}

/// Handle to an active location watch
pub struct Subscription {
    rx: mpsc::Receiver<LocationUpdate>,
    producer: Option<JoinHandle<()>>,
    cancelled: bool,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<LocationUpdate>, producer: Option<JoinHandle<()>>) -> Self {
        Self { rx, producer, cancelled: false }
    }

    /// Subscription that never yields anything
    pub fn closed() -> Self {
        let (_tx, rx) = mpsc::channel(1);
        Self { rx, producer: None, cancelled: true }
    }

    /// Next update, or `None` once the stream ended or was cancelled
    pub async fn recv(&mut self) -> Option<LocationUpdate> {
        if self.cancelled {
            return None;
        }
        self.rx.recv().await
    }

    /// Stop delivery. Buffered fixes are discarded.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.rx.close();
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
        debug!("location_subscription_cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Source fed by an in-process channel (embedding hosts and tests)
pub struct ChannelLocationSource {
    rx: Option<mpsc::Receiver<LocationUpdate>>,
}

impl ChannelLocationSource {
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<LocationUpdate>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { rx: Some(rx) }, tx)
    }
}

impl LocationSource for ChannelLocationSource {
    fn subscribe(&mut self, _options: WatchOptions) -> Subscription {
        match self.rx.take() {
            Some(rx) => Subscription::new(rx, None),
            None => {
                warn!("channel_location_source_already_subscribed");
                Subscription::closed()
            }
        }
    }
}

/// Replays fixes from a line-oriented reader (file or stdin)
///
/// Accepted line formats:
/// - `lat,lon`
/// - `{"latitude": .., "longitude": .., "timestamp": "<rfc3339>"}` (also `lat`/`lon`)
/// - `error: <reason>` emits a location error
/// - blank lines and lines starting with `#` are skipped
pub struct LineLocationSource {
    reader: Option<Box<dyn AsyncBufRead + Unpin + Send>>,
    interval: Duration,
}

impl LineLocationSource {
    pub fn new(reader: Box<dyn AsyncBufRead + Unpin + Send>, interval: Duration) -> Self {
        Self { reader: Some(reader), interval }
    }

    async fn replay(
        mut reader: Box<dyn AsyncBufRead + Unpin + Send>,
        tx: mpsc::Sender<LocationUpdate>,
        interval: Duration,
    ) {
        let mut line = String::new();
        let mut delivered = 0u64;
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    let _ = tx.send(Err(LocationError::Unavailable(e.to_string()))).await;
                    break;
                }
            }

            let Some(update) = parse_fix_line(&line) else {
                continue;
            };

            if delivered > 0 && !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            if tx.send(update).await.is_err() {
                return;
            }
            delivered += 1;
        }
        info!(delivered = %delivered, "location_replay_finished");
    }
}

impl LocationSource for LineLocationSource {
    fn subscribe(&mut self, options: WatchOptions) -> Subscription {
        let Some(reader) = self.reader.take() else {
            warn!("line_location_source_already_subscribed");
            return Subscription::closed();
        };

        debug!(high_accuracy = %options.high_accuracy, "location_replay_started");
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let producer = tokio::spawn(Self::replay(reader, tx, self.interval));
        Subscription::new(rx, Some(producer))
    }
}

#[derive(Debug, Deserialize)]
struct JsonFix {
    #[serde(alias = "lat")]
    latitude: f64,
    #[serde(alias = "lon", alias = "lng")]
    longitude: f64,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

/// Parse one replay line. `None` for lines that carry nothing.
pub fn parse_fix_line(line: &str) -> Option<LocationUpdate> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    if let Some(reason) = line.strip_prefix("error:") {
        let reason = reason.trim();
        let err = if reason.eq_ignore_ascii_case("permission denied") {
            LocationError::PermissionDenied
        } else if reason.eq_ignore_ascii_case("timeout") {
            LocationError::Timeout
        } else {
            LocationError::Unavailable(reason.to_string())
        };
        return Some(Err(err));
    }

    if line.starts_with('{') {
        return Some(
            serde_json::from_str::<JsonFix>(line)
                .map(|f| RawFix { latitude: f.latitude, longitude: f.longitude, timestamp: f.timestamp })
                .map_err(|e| LocationError::Malformed(e.to_string())),
        );
    }

    let mut parts = line.split(',').map(str::trim);
    let fix = match (parts.next(), parts.next(), parts.next()) {
        (Some(lat), Some(lon), None) => match (lat.parse::<f64>(), lon.parse::<f64>()) {
            (Ok(lat), Ok(lon)) => Ok(RawFix::new(lat, lon)),
            _ => Err(LocationError::Malformed(line.to_string())),
        },
        _ => Err(LocationError::Malformed(line.to_string())),
    };
    Some(fix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[test]
    fn test_parse_csv_line() {
        assert_eq!(parse_fix_line("28.61, 77.20\n"), Some(Ok(RawFix::new(28.61, 77.20))));
    }

    #[test]
    fn test_parse_json_line() {
        let update = parse_fix_line(r#"{"lat": 15.5, "lon": 73.8, "timestamp": "2026-01-02T03:04:05Z"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(update.latitude, 15.5);
        assert_eq!(update.longitude, 73.8);
        assert_eq!(update.timestamp.unwrap().to_rfc3339(), "2026-01-02T03:04:05+00:00");
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        assert_eq!(parse_fix_line("   "), None);
        assert_eq!(parse_fix_line("# teleport to London"), None);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_fix_line("error: permission denied"),
            Some(Err(LocationError::PermissionDenied))
        );
        assert_eq!(
            parse_fix_line("error: signal lost"),
            Some(Err(LocationError::Unavailable("signal lost".to_string())))
        );
        assert!(matches!(parse_fix_line("1,2,3"), Some(Err(LocationError::Malformed(_)))));
        assert!(matches!(parse_fix_line("north,south"), Some(Err(LocationError::Malformed(_)))));
    }

    #[tokio::test]
    async fn test_line_source_replays_in_order() {
        let input = "# start\n0.0,0.0\nerror: signal lost\n51.5074,-0.1278\n";
        let reader = Box::new(BufReader::new(input.as_bytes()));
        let mut source = LineLocationSource::new(reader, Duration::ZERO);
        let mut sub = source.subscribe(WatchOptions::default());

        assert_eq!(sub.recv().await, Some(Ok(RawFix::new(0.0, 0.0))));
        assert!(matches!(sub.recv().await, Some(Err(LocationError::Unavailable(_)))));
        assert_eq!(sub.recv().await, Some(Ok(RawFix::new(51.5074, -0.1278))));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_cancel_stops_delivery() {
        let (mut source, tx) = ChannelLocationSource::new(8);
        let mut sub = source.subscribe(WatchOptions::default());

        tx.send(Ok(RawFix::new(1.0, 1.0))).await.unwrap();
        sub.cancel();
        assert!(sub.is_cancelled());
        assert_eq!(sub.recv().await, None);
        assert!(tx.send(Ok(RawFix::new(2.0, 2.0))).await.is_err());
    }

    #[tokio::test]
    async fn test_second_subscribe_is_closed() {
        let (mut source, _tx) = ChannelLocationSource::new(8);
        let _first = source.subscribe(WatchOptions::default());
        let mut second = source.subscribe(WatchOptions::default());
        assert_eq!(second.recv().await, None);
    }
}
