//! Position sampling: normalization, staleness filter, rolling history and
//! the previous/current register read by the anomaly poller

use crate::domain::types::Position;
use crate::io::location::RawFix;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Default rolling history length
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Raw coordinate pushed to live-map consumers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Bounded FIFO of accepted positions, oldest evicted first
#[derive(Debug, Clone)]
pub struct History {
    buf: VecDeque<Position>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { buf: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, position: Position) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(position);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.buf.iter()
    }

    pub fn latest(&self) -> Option<&Position> {
        self.buf.back()
    }
}

/// Two-slot register; both slots always move together in `rotate`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PositionPair {
    previous: Option<Position>,
    current: Option<Position>,
}

impl PositionPair {
    pub fn rotate(&mut self, next: Position) {
        *self = Self { previous: self.current, current: Some(next) };
    }

    pub fn previous(&self) -> Option<&Position> {
        self.previous.as_ref()
    }

    pub fn current(&self) -> Option<&Position> {
        self.current.as_ref()
    }

    /// `(previous, current)` once two fixes have been seen
    pub fn both(&self) -> Option<(Position, Position)> {
        Some((self.previous?, self.current?))
    }
}

/// What happened to one raw fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    Accepted(Position),
    Stale { age: Duration },
    Invalid,
}

pub struct PositionSampler {
    history: History,
    pair: PositionPair,
    max_age: Option<Duration>,
    live_tx: watch::Sender<Option<Coordinate>>,
}

impl PositionSampler {
    pub fn new(history_capacity: usize, max_age: Option<Duration>) -> Self {
        let (live_tx, _) = watch::channel(None);
        Self { history: History::new(history_capacity), pair: PositionPair::default(), max_age, live_tx }
    }

    /// Live coordinate feed for map displays; no acknowledgement expected
    pub fn live_feed(&self) -> watch::Receiver<Option<Coordinate>> {
        self.live_tx.subscribe()
    }

    /// Normalize one fix and update history, register and live feed
    pub fn ingest(&mut self, fix: RawFix, now: DateTime<Utc>) -> SampleOutcome {
        let lat_ok = fix.latitude.is_finite() && (-90.0..=90.0).contains(&fix.latitude);
        let lon_ok = fix.longitude.is_finite() && (-180.0..=180.0).contains(&fix.longitude);
        if !(lat_ok && lon_ok) {
            warn!(lat = %fix.latitude, lon = %fix.longitude, "position_invalid");
            return SampleOutcome::Invalid;
        }

        let captured_at = fix.timestamp.unwrap_or(now);
        if let Some(max_age) = self.max_age {
            // Fixes stamped slightly in the future (clock skew) count as fresh
            let age = (now - captured_at).to_std().unwrap_or(Duration::ZERO);
            if age > max_age {
                debug!(age_ms = %age.as_millis(), max_age_ms = %max_age.as_millis(), "position_stale");
                return SampleOutcome::Stale { age };
            }
        }

        let position = Position::new(fix.latitude, fix.longitude, captured_at);
        self.history.push(position);
        self.pair.rotate(position);
        self.live_tx.send_replace(Some(Coordinate { latitude: fix.latitude, longitude: fix.longitude }));
        SampleOutcome::Accepted(position)
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn pair(&self) -> &PositionPair {
        &self.pair
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_history_caps_at_capacity() {
        let mut history = History::new(100);
        for i in 0..150 {
            history.push(Position::new(i as f64 * 0.001, 0.0, at(i)));
            assert!(history.len() <= 100);
        }
        assert_eq!(history.len(), 100);

        let kept: Vec<i64> = history.iter().map(|p| p.captured_at.timestamp() - 1_700_000_000).collect();
        let expected: Vec<i64> = (50..150).collect();
        assert_eq!(kept, expected);
        assert_eq!(history.latest().unwrap().captured_at, at(149));
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let mut history = History::new(0);
        history.push(Position::new(0.0, 0.0, at(0)));
        history.push(Position::new(1.0, 0.0, at(1)));
        assert_eq!(history.len(), 1);
        assert_eq!(history.capacity(), 1);
    }

    #[test]
    fn test_pair_rotates_together() {
        let mut pair = PositionPair::default();
        assert!(pair.both().is_none());

        let a = Position::new(1.0, 1.0, at(0));
        let b = Position::new(2.0, 2.0, at(1));
        let c = Position::new(3.0, 3.0, at(2));

        pair.rotate(a);
        assert_eq!(pair.current(), Some(&a));
        assert!(pair.previous().is_none());
        assert!(pair.both().is_none());

        pair.rotate(b);
        assert_eq!(pair.both(), Some((a, b)));

        pair.rotate(c);
        assert_eq!(pair.both(), Some((b, c)));
    }

    #[test]
    fn test_ingest_accepts_and_notifies_live_feed() {
        let mut sampler = PositionSampler::new(DEFAULT_HISTORY_CAPACITY, Some(Duration::from_secs(10)));
        let feed = sampler.live_feed();

        let outcome = sampler.ingest(RawFix::new(15.5, 73.8), at(0));
        assert_eq!(outcome, SampleOutcome::Accepted(Position::new(15.5, 73.8, at(0))));
        assert_eq!(sampler.history().len(), 1);
        assert_eq!(*feed.borrow(), Some(Coordinate { latitude: 15.5, longitude: 73.8 }));
    }

    #[test]
    fn test_ingest_rejects_stale() {
        let mut sampler = PositionSampler::new(DEFAULT_HISTORY_CAPACITY, Some(Duration::from_secs(10)));

        let outcome = sampler.ingest(RawFix::captured_at(1.0, 1.0, at(0)), at(30));
        assert_eq!(outcome, SampleOutcome::Stale { age: Duration::from_secs(30) });
        assert!(sampler.history().is_empty());
        assert!(sampler.pair().current().is_none());

        // Within tolerance
        let outcome = sampler.ingest(RawFix::captured_at(1.0, 1.0, at(25)), at(30));
        assert!(matches!(outcome, SampleOutcome::Accepted(_)));
    }

    #[test]
    fn test_ingest_without_tolerance_accepts_old_fixes() {
        let mut sampler = PositionSampler::new(DEFAULT_HISTORY_CAPACITY, None);
        let outcome = sampler.ingest(RawFix::captured_at(1.0, 1.0, at(0)), at(3600));
        assert!(matches!(outcome, SampleOutcome::Accepted(_)));
    }

    #[test]
    fn test_ingest_future_timestamp_is_fresh() {
        let mut sampler = PositionSampler::new(DEFAULT_HISTORY_CAPACITY, Some(Duration::from_secs(1)));
        let outcome = sampler.ingest(RawFix::captured_at(1.0, 1.0, at(5)), at(0));
        assert!(matches!(outcome, SampleOutcome::Accepted(_)));
    }

    #[test]
    fn test_ingest_rejects_invalid_coordinates() {
        let mut sampler = PositionSampler::new(DEFAULT_HISTORY_CAPACITY, None);
        assert_eq!(sampler.ingest(RawFix::new(f64::NAN, 0.0), at(0)), SampleOutcome::Invalid);
        assert_eq!(sampler.ingest(RawFix::new(0.0, 200.0), at(0)), SampleOutcome::Invalid);
        assert!(sampler.history().is_empty());
    }
}
