//! Monitoring session: one task driving fixes, timers and in-flight work
//!
//! All session state (sampler, classifier, held assessment) is mutated only
//! inside the session loop. Network calls run in a session-owned `JoinSet`
//! and their results come back through `join_next`, so fixes keep flowing
//! while a dispatch or poll is outstanding.
//!
//! Teardown order: cancel the subscription, drop both timers, then finish
//! in-flight work. A stop request aborts it; the end of the location stream
//! lets it complete so its outcome is still reported. The event sender is
//! dropped last, so no event is ever observed after teardown.

use crate::domain::types::{AlertKind, AlertRecord, AnomalyAssessment, Position, SafeZone, ZoneState};
use crate::infra::config::Config;
use crate::infra::metrics::{MetricsSummary, MonitorMetrics};
use crate::io::analyzer::{AnalyzerError, MovementAnalyzer, MovementVerdict};
use crate::io::feedback::{cue, Feedback, LogFeedback, ANOMALY_PATTERN, BOUNDARY_PATTERN};
use crate::io::location::{LocationError, LocationSource, RawFix, Subscription, WatchOptions};
use crate::services::classifier::ZoneClassifier;
use crate::services::dispatcher::{AlertDispatcher, DispatchError};
use crate::services::poller::{AnomalyHook, AnomalyPoller, AssessmentChange, LogAnomalyHook};
use crate::services::sampler::{Coordinate, PositionSampler, SampleOutcome, DEFAULT_HISTORY_CAPACITY};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{Id, JoinError, JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const DEFAULT_EVENT_BUFFER: usize = 256;
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Per-session knobs, usually derived from `Config`
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub watch: WatchOptions,
    pub history_capacity: usize,
    /// `None` disables anomaly polling
    pub poll_interval: Option<Duration>,
    pub heartbeat_interval: Duration,
    /// Recipient of boundary-exit alerts
    pub trip_phone: Option<String>,
    pub event_buffer: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            watch: WatchOptions::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            poll_interval: Some(Duration::from_secs(30)),
            heartbeat_interval: Duration::from_secs(300),
            trip_phone: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl SessionSettings {
    /// Poll period actually used: zero means polling is off
    fn effective_poll_interval(&self) -> Option<Duration> {
        self.poll_interval.filter(|period| !period.is_zero())
    }

    fn effective_heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL)
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            watch: WatchOptions { high_accuracy: config.high_accuracy(), max_age: config.max_age() },
            history_capacity: config.history_capacity(),
            poll_interval: config.anomaly_enabled().then(|| config.anomaly_interval()),
            heartbeat_interval: config.heartbeat_interval(),
            trip_phone: config.trip_phone().map(str::to_string),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// Notable things that happened during a session, in the order they
/// happened
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    ZoneChanged { previous: ZoneState, state: ZoneState, distance_m: f64 },
    AlertDispatched { record: AlertRecord },
    AlertFailed { kind: AlertKind, error: DispatchError },
    AnomalyRaised(AnomalyAssessment),
    AnomalyCleared,
    PollFailed(AnalyzerError),
    LocationError(LocationError),
    /// Source finished; always the last event of such a session
    LocationStreamEnded,
}

/// What a session leaves behind
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub final_state: ZoneState,
    /// Accepted positions, oldest first
    pub history: Vec<Position>,
    pub metrics: MetricsSummary,
}

/// Result of one unit of in-flight work
enum TaskOutput {
    Boundary(Result<AlertRecord, DispatchError>),
    Poll { result: Result<MovementVerdict, AnalyzerError>, position: Position },
    Hook,
}

pub struct MonitorSession {
    zone: SafeZone,
    settings: SessionSettings,
    source: Box<dyn LocationSource>,
    dispatcher: Arc<AlertDispatcher>,
    analyzer: Option<Arc<dyn MovementAnalyzer>>,
    feedback: Arc<dyn Feedback>,
    hook: Arc<dyn AnomalyHook>,
    metrics: Arc<MonitorMetrics>,
}

impl MonitorSession {
    pub fn new(
        zone: SafeZone,
        settings: SessionSettings,
        source: Box<dyn LocationSource>,
        dispatcher: Arc<AlertDispatcher>,
    ) -> Self {
        Self {
            zone,
            settings,
            source,
            dispatcher,
            analyzer: None,
            feedback: Arc::new(LogFeedback),
            hook: Arc::new(LogAnomalyHook),
            metrics: Arc::new(MonitorMetrics::new()),
        }
    }

    /// Enable anomaly polling against this analyzer
    pub fn with_analyzer(mut self, analyzer: Arc<dyn MovementAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_feedback(mut self, feedback: Arc<dyn Feedback>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn with_anomaly_hook(mut self, hook: Arc<dyn AnomalyHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MonitorMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Subscribe to the location source and spawn the session loop.
    /// Must be called from within a tokio runtime.
    pub fn start(mut self) -> MonitorHandle {
        let subscription = self.source.subscribe(self.settings.watch);
        let sampler = PositionSampler::new(self.settings.history_capacity, self.settings.watch.max_age);
        let poller = AnomalyPoller::new(self.zone);

        let (events_tx, events_rx) = mpsc::channel(self.settings.event_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(ZoneState::Unknown);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let live_feed = sampler.live_feed();
        let assessment = poller.subscribe();

        let poll_interval = self.analyzer.as_ref().and(self.settings.effective_poll_interval());
        let heartbeat_interval = self.settings.effective_heartbeat_interval();
        info!(
            center_lat = %self.zone.center_latitude(),
            center_lon = %self.zone.center_longitude(),
            radius_m = %self.zone.radius_meters(),
            polling = %poll_interval.is_some(),
            "monitor_session_started"
        );

        let session_loop = SessionLoop {
            sampler,
            classifier: ZoneClassifier::new(self.zone),
            poller,
            dispatcher: self.dispatcher,
            analyzer: self.analyzer,
            feedback: self.feedback,
            hook: self.hook,
            metrics: self.metrics,
            trip_phone: self.settings.trip_phone,
            events: events_tx,
            state_tx,
            inflight: JoinSet::new(),
            poll_task: None,
        };
        let task = tokio::spawn(session_loop.run(
            subscription,
            shutdown_rx,
            poll_interval,
            heartbeat_interval,
        ));

        MonitorHandle { events: events_rx, zone_state: state_rx, assessment, live_feed, shutdown_tx, task }
    }
}

/// Caller's side of a running session
pub struct MonitorHandle {
    events: mpsc::Receiver<MonitorEvent>,
    zone_state: watch::Receiver<ZoneState>,
    assessment: watch::Receiver<Option<AnomalyAssessment>>,
    live_feed: watch::Receiver<Option<Coordinate>>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<SessionReport>,
}

impl MonitorHandle {
    /// Next event, or `None` once the session has torn down
    pub async fn next_event(&mut self) -> Option<MonitorEvent> {
        self.events.recv().await
    }

    /// Already-queued event, without waiting
    pub fn try_next_event(&mut self) -> Option<MonitorEvent> {
        self.events.try_recv().ok()
    }

    pub fn zone_state(&self) -> ZoneState {
        *self.zone_state.borrow()
    }

    pub fn current_assessment(&self) -> Option<AnomalyAssessment> {
        self.assessment.borrow().clone()
    }

    pub fn live_feed(&self) -> watch::Receiver<Option<Coordinate>> {
        self.live_feed.clone()
    }

    /// Request teardown and wait for it. Safe after the session already
    /// ended on its own.
    pub async fn stop(self) -> Result<SessionReport, JoinError> {
        let _ = self.shutdown_tx.send(true);
        self.task.await
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn session_timer(period: Duration) -> Interval {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// Log a failed boundary dispatch (cold path)
#[cold]
fn log_boundary_failed(e: &DispatchError) {
    error!(error = %e, "boundary_alert_not_sent");
}

struct SessionLoop {
    sampler: PositionSampler,
    classifier: ZoneClassifier,
    poller: AnomalyPoller,
    dispatcher: Arc<AlertDispatcher>,
    analyzer: Option<Arc<dyn MovementAnalyzer>>,
    feedback: Arc<dyn Feedback>,
    hook: Arc<dyn AnomalyHook>,
    metrics: Arc<MonitorMetrics>,
    trip_phone: Option<String>,
    events: mpsc::Sender<MonitorEvent>,
    state_tx: watch::Sender<ZoneState>,
    inflight: JoinSet<TaskOutput>,
    /// Outstanding poll; at most one at a time
    poll_task: Option<Id>,
}

impl SessionLoop {
    async fn run(
        mut self,
        mut subscription: Subscription,
        mut shutdown: watch::Receiver<bool>,
        poll_interval: Option<Duration>,
        heartbeat_interval: Duration,
    ) -> SessionReport {
        let mut poll_timer = poll_interval.map(session_timer);
        let mut heartbeat = session_timer(heartbeat_interval);

        let stream_ended = loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    // Handle dropped counts as a stop request
                    if changed.is_err() || *shutdown.borrow() {
                        break false;
                    }
                }
                update = subscription.recv() => {
                    match update {
                        Some(Ok(fix)) => self.on_fix(fix),
                        Some(Err(e)) => self.on_location_error(e),
                        None => break true,
                    }
                }
                Some(joined) = self.inflight.join_next_with_id(), if !self.inflight.is_empty() => {
                    self.on_task_done(joined);
                }
                _ = next_tick(&mut poll_timer) => {
                    self.on_poll_tick();
                }
                _ = heartbeat.tick() => {
                    self.on_heartbeat();
                }
            }
        };

        subscription.cancel();
        drop(poll_timer);
        drop(heartbeat);

        if stream_ended {
            info!(inflight = %self.inflight.len(), "location_stream_ended");
            self.drain(&mut shutdown).await;
            self.emit(MonitorEvent::LocationStreamEnded);
        } else {
            info!(inflight = %self.inflight.len(), "monitor_session_stopping");
            self.inflight.shutdown().await;
        }

        let metrics = self.metrics.summary();
        metrics.log();
        info!(final_state = %self.classifier.state(), "monitor_session_ended");
        SessionReport {
            final_state: self.classifier.state(),
            history: self.sampler.history().iter().copied().collect(),
            metrics,
        }
    }

    /// Let outstanding work finish unless a stop arrives meanwhile
    async fn drain(&mut self, shutdown: &mut watch::Receiver<bool>) {
        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    self.inflight.shutdown().await;
                    return;
                }
                joined = self.inflight.join_next_with_id() => {
                    match joined {
                        Some(joined) => self.on_task_done(joined),
                        None => return,
                    }
                }
            }
        }
    }

    fn emit(&self, event: MonitorEvent) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.events.try_send(event) {
            warn!(event = ?event, "monitor_event_dropped");
        }
    }

    fn on_fix(&mut self, fix: RawFix) {
        match self.sampler.ingest(fix, Utc::now()) {
            SampleOutcome::Accepted(position) => {
                self.metrics.record_fix_accepted();
                self.classify(position);
            }
            SampleOutcome::Stale { .. } => self.metrics.record_fix_stale(),
            SampleOutcome::Invalid => {
                self.metrics.record_location_error();
                self.emit(MonitorEvent::LocationError(LocationError::Malformed(format!(
                    "coordinates out of range: {}, {}",
                    fix.latitude, fix.longitude
                ))));
            }
        }
    }

    fn on_location_error(&mut self, e: LocationError) {
        // Non-fatal: the platform keeps watching and so do we
        warn!(error = %e, "location_error");
        self.metrics.record_location_error();
        self.emit(MonitorEvent::LocationError(e));
    }

    fn classify(&mut self, position: Position) {
        let c = self.classifier.classify(&position);

        if c.changed() {
            self.state_tx.send_replace(c.state);
            self.emit(MonitorEvent::ZoneChanged {
                previous: c.previous,
                state: c.state,
                distance_m: c.distance_m,
            });
        }
        if c.exited {
            self.metrics.record_boundary_exit();
            let dispatcher = self.dispatcher.clone();
            let phone = self.trip_phone.clone();
            self.inflight.spawn(async move {
                TaskOutput::Boundary(dispatcher.send_boundary_exit_alert(phone.as_deref()).await)
            });
        }
        if c.wants_feedback() {
            cue(self.feedback.as_ref(), BOUNDARY_PATTERN);
        }
    }

    fn on_poll_tick(&mut self) {
        if self.poll_task.is_some() {
            debug!("anomaly_poll_skipped_in_flight");
            return;
        }
        let Some(analyzer) = self.analyzer.clone() else {
            return;
        };
        let Some(request) = self.poller.prepare(self.sampler.pair()) else {
            return;
        };
        let Some(position) = self.sampler.pair().current().copied() else {
            return;
        };

        debug!(zone_risk = %request.zone_risk, deviation = %request.deviation, "anomaly_poll_started");
        let handle = self.inflight.spawn(async move {
            let result = analyzer.analyze(&request).await;
            TaskOutput::Poll { result, position }
        });
        self.poll_task = Some(handle.id());
    }

    fn on_heartbeat(&self) {
        info!(
            zone_state = %self.classifier.state(),
            history_len = %self.sampler.history().len(),
            inflight = %self.inflight.len(),
            "monitor_heartbeat"
        );
        self.metrics.summary().log();
    }

    fn on_task_done(&mut self, joined: Result<(Id, TaskOutput), JoinError>) {
        let (id, output) = match joined {
            Ok(done) => done,
            Err(e) => {
                if self.poll_task == Some(e.id()) {
                    self.poll_task = None;
                }
                if e.is_panic() {
                    error!(error = %e, "session_task_panicked");
                }
                return;
            }
        };

        match output {
            TaskOutput::Boundary(Ok(record)) => {
                let sent = record.sent_count() as u64;
                self.metrics.record_dispatch(sent, record.results.len() as u64 - sent);
                info!(alert_id = %record.id, summary = %record.summary(), "boundary_alert_result");
                self.emit(MonitorEvent::AlertDispatched { record });
            }
            TaskOutput::Boundary(Err(e)) => {
                log_boundary_failed(&e);
                self.emit(MonitorEvent::AlertFailed { kind: AlertKind::BoundaryExit, error: e });
            }
            TaskOutput::Poll { result, position } => {
                if self.poll_task == Some(id) {
                    self.poll_task = None;
                }
                self.metrics.record_poll(result.is_ok());
                self.on_poll_result(result, position);
            }
            TaskOutput::Hook => {}
        }
    }

    fn on_poll_result(&mut self, result: Result<MovementVerdict, AnalyzerError>, position: Position) {
        let change = self.poller.apply(result);
        let high = change.is_high_severity();
        match change {
            AssessmentChange::Raised(assessment) => {
                self.metrics.record_anomaly();
                cue(self.feedback.as_ref(), ANOMALY_PATTERN);
                if high {
                    let hook = self.hook.clone();
                    let hooked = assessment.clone();
                    self.inflight.spawn(async move {
                        hook.on_high_severity_anomaly(&hooked, &position).await;
                        TaskOutput::Hook
                    });
                }
                self.emit(MonitorEvent::AnomalyRaised(assessment));
            }
            AssessmentChange::Cleared => self.emit(MonitorEvent::AnomalyCleared),
            AssessmentChange::Unchanged => {}
            AssessmentChange::Failed(e) => self.emit(MonitorEvent::PollFailed(e)),
        }
    }
}
