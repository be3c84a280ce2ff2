//! safezone-monitor - geofence monitoring and alerting for travellers
//!
//! Watches a stream of location fixes against a circular safe zone, alerts the
//! trip's phone when it is left, polls a movement-analysis service for
//! anomalies, and sends SOS broadcasts to emergency contacts.
//!
//! Module structure:
//! - `domain/` - Core types (Position, SafeZone, AlertRecord) and geodesy
//! - `io/` - External interfaces (location, relay, analyzer, geocoder, haptics)
//! - `services/` - Monitoring logic (sampler, classifier, poller, dispatcher, session)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::{Parser, Subcommand};
use safezone_monitor::domain::geo::format_coords;
use safezone_monitor::domain::types::{DispatchOutcome, Position, SafeZone};
use safezone_monitor::infra::Config;
use safezone_monitor::io::{
    CredentialProvider, EnvCredentials, FileCredentials, HttpMovementAnalyzer, HttpNotificationRelay,
    LineLocationSource, LogFeedback, NominatimGeocoder, ReverseGeocoder,
};
use safezone_monitor::io::feedback::{cue, SOS_PATTERN};
use safezone_monitor::services::{
    AlertDispatcher, MonitorEvent, MonitorSession, SessionSettings, ZoneClassifier,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Safe-zone monitor - boundary alerts, anomaly polling and SOS
#[derive(Parser, Debug)]
#[command(name = "safezone-monitor", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monitor fixes from a file (or stdin) until Ctrl+C or end of input
    Monitor {
        /// File with one fix per line (`lat,lon` or JSON); stdin when omitted
        #[arg(long)]
        fixes: Option<PathBuf>,
    },
    /// Send an SOS broadcast to every configured contact
    #[command(allow_negative_numbers = true)]
    Sos {
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lon: f64,
        /// Skip the reverse-geocoded address line
        #[arg(long)]
        no_geocode: bool,
    },
    /// Distance from the zone center and the resulting classification
    #[command(allow_negative_numbers = true)]
    Distance {
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lon: f64,
    },
}

fn init_tracing(json: bool) {
    // Default: INFO, use RUST_LOG=debug for per-fix visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "safezone-monitor starting");

    let config = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(&[]),
    };
    info!(
        config_file = %config.config_file(),
        trip = %config.trip_name(),
        radius_m = %config.zone_radius_m(),
        contacts = %config.contacts().len(),
        relay_url = %config.relay_url(),
        anomaly_enabled = %config.anomaly_enabled(),
        "config_loaded"
    );

    match args.command {
        Command::Monitor { fixes } => run_monitor(&config, fixes).await,
        Command::Sos { lat, lon, no_geocode } => run_sos(&config, lat, lon, no_geocode).await,
        Command::Distance { lat, lon } => run_distance(&config, lat, lon),
    }
}

fn build_credentials(config: &Config) -> Arc<dyn CredentialProvider> {
    match config.token_file() {
        Some(path) => Arc::new(FileCredentials::new(path)),
        None => Arc::new(EnvCredentials::new(config.token_env())),
    }
}

fn build_dispatcher(config: &Config, zone: Option<&SafeZone>) -> anyhow::Result<AlertDispatcher> {
    let relay = HttpNotificationRelay::new(config.relay_url(), config.relay_timeout())
        .context("Failed to build relay client")?;
    let dispatcher = AlertDispatcher::new(Arc::new(relay), build_credentials(config), config.country_code())
        .with_traveller(config.trip_name());
    Ok(match zone {
        Some(zone) => dispatcher.with_zone(zone),
        None => dispatcher,
    })
}

async fn run_monitor(config: &Config, fixes: Option<PathBuf>) -> anyhow::Result<()> {
    let zone = config.safe_zone()?;
    let dispatcher = Arc::new(build_dispatcher(config, Some(&zone))?);

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &fixes {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open fix file {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let source = LineLocationSource::new(reader, config.replay_interval());

    let mut session =
        MonitorSession::new(zone, SessionSettings::from_config(config), Box::new(source), dispatcher)
            .with_feedback(Arc::new(LogFeedback));
    if config.anomaly_enabled() {
        let analyzer = HttpMovementAnalyzer::new(config.anomaly_url(), config.anomaly_timeout())
            .context("Failed to build analyzer client")?;
        session = session.with_analyzer(Arc::new(analyzer));
    }

    let mut handle = session.start();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("shutdown_signal_received");
                break;
            }
            event = handle.next_event() => {
                match event {
                    Some(event) => log_event(&event),
                    None => break,
                }
            }
        }
    }

    let report = handle.stop().await.context("Monitor session task failed")?;
    info!(
        final_state = %report.final_state,
        positions = %report.history.len(),
        boundary_exits = %report.metrics.boundary_exits,
        "safezone-monitor shutdown complete"
    );
    Ok(())
}

fn log_event(event: &MonitorEvent) {
    match event {
        MonitorEvent::ZoneChanged { previous, state, distance_m } => {
            info!(previous = %previous, state = %state, distance_m = %distance_m.round(), "zone_state_changed");
        }
        MonitorEvent::AlertDispatched { record } => {
            if record.outcome().delivered() {
                info!(alert_id = %record.id, summary = %record.summary(), "alert_dispatched");
            } else {
                warn!(alert_id = %record.id, summary = %record.summary(), "alert_undelivered");
            }
        }
        MonitorEvent::AlertFailed { kind, error } => {
            error!(kind = %kind.as_str(), error = %error, "alert_failed");
        }
        MonitorEvent::AnomalyRaised(assessment) => {
            warn!(
                severity = %assessment.severity,
                reason = %assessment.reason,
                confidence = %assessment.confidence,
                "anomaly_raised"
            );
        }
        MonitorEvent::AnomalyCleared => info!("anomaly_cleared"),
        MonitorEvent::PollFailed(e) => warn!(error = %e, "anomaly_poll_failed"),
        MonitorEvent::LocationError(e) => warn!(error = %e, "location_error"),
        MonitorEvent::LocationStreamEnded => info!("location_stream_ended"),
    }
}

async fn run_sos(config: &Config, lat: f64, lon: f64, no_geocode: bool) -> anyhow::Result<()> {
    let dispatcher = build_dispatcher(config, None)?;

    let geocoder = if config.geocode_enabled() && !no_geocode {
        Some(
            NominatimGeocoder::new(config.geocode_url(), config.geocode_user_agent(), config.geocode_timeout())
                .context("Failed to build geocoder client")?,
        )
    } else {
        None
    };

    let record = dispatcher
        .send_sos_from(
            config.contacts(),
            lat,
            lon,
            geocoder.as_ref().map(|g| g as &dyn ReverseGeocoder),
        )
        .await?;
    cue(&LogFeedback, SOS_PATTERN);

    for result in &record.results {
        info!(
            contact = %result.contact.name,
            to = %result.to,
            success = %result.success,
            error = %result.error_detail.as_deref().unwrap_or(""),
            "sos_recipient"
        );
    }
    println!("{}", record.summary());

    match record.outcome() {
        DispatchOutcome::TotalFailure { .. } => anyhow::bail!("SOS not delivered to any contact"),
        _ => Ok(()),
    }
}

fn run_distance(config: &Config, lat: f64, lon: f64) -> anyhow::Result<()> {
    let zone = config.safe_zone()?;
    let c = ZoneClassifier::new(zone).classify(&Position::now(lat, lon));

    println!(
        "{} is {:.1} m from the zone center ({}), radius {} m: {}",
        format_coords(lat, lon),
        c.distance_m,
        format_coords(zone.center_latitude(), zone.center_longitude()),
        zone.radius_meters(),
        c.state
    );
    Ok(())
}
