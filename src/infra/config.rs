//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::types::{Contact, SafeZone};
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// The active trip. Owned by trip management; supplied here for the driver.
#[derive(Debug, Clone, Deserialize)]
pub struct TripConfig {
    #[serde(default = "default_trip_name")]
    pub name: String,
    /// Registered phone number, recipient of boundary alerts
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub center_lat: Option<f64>,
    #[serde(default)]
    pub center_lon: Option<f64>,
}

impl Default for TripConfig {
    fn default() -> Self {
        Self { name: default_trip_name(), phone: None, center_lat: None, center_lon: None }
    }
}

fn default_trip_name() -> String {
    "Traveller".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneConfig {
    #[serde(default = "default_radius_m")]
    pub radius_m: f64,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self { radius_m: default_radius_m() }
    }
}

fn default_radius_m() -> f64 {
    10_000.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    #[serde(default = "default_true")]
    pub high_accuracy: bool,
    /// Reject fixes older than this (0 accepts any age)
    #[serde(default = "default_max_age_ms")]
    pub max_age_ms: u64,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Pacing between replayed fixes
    #[serde(default)]
    pub replay_interval_ms: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            max_age_ms: default_max_age_ms(),
            history_capacity: default_history_capacity(),
            replay_interval_ms: 0,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_age_ms() -> u64 {
    10_000
}

fn default_history_capacity() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_url")]
    pub url: String,
    /// Prefix for numbers that don't start with '+'
    #[serde(default = "default_country_code")]
    pub country_code: String,
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: default_relay_url(),
            country_code: default_country_code(),
            timeout_ms: default_http_timeout_ms(),
        }
    }
}

fn default_relay_url() -> String {
    "http://localhost:8787/api/send-sms".to_string()
}

fn default_country_code() -> String {
    "+91".to_string()
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnomalyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_anomaly_url")]
    pub url: String,
    #[serde(default = "default_anomaly_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_anomaly_url(),
            interval_secs: default_anomaly_interval_secs(),
            timeout_ms: default_http_timeout_ms(),
        }
    }
}

fn default_anomaly_url() -> String {
    "http://localhost:8787/api/analyze".to_string()
}

fn default_anomaly_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_heartbeat_interval_secs")]
    pub interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { interval_secs: default_heartbeat_interval_secs() }
    }
}

fn default_heartbeat_interval_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_geocode_url")]
    pub url: String,
    /// Nominatim's usage policy requires an identifying agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_geocode_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_geocode_url(),
            user_agent: default_user_agent(),
            timeout_ms: default_geocode_timeout_ms(),
        }
    }
}

fn default_geocode_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_user_agent() -> String {
    concat!("safezone-monitor/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_geocode_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    /// Environment variable holding the bearer token
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// File holding the bearer token; takes precedence over token_env
    #[serde(default)]
    pub token_file: Option<String>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self { token_env: default_token_env(), token_file: None }
    }
}

fn default_token_env() -> String {
    "SAFEZONE_TOKEN".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub trip: TripConfig,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub zone: ZoneConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub geocode: GeocodeConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    trip_name: String,
    trip_phone: Option<String>,
    trip_center: Option<(f64, f64)>,
    contacts: Vec<Contact>,
    zone_radius_m: f64,
    high_accuracy: bool,
    max_age_ms: u64,
    history_capacity: usize,
    replay_interval_ms: u64,
    relay_url: String,
    country_code: String,
    relay_timeout_ms: u64,
    anomaly_enabled: bool,
    anomaly_url: String,
    anomaly_interval_secs: u64,
    anomaly_timeout_ms: u64,
    heartbeat_interval_secs: u64,
    geocode_enabled: bool,
    geocode_url: String,
    geocode_user_agent: String,
    geocode_timeout_ms: u64,
    token_env: String,
    token_file: Option<String>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let trip_center = match (toml_config.trip.center_lat, toml_config.trip.center_lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        };

        Self {
            trip_name: toml_config.trip.name,
            trip_phone: toml_config.trip.phone.filter(|p| !p.trim().is_empty()),
            trip_center,
            contacts: toml_config.contacts,
            zone_radius_m: toml_config.zone.radius_m,
            high_accuracy: toml_config.location.high_accuracy,
            max_age_ms: toml_config.location.max_age_ms,
            history_capacity: toml_config.location.history_capacity,
            replay_interval_ms: toml_config.location.replay_interval_ms,
            relay_url: toml_config.relay.url,
            country_code: toml_config.relay.country_code,
            relay_timeout_ms: toml_config.relay.timeout_ms,
            anomaly_enabled: toml_config.anomaly.enabled,
            anomaly_url: toml_config.anomaly.url,
            anomaly_interval_secs: toml_config.anomaly.interval_secs,
            anomaly_timeout_ms: toml_config.anomaly.timeout_ms,
            heartbeat_interval_secs: toml_config.heartbeat.interval_secs,
            geocode_enabled: toml_config.geocode.enabled,
            geocode_url: toml_config.geocode.url,
            geocode_user_agent: toml_config.geocode.user_agent,
            geocode_timeout_ms: toml_config.geocode.timeout_ms,
            token_env: toml_config.credentials.token_env,
            token_file: toml_config.credentials.token_file,
            config_file,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let config = Self::from_toml(toml_config, path.display().to_string());
        config
            .validate()
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.anomaly_interval_secs > 0, "anomaly.interval_secs must be at least 1");
        anyhow::ensure!(self.heartbeat_interval_secs > 0, "heartbeat.interval_secs must be at least 1");
        Ok(())
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(Self::resolve_config_path(args))
    }

    /// Load from an explicit path, falling back to defaults on any error
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Safe zone around the trip destination
    pub fn safe_zone(&self) -> anyhow::Result<SafeZone> {
        let (lat, lon) = self
            .trip_center
            .context("trip.center_lat and trip.center_lon are required to monitor a zone")?;
        Ok(SafeZone::new(lat, lon, self.zone_radius_m)?)
    }


    pub fn trip_name(&self) -> &str {
        &self.trip_name
    }

    pub fn trip_phone(&self) -> Option<&str> {
        self.trip_phone.as_deref()
    }

    pub fn trip_center(&self) -> Option<(f64, f64)> {
        self.trip_center
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn zone_radius_m(&self) -> f64 {
        self.zone_radius_m
    }

    pub fn high_accuracy(&self) -> bool {
        self.high_accuracy
    }

    /// Staleness tolerance; `None` when disabled
    pub fn max_age(&self) -> Option<Duration> {
        (self.max_age_ms > 0).then(|| Duration::from_millis(self.max_age_ms))
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    pub fn replay_interval(&self) -> Duration {
        Duration::from_millis(self.replay_interval_ms)
    }

    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_millis(self.relay_timeout_ms)
    }

    pub fn anomaly_enabled(&self) -> bool {
        self.anomaly_enabled
    }

    pub fn anomaly_url(&self) -> &str {
        &self.anomaly_url
    }

    pub fn anomaly_interval(&self) -> Duration {
        Duration::from_secs(self.anomaly_interval_secs)
    }

    pub fn anomaly_timeout(&self) -> Duration {
        Duration::from_millis(self.anomaly_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn geocode_enabled(&self) -> bool {
        self.geocode_enabled
    }

    pub fn geocode_url(&self) -> &str {
        &self.geocode_url
    }

    pub fn geocode_user_agent(&self) -> &str {
        &self.geocode_user_agent
    }

    pub fn geocode_timeout(&self) -> Duration {
        Duration::from_millis(self.geocode_timeout_ms)
    }

    pub fn token_env(&self) -> &str {
        &self.token_env
    }

    pub fn token_file(&self) -> Option<&str> {
        self.token_file.as_deref()
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.zone_radius_m(), 10_000.0);
        assert_eq!(config.country_code(), "+91");
        assert_eq!(config.anomaly_interval(), Duration::from_secs(30));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(300));
        assert_eq!(config.max_age(), Some(Duration::from_millis(10_000)));
        assert_eq!(config.history_capacity(), 100);
        assert!(config.contacts().is_empty());
        assert_eq!(config.trip_phone(), None);
    }

    #[test]
    fn test_safe_zone_requires_center() {
        let config = Config::default();
        assert!(config.safe_zone().is_err());
    }

    #[test]
    fn test_zero_max_age_disables_filter() {
        let toml_config: TomlConfig = toml::from_str("[location]\nmax_age_ms = 0\n").unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.max_age(), None);
    }

    #[test]
    fn test_blank_phone_is_none() {
        let toml_config: TomlConfig = toml::from_str("[trip]\nphone = \"  \"\n").unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.trip_phone(), None);
    }

    #[test]
    fn test_resolve_config_path_default() {
        let args: Vec<String> = vec!["safezone-monitor".to_string()];
        if env::var("CONFIG_FILE").is_err() {
            assert_eq!(Config::resolve_config_path(&args), "config/dev.toml");
        }
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> = vec![
            "safezone-monitor".to_string(),
            "--config".to_string(),
            "config/goa.toml".to_string(),
        ];
        assert_eq!(Config::resolve_config_path(&args), "config/goa.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> =
            vec!["safezone-monitor".to_string(), "--config=config/delhi.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/delhi.toml");
    }
}
