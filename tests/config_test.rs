//! Integration tests for configuration loading

use safezone_monitor::domain::types::Contact;
use safezone_monitor::infra::Config;
use safezone_monitor::services::SessionSettings;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[trip]
name = "Delhi Heritage Walk"
phone = "09876543210"
center_lat = 28.6139
center_lon = 77.2090

[[contacts]]
name = "Asha"
phone_number = "9876500001"

[[contacts]]
name = "Ravi"
phone = "+447700900123"

[zone]
radius_m = 2500

[location]
high_accuracy = false
max_age_ms = 5000
history_capacity = 20

[relay]
url = "http://relay.test/api/send-sms"
country_code = "+1"
timeout_ms = 3000

[anomaly]
enabled = false
interval_secs = 15

[heartbeat]
interval_secs = 60

[credentials]
token_file = "/run/secrets/safezone-token"
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.trip_name(), "Delhi Heritage Walk");
    assert_eq!(config.trip_phone(), Some("09876543210"));
    assert_eq!(
        config.contacts(),
        &[Contact::new("Asha", "9876500001"), Contact::new("Ravi", "+447700900123")]
    );
    assert_eq!(config.relay_url(), "http://relay.test/api/send-sms");
    assert_eq!(config.country_code(), "+1");
    assert_eq!(config.relay_timeout(), Duration::from_millis(3000));
    assert!(!config.anomaly_enabled());
    assert_eq!(config.anomaly_interval(), Duration::from_secs(15));
    assert_eq!(config.token_file(), Some("/run/secrets/safezone-token"));

    let zone = config.safe_zone().unwrap();
    assert_eq!(zone.center_latitude(), 28.6139);
    assert_eq!(zone.radius_meters(), 2500.0);
    assert_eq!(zone.radius_km(), 2.5);

    let settings = SessionSettings::from_config(&config);
    assert!(!settings.watch.high_accuracy);
    assert_eq!(settings.watch.max_age, Some(Duration::from_secs(5)));
    assert_eq!(settings.history_capacity, 20);
    assert_eq!(settings.poll_interval, None);
    assert_eq!(settings.heartbeat_interval, Duration::from_secs(60));
    assert_eq!(settings.trip_phone.as_deref(), Some("09876543210"));
}

#[test]
fn test_invalid_radius_is_rejected() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file
        .write_all(b"[trip]\ncenter_lat = 0.0\ncenter_lon = 0.0\n\n[zone]\nradius_m = -1\n")
        .unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    let err = config.safe_zone().unwrap_err();
    assert!(err.to_string().contains("radius"));
}

#[test]
fn test_malformed_file_is_an_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[zone\nradius_m = ").unwrap();
    temp_file.flush().unwrap();

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse config file"));
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.zone_radius_m(), 10_000.0);
    assert_eq!(config.country_code(), "+91");
    assert!(config.anomaly_enabled());
    assert!(config.safe_zone().is_err());

    let settings = SessionSettings::from_config(&config);
    assert_eq!(settings.poll_interval, Some(Duration::from_secs(30)));
}

#[test]
fn test_dev_config_parses() {
    let config = Config::from_file(concat!(env!("CARGO_MANIFEST_DIR"), "/config/dev.toml")).unwrap();
    assert!(config.safe_zone().is_ok());
    assert_eq!(config.contacts().len(), 2);
}

#[test]
fn test_zero_intervals_are_rejected() {
    for section in ["anomaly", "heartbeat"] {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "[{}]\ninterval_secs = 0\n", section).unwrap();
        temp_file.flush().unwrap();

        let err = Config::from_file(temp_file.path()).unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("Invalid config file"), "{}", msg);
        assert!(msg.contains(&format!("{}.interval_secs", section)), "{}", msg);

        let config = Config::load_from_path(temp_file.path());
        assert_eq!(config.anomaly_interval(), Duration::from_secs(30));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(300));
    }
}
