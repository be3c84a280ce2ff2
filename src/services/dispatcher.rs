//! Alert dispatch: boundary-exit SMS and multi-contact SOS broadcast
//!
//! Preconditions (recipient present, credential obtainable) fail fast
//! before any network call. Once sending starts, every recipient is tracked
//! independently and relay failures are recorded, not raised.

use crate::domain::geo::maps_link;
use crate::domain::types::{AlertKind, AlertRecord, Contact, DispatchOutcome, RecipientResult, SafeZone};
use crate::io::credentials::{CredentialError, CredentialProvider};
use crate::io::geocode::{describe_location, ReverseGeocoder};
use crate::io::relay::NotificationRelay;
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no phone number is registered for this trip, so the boundary alert cannot be sent")]
    MissingRecipient,
    #[error("no emergency contacts found; add contacts to your profile to use SOS")]
    NoContacts,
    #[error("authentication error, please sign in again ({0})")]
    Unauthenticated(#[from] CredentialError),
}

/// Prefix local numbers with the country code after stripping leading
/// zeros. Not validation: the relay decides what is deliverable.
pub fn normalize_phone(raw: &str, country_code: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('+') {
        trimmed.to_string()
    } else {
        format!("{}{}", country_code, trimmed.trim_start_matches('0'))
    }
}

fn format_km(km: f64) -> String {
    if km.fract() == 0.0 {
        format!("{:.0}", km)
    } else {
        format!("{:.1}", km)
    }
}

fn boundary_text_for(radius_km: Option<f64>) -> String {
    let extent = radius_km.map(|km| format!("{}km ", format_km(km))).unwrap_or_default();
    format!(
        "\u{26a0}\u{fe0f} ALERT: You have left the {}Safe Zone! Please return immediately to maintain valid ID status.",
        extent
    )
}

/// Boundary-exit text for a zone
pub fn boundary_message(zone: &SafeZone) -> String {
    boundary_text_for(Some(zone.radius_km()))
}

/// SOS text with coordinates, optional address and a map link
pub fn sos_message(traveller: &str, lat: f64, lon: f64, location_name: Option<&str>) -> String {
    let address = match location_name {
        Some(name) if !name.is_empty() => format!("Address: {}\n", name),
        _ => String::new(),
    };
    format!(
        "\u{1f6a8} SOS EMERGENCY ALERT! \u{1f6a8}\n\n{} needs help!\n\nExact Location:\nLatitude: {}\nLongitude: {}\n{}\nGoogle Maps: {}\n\nPlease respond immediately!",
        traveller,
        lat,
        lon,
        address,
        maps_link(lat, lon)
    )
}

pub struct AlertDispatcher {
    relay: Arc<dyn NotificationRelay>,
    credentials: Arc<dyn CredentialProvider>,
    country_code: String,
    traveller: String,
    boundary_text: String,
}

impl AlertDispatcher {
    pub fn new(
        relay: Arc<dyn NotificationRelay>,
        credentials: Arc<dyn CredentialProvider>,
        country_code: impl Into<String>,
    ) -> Self {
        Self {
            relay,
            credentials,
            country_code: country_code.into(),
            traveller: "Traveller".to_string(),
            boundary_text: boundary_text_for(None),
        }
    }

    /// Name used in SOS text (the trip name)
    pub fn with_traveller(mut self, traveller: impl Into<String>) -> Self {
        self.traveller = traveller.into();
        self
    }

    /// Boundary text mentioning the zone radius
    pub fn with_zone(mut self, zone: &SafeZone) -> Self {
        self.boundary_text = boundary_message(zone);
        self
    }

    pub fn boundary_text(&self) -> &str {
        &self.boundary_text
    }

    /// Single-recipient alert to the trip's registered number
    pub async fn send_boundary_exit_alert(
        &self,
        phone_number: Option<&str>,
    ) -> Result<AlertRecord, DispatchError> {
        let phone = phone_number.map(str::trim).filter(|p| !p.is_empty()).ok_or_else(|| {
            warn!("boundary_alert_no_recipient");
            DispatchError::MissingRecipient
        })?;

        let token = self.credentials.token().await.map_err(|e| {
            error!(error = %e, "boundary_alert_unauthenticated");
            DispatchError::from(e)
        })?;

        let contact = Contact::new("Trip phone", phone);
        let to = normalize_phone(phone, &self.country_code);
        let result = match self.relay.send(&to, &self.boundary_text, &token).await {
            Ok(()) => RecipientResult { contact, to, success: true, error_detail: None },
            Err(e) => RecipientResult { contact, to, success: false, error_detail: Some(e.to_string()) },
        };

        let record = AlertRecord::new(AlertKind::BoundaryExit, self.boundary_text.clone(), vec![result]);
        if record.outcome().delivered() {
            info!(alert_id = %record.id, "boundary_alert_sent");
        } else {
            warn!(alert_id = %record.id, "boundary_alert_failed");
        }
        Ok(record)
    }

    /// Concurrent fan-out to every contact; one contact's failure never
    /// affects another's send
    pub async fn send_sos_broadcast(
        &self,
        contacts: &[Contact],
        lat: f64,
        lon: f64,
        location_name: Option<&str>,
    ) -> Result<AlertRecord, DispatchError> {
        if contacts.is_empty() {
            warn!("sos_no_contacts");
            return Err(DispatchError::NoContacts);
        }

        let message = sos_message(&self.traveller, lat, lon, location_name);
        let results = join_all(contacts.iter().map(|contact| self.send_one(contact, &message))).await;

        let record = AlertRecord::new(AlertKind::Sos, message, results);
        match record.outcome() {
            DispatchOutcome::FullSuccess { sent } => {
                info!(alert_id = %record.id, sent = %sent, "sos_sent");
            }
            DispatchOutcome::PartialSuccess { sent, total, failed } => {
                warn!(alert_id = %record.id, sent = %sent, total = %total, failed = ?failed, "sos_partial");
            }
            DispatchOutcome::TotalFailure { total } => {
                error!(alert_id = %record.id, total = %total, "sos_failed");
            }
        }
        Ok(record)
    }

    /// SOS with the place name looked up first; lookup failures only drop
    /// the address line
    pub async fn send_sos_from(
        &self,
        contacts: &[Contact],
        lat: f64,
        lon: f64,
        geocoder: Option<&dyn ReverseGeocoder>,
    ) -> Result<AlertRecord, DispatchError> {
        if contacts.is_empty() {
            return Err(DispatchError::NoContacts);
        }
        let location_name = describe_location(geocoder, lat, lon).await;
        self.send_sos_broadcast(contacts, lat, lon, location_name.as_deref()).await
    }

    async fn send_one(&self, contact: &Contact, message: &str) -> RecipientResult {
        let to = normalize_phone(&contact.phone_number, &self.country_code);

        // Fresh token per recipient; never reuse a possibly expired one
        let token = match self.credentials.token().await {
            Ok(token) => token,
            Err(e) => {
                return RecipientResult {
                    contact: contact.clone(),
                    to,
                    success: false,
                    error_detail: Some(e.to_string()),
                }
            }
        };

        match self.relay.send(&to, message, &token).await {
            Ok(()) => RecipientResult { contact: contact.clone(), to, success: true, error_detail: None },
            Err(e) => {
                warn!(contact = %contact.name, error = %e, "sos_recipient_failed");
                RecipientResult {
                    contact: contact.clone(),
                    to,
                    success: false,
                    error_detail: Some(e.to_string()),
                }
            }
        }
    }
}
