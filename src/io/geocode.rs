//! Reverse geocoding (OpenStreetMap Nominatim)
//!
//! Only used to enrich alert text. Every failure is non-fatal: callers fall
//! back to raw coordinates.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeocodeError {
    #[error("geocoder unreachable: {0}")]
    Transport(String),
    #[error("geocoder returned HTTP {0}")]
    Status(u16),
    #[error("no place found")]
    NotFound,
}

/// Human-readable name for a coordinate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceName {
    /// Full address line
    pub display_name: String,
    /// "city, state, country" when the address breaks down that far
    pub short_name: Option<String>,
}

#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, lat: f64, lon: f64) -> Result<PlaceName, GeocodeError>;
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    suburb: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimReverse {
    display_name: Option<String>,
    #[serde(default)]
    address: Option<NominatimAddress>,
}

impl NominatimReverse {
    fn into_place(self) -> Result<PlaceName, GeocodeError> {
        let display_name = self.display_name.filter(|n| !n.is_empty()).ok_or(GeocodeError::NotFound)?;
        let addr = self.address.unwrap_or_default();
        let locality = addr.city.or(addr.town).or(addr.village).or(addr.suburb);
        let parts: Vec<String> =
            [locality, addr.state, addr.country].into_iter().flatten().filter(|s| !s.is_empty()).collect();
        let short_name = (!parts.is_empty()).then(|| parts.join(", "));
        Ok(PlaceName { display_name, short_name })
    }
}

pub struct NominatimGeocoder {
    base_url: String,
    client: reqwest::Client,
}

impl NominatimGeocoder {
    pub fn new(
        base_url: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| GeocodeError::Transport(e.to_string()))?;
        Ok(Self { base_url: base_url.into().trim_end_matches('/').to_string(), client })
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse(&self, lat: f64, lon: f64) -> Result<PlaceName, GeocodeError> {
        let url = format!("{}/reverse", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("format", "json".to_string()), ("lat", lat.to_string()), ("lon", lon.to_string())])
            .send()
            .await
            .map_err(|e| GeocodeError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GeocodeError::Status(response.status().as_u16()));
        }

        let body: NominatimReverse =
            response.json().await.map_err(|e| GeocodeError::Transport(e.to_string()))?;
        body.into_place()
    }
}

/// Full place name for alert text, or `None` when unavailable
pub async fn describe_location(
    geocoder: Option<&dyn ReverseGeocoder>,
    lat: f64,
    lon: f64,
) -> Option<String> {
    let geocoder = geocoder?;
    match geocoder.reverse(lat, lon).await {
        Ok(place) => Some(place.display_name),
        Err(e) => {
            warn!(lat = %lat, lon = %lon, error = %e, "reverse_geocode_failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl ReverseGeocoder for Failing {
        async fn reverse(&self, _lat: f64, _lon: f64) -> Result<PlaceName, GeocodeError> {
            Err(GeocodeError::Transport("offline".to_string()))
        }
    }

    #[test]
    fn test_into_place_short_name() {
        let body: NominatimReverse = serde_json::from_str(
            r#"{"display_name":"Baga Beach, Calangute, North Goa, Goa, 403516, India",
                "address":{"village":"Calangute","state":"Goa","country":"India"}}"#,
        )
        .unwrap();
        let place = body.into_place().unwrap();
        assert_eq!(place.display_name, "Baga Beach, Calangute, North Goa, Goa, 403516, India");
        assert_eq!(place.short_name.as_deref(), Some("Calangute, Goa, India"));
    }

    #[test]
    fn test_into_place_prefers_city() {
        let body: NominatimReverse = serde_json::from_str(
            r#"{"display_name":"x","address":{"city":"Delhi","suburb":"Hauz Khas","country":"India"}}"#,
        )
        .unwrap();
        assert_eq!(body.into_place().unwrap().short_name.as_deref(), Some("Delhi, India"));
    }

    #[test]
    fn test_into_place_without_name() {
        let body: NominatimReverse = serde_json::from_str(r#"{"error":"Unable to geocode"}"#).unwrap();
        assert_eq!(body.into_place(), Err(GeocodeError::NotFound));
    }

    #[tokio::test]
    async fn test_describe_location_falls_back_to_none() {
        assert_eq!(describe_location(Some(&Failing as &dyn ReverseGeocoder), 1.0, 2.0).await, None);
        assert_eq!(describe_location(None, 1.0, 2.0).await, None);
    }
}
