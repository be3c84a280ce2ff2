//! IO modules - external collaborator interfaces
//!
//! This module contains everything that talks to the outside world:
//! - `location` - Location sources and cancellable subscriptions
//! - `credentials` - Bearer token providers for the relay
//! - `relay` - HTTP client for the SMS notification relay
//! - `analyzer` - HTTP client for the movement-analysis service
//! - `geocode` - Reverse geocoding for alert text
//! - `feedback` - Haptic cues
//! - `mock_services` - Local HTTP stand-ins for the relay, analyzer and geocoder

pub mod analyzer;
pub mod credentials;
pub mod feedback;
pub mod geocode;
pub mod location;
pub mod mock_services;
pub mod relay;

// Re-export commonly used types
pub use analyzer::{HttpMovementAnalyzer, MovementAnalyzer, MovementRequest, MovementVerdict};
pub use credentials::{CredentialProvider, EnvCredentials, FileCredentials, StaticCredentials};
pub use feedback::{Feedback, LogFeedback, NoFeedback};
pub use geocode::{NominatimGeocoder, ReverseGeocoder};
pub use location::{
    ChannelLocationSource, LineLocationSource, LocationSource, RawFix, Subscription, WatchOptions,
};
pub use mock_services::{serve_mock_services, MockServices};
pub use relay::{HttpNotificationRelay, NotificationRelay};
