//! Domain models - core monitoring types and geodesy
//!
//! This module contains the canonical data types used throughout the system:
//! - `Position` - a normalized location fix
//! - `SafeZone` - circular geofence around the trip destination
//! - `ZoneState` - inside/outside classification
//! - `AlertRecord` - one dispatch attempt with per-recipient results
//! - `AnomalyAssessment` - latest verdict from the movement-analysis service

pub mod geo;
pub mod types;

// Re-export commonly used types at module level
pub use types::{
    AlertKind, AlertRecord, AnomalyAssessment, Contact, DispatchOutcome, Position,
    RecipientResult, SafeZone, Severity, ZoneError, ZoneState,
};
