//! Zone classification and the edge-triggered exit state machine
//!
//! `Unknown` only exists before the first fix. An exit is reported solely on
//! an `Inside -> Outside` transition, so a session that starts outside the
//! zone stays quiet until the traveller has been inside at least once.

use crate::domain::types::{Position, SafeZone, ZoneState};
use tracing::{debug, info};

/// Result of classifying one position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub previous: ZoneState,
    pub state: ZoneState,
    pub distance_m: f64,
    /// Inside -> Outside on this fix; dispatch exactly one boundary alert
    pub exited: bool,
    /// Outside -> Inside on this fix
    pub entered: bool,
}

impl Classification {
    /// Haptic cue on every outside sample
    pub fn wants_feedback(&self) -> bool {
        self.state == ZoneState::Outside
    }

    pub fn changed(&self) -> bool {
        self.previous != self.state
    }
}

pub struct ZoneClassifier {
    zone: SafeZone,
    state: ZoneState,
}

impl ZoneClassifier {
    pub fn new(zone: SafeZone) -> Self {
        Self { zone, state: ZoneState::Unknown }
    }

    pub fn zone(&self) -> &SafeZone {
        &self.zone
    }

    pub fn state(&self) -> ZoneState {
        self.state
    }

    pub fn classify(&mut self, position: &Position) -> Classification {
        let distance_m = self.zone.distance_from_center(position);
        let next = if distance_m <= self.zone.radius_meters() {
            ZoneState::Inside
        } else {
            ZoneState::Outside
        };

        let previous = self.state;
        let exited = previous == ZoneState::Inside && next == ZoneState::Outside;
        let entered = previous == ZoneState::Outside && next == ZoneState::Inside;
        self.state = next;

        if exited {
            info!(distance_m = %distance_m.round(), radius_m = %self.zone.radius_meters(), "zone_exit");
        } else if entered {
            info!(distance_m = %distance_m.round(), "zone_entry");
        } else if previous == ZoneState::Unknown {
            info!(state = %next, distance_m = %distance_m.round(), "zone_initial_state");
        } else {
            debug!(state = %next, distance_m = %distance_m.round(), "zone_unchanged");
        }

        Classification { previous, state: next, distance_m, exited, entered }
    }
}
