//! Haptic feedback (best effort)
//!
//! Devices without a vibration motor return `Unsupported`; callers log at
//! debug and move on.

use thiserror::Error;
use tracing::{debug, info};

/// Pattern for leaving the safe zone (on/off/on, ms)
pub const BOUNDARY_PATTERN: &[u32] = &[500, 200, 500];
/// Pattern after an SOS broadcast
pub const SOS_PATTERN: &[u32] = &[500, 200, 500, 200, 500];
/// Short double pulse for anomaly alerts
pub const ANOMALY_PATTERN: &[u32] = &[200, 100, 200];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedbackError {
    #[error("vibration not supported on this device")]
    Unsupported,
    #[error("vibration blocked: {0}")]
    Blocked(String),
}

pub trait Feedback: Send + Sync {
    fn vibrate(&self, pattern: &[u32]) -> Result<(), FeedbackError>;
}

/// Headless hosts: records the cue in the log instead of vibrating
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFeedback;

impl Feedback for LogFeedback {
    fn vibrate(&self, pattern: &[u32]) -> Result<(), FeedbackError> {
        info!(pattern = ?pattern, "haptic_feedback");
        Ok(())
    }
}

/// Device without a vibration motor
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFeedback;

impl Feedback for NoFeedback {
    fn vibrate(&self, _pattern: &[u32]) -> Result<(), FeedbackError> {
        Err(FeedbackError::Unsupported)
    }
}

/// Fire a cue, swallowing any failure
pub fn cue(feedback: &dyn Feedback, pattern: &[u32]) {
    if let Err(e) = feedback.vibrate(pattern) {
        debug!(error = %e, "haptic_feedback_unavailable");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cue_swallows_unsupported() {
        cue(&NoFeedback, BOUNDARY_PATTERN);
        cue(&LogFeedback, SOS_PATTERN);
        assert_eq!(NoFeedback.vibrate(ANOMALY_PATTERN), Err(FeedbackError::Unsupported));
    }
}
