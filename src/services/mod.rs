//! Services - monitoring logic and session orchestration
//!
//! - `sampler` - Fix normalization, rolling history, previous/current register
//! - `classifier` - Inside/outside classification and exit edge detection
//! - `poller` - Movement-anomaly polling and the held assessment
//! - `dispatcher` - Boundary and SOS alert delivery
//! - `session` - The monitoring loop tying the above together

pub mod classifier;
pub mod dispatcher;
pub mod poller;
pub mod sampler;
pub mod session;

// Re-export commonly used types
pub use classifier::{Classification, ZoneClassifier};
pub use dispatcher::{AlertDispatcher, DispatchError};
pub use poller::{AnomalyHook, AnomalyPoller, AssessmentChange, LogAnomalyHook};
pub use sampler::{Coordinate, PositionSampler, SampleOutcome};
pub use session::{MonitorEvent, MonitorHandle, MonitorSession, SessionReport, SessionSettings};
