// Game automation module
// Closed-loop zoom calibration against an Android device, plus the
// device adapters and daily resource bookkeeping it runs alongside.

pub mod adapters;
pub mod channels;
pub mod exhaustion;
pub mod fsm;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export the main types and functions for easy access
pub use adapters::{
    AdbFrameSource, AdbZoomActuator, FileFrameSource, ZoomGesture, ZoomStep, tap_match,
};
pub use channels::create_calibration_channels;
pub use exhaustion::{ExhaustionTracker, is_exhausted_at, last_reset_boundary};
pub use fsm::ZoomCalibrator;
pub use types::{
    Actuator, CalibrationCommand, CalibrationConfig, CalibrationEvent, CalibrationOutcome,
    CalibrationPhase, CalibrationReport, CalibrationState, DirectionCheck, DirectionMapping,
    FailureReason, FrameSource, ZoomDirection,
};
