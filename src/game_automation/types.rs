// Types and traits for the zoom calibration loop
use crate::error::{VisionError, VisionResult};
use crate::scale_estimation::ScaleEstimate;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Source of screenshots. A failed capture is an `Err`, never a blank frame.
#[allow(async_fn_in_trait)]
pub trait FrameSource {
    async fn capture_frame(&mut self) -> VisionResult<RgbImage>;
}

/// Executes one discrete zoom step.
#[allow(async_fn_in_trait)]
pub trait Actuator {
    async fn zoom(&mut self, direction: ZoomDirection) -> VisionResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoomDirection {
    ZoomIn,
    ZoomOut,
}

impl ZoomDirection {
    pub fn opposite(self) -> Self {
        match self {
            ZoomDirection::ZoomIn => ZoomDirection::ZoomOut,
            ZoomDirection::ZoomOut => ZoomDirection::ZoomIn,
        }
    }
}

impl fmt::Display for ZoomDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoomDirection::ZoomIn => write!(f, "zoom-in"),
            ZoomDirection::ZoomOut => write!(f, "zoom-out"),
        }
    }
}

/// Which command moves the measured scale toward the target.
///
/// Games disagree on whether a zoom-out gesture makes the reference shape
/// smaller or larger, so this is configuration, checked with
/// `ZoomCalibrator::verify_direction` against the real device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionMapping {
    /// Command issued when the measured scale is above target
    pub when_above_target: ZoomDirection,
}

impl Default for DirectionMapping {
    fn default() -> Self {
        Self {
            when_above_target: ZoomDirection::ZoomOut,
        }
    }
}

impl DirectionMapping {
    /// Direction for `diff = measured - target` (never called with `diff == 0`).
    pub fn direction_for(&self, diff: f64) -> ZoomDirection {
        if diff > 0.0 {
            self.when_above_target
        } else {
            self.when_above_target.opposite()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub target_scale: f64,
    pub tolerance: f64,
    /// Valid measurements allowed before giving up
    pub max_iterations: u32,
    /// Consecutive acquisition/estimation/actuation failures before giving up
    pub max_consecutive_failures: u32,
    /// Wait after each zoom step before measuring again
    pub settle_delay_ms: u64,
    pub direction: DirectionMapping,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            target_scale: 1.0,
            tolerance: 0.02,
            max_iterations: 20,
            max_consecutive_failures: 3,
            settle_delay_ms: 800,
            direction: DirectionMapping::default(),
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> VisionResult<()> {
        if !(self.target_scale.is_finite() && self.target_scale > 0.0) {
            return Err(VisionError::Config(format!(
                "target scale must be positive, got {}",
                self.target_scale
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(VisionError::Config(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(VisionError::Config("max_iterations must be at least 1".to_string()));
        }
        if self.max_consecutive_failures == 0 {
            return Err(VisionError::Config(
                "max_consecutive_failures must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CalibrationPhase {
    Idle,
    Measuring,
    Evaluating,
    Actuating,
    Settling,
    Finished,
}

#[derive(Debug, Clone)]
pub enum CalibrationCommand {
    Cancel,
}

/// Why a measurement or actuation attempt did not succeed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FailureReason {
    /// The estimator found no trustworthy reference shapes
    NoEstimate,
    Acquisition(String),
    Actuation(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoEstimate => write!(f, "no scale estimate"),
            FailureReason::Acquisition(e) => write!(f, "frame acquisition failed: {e}"),
            FailureReason::Actuation(e) => write!(f, "zoom actuation failed: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CalibrationOutcome {
    Converged(ScaleEstimate),
    /// Step budget used up; carries the last valid estimate
    Exhausted(Option<ScaleEstimate>),
    Failed(FailureReason),
    Cancelled,
}

impl CalibrationOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, CalibrationOutcome::Converged(_))
    }
}

impl fmt::Display for CalibrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationOutcome::Converged(e) => write!(f, "converged at scale {:.3}", e.scale),
            CalibrationOutcome::Exhausted(Some(e)) => {
                write!(f, "step budget exhausted at scale {:.3}", e.scale)
            }
            CalibrationOutcome::Exhausted(None) => write!(f, "step budget exhausted"),
            CalibrationOutcome::Failed(reason) => write!(f, "failed: {reason}"),
            CalibrationOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CalibrationEvent {
    PhaseChanged(CalibrationPhase),
    Measured { iteration: u32, estimate: ScaleEstimate },
    Failure { reason: FailureReason, consecutive: u32 },
    Actuated { iteration: u32, direction: ZoomDirection },
    Finished(CalibrationOutcome),
}

/// Snapshot of the loop, mutated once per step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationState {
    pub target_scale: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub iteration: u32,
    pub consecutive_failures: u32,
    pub last_estimate: Option<ScaleEstimate>,
    pub phase: CalibrationPhase,
    pub outcome: Option<CalibrationOutcome>,
}

impl CalibrationState {
    pub fn new(config: &CalibrationConfig) -> Self {
        Self {
            target_scale: config.target_scale,
            tolerance: config.tolerance,
            max_iterations: config.max_iterations,
            iteration: 0,
            consecutive_failures: 0,
            last_estimate: None,
            phase: CalibrationPhase::Idle,
            outcome: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationReport {
    pub outcome: CalibrationOutcome,
    /// Valid measurements taken
    pub iterations: u32,
    /// Zoom commands successfully dispatched
    pub actuations: u32,
    /// Failed acquisitions, estimations and actuations in total
    pub failures: u32,
}

/// Result of checking the direction mapping against the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectionCheck {
    pub commanded: ZoomDirection,
    pub before: ScaleEstimate,
    pub after: ScaleEstimate,
    /// `true` when the scale decreased, as the mapping expects
    pub consistent: bool,
}
