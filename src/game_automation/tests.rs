// Tests for the calibration loop against a simulated device

use crate::error::VisionError;
use crate::game_automation::{
    Actuator, CalibrationCommand, CalibrationConfig, CalibrationEvent, CalibrationOutcome,
    CalibrationPhase, DirectionMapping, FailureReason, FrameSource, ZoomCalibrator, ZoomDirection,
    create_calibration_channels,
};
use crate::scale_estimation::{ScaleEstimate, ScaleMeasure};
use image::RgbImage;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use tokio::sync::mpsc;

type Trace = Rc<RefCell<Vec<&'static str>>>;

/// Frame source whose captures fail according to a script (`false` = fail).
struct ScriptedFrames {
    script: VecDeque<bool>,
    captures: usize,
}

impl ScriptedFrames {
    fn ok() -> Self {
        Self::with_script(&[])
    }

    fn with_script(script: &[bool]) -> Self {
        Self {
            script: script.iter().copied().collect(),
            captures: 0,
        }
    }
}

impl FrameSource for ScriptedFrames {
    async fn capture_frame(&mut self) -> Result<RgbImage, VisionError> {
        self.captures += 1;
        if self.script.pop_front().unwrap_or(true) {
            Ok(RgbImage::new(4, 4))
        } else {
            Err(VisionError::Acquisition("screencap timed out".into()))
        }
    }
}

/// Reads the simulated true scale and adds deterministic noise.
struct SimEstimator {
    scale: Rc<Cell<f64>>,
    noise: f64,
    calls: Cell<usize>,
    /// `false` entries return no estimate
    script: RefCell<VecDeque<bool>>,
    trace: Trace,
}

impl SimEstimator {
    fn new(scale: &Rc<Cell<f64>>, trace: &Trace) -> Self {
        Self {
            scale: Rc::clone(scale),
            noise: 0.0,
            calls: Cell::new(0),
            script: RefCell::new(VecDeque::new()),
            trace: Rc::clone(trace),
        }
    }

    fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    fn with_script(self, script: &[bool]) -> Self {
        *self.script.borrow_mut() = script.iter().copied().collect();
        self
    }
}

impl ScaleMeasure for SimEstimator {
    fn measure(&self, _frame: &RgbImage) -> Option<ScaleEstimate> {
        let k = self.calls.get();
        self.calls.set(k + 1);
        self.trace.borrow_mut().push("measure");
        if !self.script.borrow_mut().pop_front().unwrap_or(true) {
            return None;
        }
        let jitter = self.noise * ((k as f64) * 1.7).sin();
        Some(estimate(self.scale.get() + jitter))
    }
}

/// Moves the simulated scale by a fixed step; zoom-out shrinks unless inverted.
struct StepActuator {
    scale: Rc<Cell<f64>>,
    step: f64,
    inverted: bool,
    fail: bool,
    issued: Vec<ZoomDirection>,
    trace: Trace,
    cancel_after_first: Option<mpsc::Sender<CalibrationCommand>>,
}

impl StepActuator {
    fn new(scale: &Rc<Cell<f64>>, step: f64, trace: &Trace) -> Self {
        Self {
            scale: Rc::clone(scale),
            step,
            inverted: false,
            fail: false,
            issued: Vec::new(),
            trace: Rc::clone(trace),
            cancel_after_first: None,
        }
    }
}

impl Actuator for StepActuator {
    async fn zoom(&mut self, direction: ZoomDirection) -> Result<(), VisionError> {
        self.trace.borrow_mut().push("zoom");
        if self.fail {
            return Err(VisionError::Actuation("input keyevent rejected".into()));
        }
        self.issued.push(direction);
        let shrink = (direction == ZoomDirection::ZoomOut) != self.inverted;
        let delta = if shrink { -self.step } else { self.step };
        self.scale.set(self.scale.get() + delta);
        if let Some(tx) = self.cancel_after_first.take() {
            let _ = tx.try_send(CalibrationCommand::Cancel);
        }
        Ok(())
    }
}

fn estimate(scale: f64) -> ScaleEstimate {
    ScaleEstimate {
        scale,
        confidence: 1.0,
        instances: 3,
        inliers: 3,
    }
}

fn config(max_iterations: u32, max_consecutive_failures: u32) -> CalibrationConfig {
    CalibrationConfig {
        target_scale: 1.0,
        tolerance: 0.02,
        max_iterations,
        max_consecutive_failures,
        settle_delay_ms: 0,
        direction: DirectionMapping::default(),
    }
}

fn new_trace() -> Trace {
    Rc::new(RefCell::new(Vec::new()))
}

/// No two zoom commands without a measurement in between.
fn assert_one_zoom_per_measurement(trace: &Trace) {
    let trace = trace.borrow();
    for pair in trace.windows(2) {
        assert!(
            !(pair[0] == "zoom" && pair[1] == "zoom"),
            "two zoom commands in one iteration: {trace:?}"
        );
    }
}

#[tokio::test]
async fn test_converges_from_various_starting_scales() {
    for start in [0.6, 0.85, 1.0, 1.3, 1.7] {
        let scale = Rc::new(Cell::new(start));
        let trace = new_trace();
        let estimator = SimEstimator::new(&scale, &trace).with_noise(0.004);
        let mut actuator = StepActuator::new(&scale, 0.03, &trace);
        let mut calibrator = ZoomCalibrator::new(config(40, 3)).unwrap();

        let report = calibrator
            .run(&mut ScriptedFrames::ok(), &estimator, &mut actuator)
            .await;

        assert!(report.outcome.is_converged(), "start {start}: {:?}", report.outcome);
        assert!((scale.get() - 1.0).abs() <= 0.02 + 0.004, "start {start}: {}", scale.get());
        assert_eq!(report.actuations, report.iterations - 1);
        assert_eq!(report.failures, 0);
        assert_one_zoom_per_measurement(&trace);
    }
}

#[tokio::test]
async fn test_single_zoom_out_when_slightly_above_target() {
    let scale = Rc::new(Cell::new(1.05));
    let trace = new_trace();
    let estimator = SimEstimator::new(&scale, &trace);
    let mut actuator = StepActuator::new(&scale, 0.05, &trace);
    let mut calibrator = ZoomCalibrator::new(config(10, 3)).unwrap();

    let report = calibrator
        .run(&mut ScriptedFrames::ok(), &estimator, &mut actuator)
        .await;

    assert_eq!(actuator.issued, vec![ZoomDirection::ZoomOut]);
    assert_eq!(*trace.borrow(), vec!["measure", "zoom", "measure"]);
    assert!(report.outcome.is_converged());
    assert_eq!(report.iterations, 2);
}

#[tokio::test]
async fn test_below_target_zooms_in() {
    let scale = Rc::new(Cell::new(0.9));
    let trace = new_trace();
    let estimator = SimEstimator::new(&scale, &trace);
    let mut actuator = StepActuator::new(&scale, 0.1, &trace);
    let mut calibrator = ZoomCalibrator::new(config(10, 3)).unwrap();

    calibrator
        .run(&mut ScriptedFrames::ok(), &estimator, &mut actuator)
        .await;
    assert_eq!(actuator.issued, vec![ZoomDirection::ZoomIn]);
}

#[tokio::test]
async fn test_exhausted_exactly_at_iteration_cap() {
    let scale = Rc::new(Cell::new(1.5));
    let trace = new_trace();
    let estimator = SimEstimator::new(&scale, &trace);
    // Gesture has no effect on the scale
    let mut actuator = StepActuator::new(&scale, 0.0, &trace);
    let mut calibrator = ZoomCalibrator::new(config(5, 3)).unwrap();

    let report = calibrator
        .run(&mut ScriptedFrames::ok(), &estimator, &mut actuator)
        .await;

    assert_eq!(report.outcome, CalibrationOutcome::Exhausted(Some(estimate(1.5))));
    assert_eq!(report.iterations, 5);
    assert_eq!(report.actuations, 4);
    assert_eq!(estimator.calls.get(), 5);
}

#[tokio::test]
async fn test_no_estimate_is_retried_without_actuation() {
    let scale = Rc::new(Cell::new(1.0));
    let trace = new_trace();
    let estimator = SimEstimator::new(&scale, &trace).with_script(&[false, false, true]);
    let mut actuator = StepActuator::new(&scale, 0.05, &trace);
    let mut calibrator = ZoomCalibrator::new(config(10, 3)).unwrap();

    let report = calibrator
        .run(&mut ScriptedFrames::ok(), &estimator, &mut actuator)
        .await;

    assert!(report.outcome.is_converged());
    assert_eq!(report.failures, 2);
    assert_eq!(report.iterations, 1);
    assert!(actuator.issued.is_empty());
    assert_eq!(*trace.borrow(), vec!["measure", "measure", "measure"]);
}

#[tokio::test]
async fn test_consecutive_no_estimates_fail() {
    let scale = Rc::new(Cell::new(1.0));
    let trace = new_trace();
    let estimator = SimEstimator::new(&scale, &trace).with_script(&[false; 10]);
    let mut actuator = StepActuator::new(&scale, 0.05, &trace);
    let mut calibrator = ZoomCalibrator::new(config(10, 3)).unwrap();

    let report = calibrator
        .run(&mut ScriptedFrames::ok(), &estimator, &mut actuator)
        .await;

    assert_eq!(report.outcome, CalibrationOutcome::Failed(FailureReason::NoEstimate));
    assert_eq!(report.failures, 3);
    assert_eq!(report.iterations, 0);
    assert_eq!(estimator.calls.get(), 3);
    assert!(actuator.issued.is_empty());
}

#[tokio::test]
async fn test_acquisition_failures_reset_after_success() {
    let scale = Rc::new(Cell::new(1.1));
    let trace = new_trace();
    let estimator = SimEstimator::new(&scale, &trace);
    let mut actuator = StepActuator::new(&scale, 0.1, &trace);
    let mut frames = ScriptedFrames::with_script(&[false, false, true, false, false, true]);
    let mut calibrator = ZoomCalibrator::new(config(10, 3)).unwrap();

    let report = calibrator.run(&mut frames, &estimator, &mut actuator).await;

    assert!(report.outcome.is_converged());
    assert_eq!(report.failures, 4);
    assert_eq!(report.iterations, 2);
    assert_eq!(frames.captures, 6);
}

#[tokio::test]
async fn test_acquisition_failure_cap() {
    let scale = Rc::new(Cell::new(1.1));
    let trace = new_trace();
    let estimator = SimEstimator::new(&scale, &trace);
    let mut actuator = StepActuator::new(&scale, 0.1, &trace);
    let mut frames = ScriptedFrames::with_script(&[false, false]);
    let mut calibrator = ZoomCalibrator::new(config(10, 2)).unwrap();

    let report = calibrator.run(&mut frames, &estimator, &mut actuator).await;

    assert!(matches!(
        report.outcome,
        CalibrationOutcome::Failed(FailureReason::Acquisition(_))
    ));
    assert_eq!(estimator.calls.get(), 0);
}

#[tokio::test]
async fn test_actuation_failures_are_counted() {
    let scale = Rc::new(Cell::new(1.5));
    let trace = new_trace();
    let estimator = SimEstimator::new(&scale, &trace);
    let mut actuator = StepActuator::new(&scale, 0.1, &trace);
    actuator.fail = true;
    let mut calibrator = ZoomCalibrator::new(config(4, 2)).unwrap();

    let report = calibrator
        .run(&mut ScriptedFrames::ok(), &estimator, &mut actuator)
        .await;

    // Each valid measurement resets the streak, so the step budget ends the run
    assert_eq!(report.outcome, CalibrationOutcome::Exhausted(Some(estimate(1.5))));
    assert_eq!(report.actuations, 0);
    assert_eq!(report.failures, 3);
}

#[tokio::test]
async fn test_cancel_before_start() {
    let scale = Rc::new(Cell::new(1.5));
    let trace = new_trace();
    let estimator = SimEstimator::new(&scale, &trace);
    let mut actuator = StepActuator::new(&scale, 0.1, &trace);
    let (cmd_tx, cmd_rx, _event_tx, _event_rx) = create_calibration_channels();
    cmd_tx.send(CalibrationCommand::Cancel).await.unwrap();
    let mut calibrator = ZoomCalibrator::new(config(10, 3)).unwrap().with_commands(cmd_rx);

    let report = calibrator
        .run(&mut ScriptedFrames::ok(), &estimator, &mut actuator)
        .await;

    assert_eq!(report.outcome, CalibrationOutcome::Cancelled);
    assert_eq!(estimator.calls.get(), 0);
}

#[tokio::test]
async fn test_cancel_between_iterations() {
    let scale = Rc::new(Cell::new(1.5));
    let trace = new_trace();
    let estimator = SimEstimator::new(&scale, &trace);
    let mut actuator = StepActuator::new(&scale, 0.1, &trace);
    let (cmd_tx, cmd_rx, _event_tx, _event_rx) = create_calibration_channels();
    actuator.cancel_after_first = Some(cmd_tx);
    let mut calibrator = ZoomCalibrator::new(config(10, 3)).unwrap().with_commands(cmd_rx);

    let report = calibrator
        .run(&mut ScriptedFrames::ok(), &estimator, &mut actuator)
        .await;

    assert_eq!(report.outcome, CalibrationOutcome::Cancelled);
    assert_eq!(report.iterations, 1);
    assert_eq!(report.actuations, 1);
}

#[tokio::test]
async fn test_events_and_final_state() {
    let scale = Rc::new(Cell::new(1.05));
    let trace = new_trace();
    let estimator = SimEstimator::new(&scale, &trace);
    let mut actuator = StepActuator::new(&scale, 0.05, &trace);
    let (_cmd_tx, _cmd_rx, event_tx, mut event_rx) = create_calibration_channels();
    let mut calibrator = ZoomCalibrator::new(config(10, 3)).unwrap().with_events(event_tx);

    let report = calibrator
        .run(&mut ScriptedFrames::ok(), &estimator, &mut actuator)
        .await;

    let mut events = Vec::new();
    while let Ok(event) = event_rx.try_recv() {
        events.push(event);
    }
    assert!(matches!(
        events.first(),
        Some(CalibrationEvent::PhaseChanged(CalibrationPhase::Measuring))
    ));
    let measured = events
        .iter()
        .filter(|e| matches!(e, CalibrationEvent::Measured { .. }))
        .count();
    assert_eq!(measured, 2);
    assert!(events.iter().any(|e| matches!(
        e,
        CalibrationEvent::Actuated {
            iteration: 1,
            direction: ZoomDirection::ZoomOut
        }
    )));
    assert!(matches!(
        events.last(),
        Some(CalibrationEvent::Finished(CalibrationOutcome::Converged(_)))
    ));

    let state = calibrator.state();
    assert_eq!(state.phase, CalibrationPhase::Finished);
    assert_eq!(state.iteration, 2);
    assert_eq!(state.outcome.as_ref(), Some(&report.outcome));
    assert_eq!(state.consecutive_failures, 0);
}

#[tokio::test]
async fn test_verify_direction_consistent_and_inverted() {
    let scale = Rc::new(Cell::new(1.2));
    let trace = new_trace();
    let estimator = SimEstimator::new(&scale, &trace);
    let mut actuator = StepActuator::new(&scale, 0.1, &trace);
    let mut calibrator = ZoomCalibrator::new(config(10, 3)).unwrap();

    let check = calibrator
        .verify_direction(&mut ScriptedFrames::ok(), &estimator, &mut actuator)
        .await
        .unwrap();
    assert_eq!(check.commanded, ZoomDirection::ZoomOut);
    assert!(check.consistent);
    assert!(check.after.scale < check.before.scale);

    actuator.inverted = true;
    let check = calibrator
        .verify_direction(&mut ScriptedFrames::ok(), &estimator, &mut actuator)
        .await
        .unwrap();
    assert!(!check.consistent);
}

#[tokio::test]
async fn test_verify_direction_without_estimates_errors() {
    let scale = Rc::new(Cell::new(1.2));
    let trace = new_trace();
    let estimator = SimEstimator::new(&scale, &trace).with_script(&[false; 5]);
    let mut actuator = StepActuator::new(&scale, 0.1, &trace);
    let mut calibrator = ZoomCalibrator::new(config(10, 3)).unwrap();

    let result = calibrator
        .verify_direction(&mut ScriptedFrames::ok(), &estimator, &mut actuator)
        .await;
    assert!(matches!(result, Err(VisionError::Acquisition(_))));
    assert!(actuator.issued.is_empty());
}

#[test]
fn test_invalid_config_rejected() {
    let result = ZoomCalibrator::new(CalibrationConfig {
        tolerance: 0.0,
        ..CalibrationConfig::default()
    });
    assert!(matches!(result, Err(VisionError::Config(_))));
}

/// Checks the configured direction mapping on a real device.
/// Run with `AVC_DEVICE_TEST=1 cargo test -- --ignored`.
#[tokio::test]
#[ignore = "requires a connected device showing the reference shapes"]
async fn test_direction_mapping_on_device() {
    use crate::adb::{AdbBackend, BackendKind};
    use crate::game_automation::{AdbFrameSource, AdbZoomActuator, ZoomGesture};
    use crate::scale_estimation::{ScaleEstimator, ScaleEstimatorConfig};
    use std::sync::Arc;

    if std::env::var("AVC_DEVICE_TEST").is_err() {
        return;
    }
    let backend = Arc::new(AdbBackend::connect_first(BackendKind::Rust).await.unwrap());
    let mut frames = AdbFrameSource::new(Arc::clone(&backend));
    let mut actuator = AdbZoomActuator::new(backend, ZoomGesture::default()).unwrap();
    let estimator = ScaleEstimator::new(ScaleEstimatorConfig::default()).unwrap();
    let mut calibrator = ZoomCalibrator::new(CalibrationConfig::default()).unwrap();

    let check = calibrator
        .verify_direction(&mut frames, &estimator, &mut actuator)
        .await
        .unwrap();
    assert!(check.consistent, "direction mapping is inverted: {check:?}");
}
