// Closed-loop zoom calibration state machine
use super::types::{
    Actuator, CalibrationCommand, CalibrationConfig, CalibrationEvent, CalibrationOutcome,
    CalibrationPhase, CalibrationReport, CalibrationState, DirectionCheck, FailureReason,
    FrameSource,
};
use crate::error::{VisionError, VisionResult};
use crate::scale_estimation::{ScaleEstimate, ScaleMeasure};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{Instant, sleep};

/// Drives the measured zoom scale to a target: measure, decide, act, settle.
///
/// Each step is strictly sequential; at most one zoom command is in flight
/// and no measurement overlaps it.
pub struct ZoomCalibrator {
    config: CalibrationConfig,
    state: CalibrationState,
    command_rx: Option<mpsc::Receiver<CalibrationCommand>>,
    event_tx: Option<mpsc::Sender<CalibrationEvent>>,
    actuations: u32,
    failures: u32,
}

impl ZoomCalibrator {
    pub fn new(config: CalibrationConfig) -> VisionResult<Self> {
        config.validate()?;
        let state = CalibrationState::new(&config);
        Ok(Self {
            config,
            state,
            command_rx: None,
            event_tx: None,
            actuations: 0,
            failures: 0,
        })
    }

    pub fn with_commands(mut self, command_rx: mpsc::Receiver<CalibrationCommand>) -> Self {
        self.command_rx = Some(command_rx);
        self
    }

    pub fn with_events(mut self, event_tx: mpsc::Sender<CalibrationEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    fn emit(&self, event: CalibrationEvent) {
        if let Some(tx) = &self.event_tx
            && let Err(e) = tx.try_send(event)
        {
            log::debug!("Calibration event dropped: {}", e);
        }
    }

    fn change_phase(&mut self, phase: CalibrationPhase) {
        if self.state.phase != phase {
            log::debug!("🎮 Calibration phase: {:?} -> {:?}", self.state.phase, phase);
            self.state.phase = phase;
            self.emit(CalibrationEvent::PhaseChanged(phase));
        }
    }

    fn cancel_requested(&mut self) -> bool {
        let Some(rx) = self.command_rx.as_mut() else {
            return false;
        };
        match rx.try_recv() {
            Ok(CalibrationCommand::Cancel) => true,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => false,
        }
    }

    /// Count a failed attempt; returns the terminal outcome once the cap is hit.
    fn record_failure(&mut self, reason: FailureReason) -> Option<CalibrationOutcome> {
        self.failures += 1;
        self.state.consecutive_failures += 1;
        let consecutive = self.state.consecutive_failures;
        log::warn!(
            "⚠️ Calibration attempt failed ({}/{}): {}",
            consecutive,
            self.config.max_consecutive_failures,
            reason
        );
        self.emit(CalibrationEvent::Failure {
            reason: reason.clone(),
            consecutive,
        });
        (consecutive >= self.config.max_consecutive_failures)
            .then_some(CalibrationOutcome::Failed(reason))
    }

    async fn settle(&mut self) {
        self.change_phase(CalibrationPhase::Settling);
        let delay = self.config.settle_delay();
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }

    async fn measure<F, M>(&mut self, frames: &mut F, estimator: &M) -> Result<ScaleEstimate, FailureReason>
    where
        F: FrameSource,
        M: ScaleMeasure,
    {
        self.change_phase(CalibrationPhase::Measuring);
        let frame = frames
            .capture_frame()
            .await
            .map_err(|e| FailureReason::Acquisition(e.to_string()))?;
        estimator.measure(&frame).ok_or(FailureReason::NoEstimate)
    }

    /// Run the loop to a terminal outcome. Transient failures are absorbed
    /// here and only show up in the report.
    pub async fn run<F, M, A>(&mut self, frames: &mut F, estimator: &M, actuator: &mut A) -> CalibrationReport
    where
        F: FrameSource,
        M: ScaleMeasure,
        A: Actuator,
    {
        let start_time = Instant::now();
        self.state = CalibrationState::new(&self.config);
        self.actuations = 0;
        self.failures = 0;
        log::info!(
            "🚀 Calibrating zoom to {:.3} ± {:.3} (max {} steps)",
            self.config.target_scale,
            self.config.tolerance,
            self.config.max_iterations
        );

        let outcome = loop {
            if self.cancel_requested() {
                break CalibrationOutcome::Cancelled;
            }
            if self.state.iteration >= self.config.max_iterations {
                break CalibrationOutcome::Exhausted(self.state.last_estimate);
            }

            let estimate = match self.measure(frames, estimator).await {
                Ok(estimate) => estimate,
                Err(reason) => {
                    if let Some(outcome) = self.record_failure(reason) {
                        break outcome;
                    }
                    self.settle().await;
                    continue;
                }
            };

            self.state.iteration += 1;
            self.state.consecutive_failures = 0;
            self.state.last_estimate = Some(estimate);
            self.emit(CalibrationEvent::Measured {
                iteration: self.state.iteration,
                estimate,
            });

            self.change_phase(CalibrationPhase::Evaluating);
            let diff = estimate.scale - self.config.target_scale;
            log::info!(
                "📏 Step {}/{}: scale {:.3} (confidence {:.2}, {} shapes), diff {:+.3}",
                self.state.iteration,
                self.config.max_iterations,
                estimate.scale,
                estimate.confidence,
                estimate.instances,
                diff
            );
            if diff.abs() <= self.config.tolerance {
                break CalibrationOutcome::Converged(estimate);
            }
            if self.state.iteration >= self.config.max_iterations {
                break CalibrationOutcome::Exhausted(Some(estimate));
            }

            let direction = self.config.direction.direction_for(diff);
            self.change_phase(CalibrationPhase::Actuating);
            match actuator.zoom(direction).await {
                Ok(()) => {
                    self.actuations += 1;
                    log::debug!("🔍 Issued {} (step {})", direction, self.state.iteration);
                    self.emit(CalibrationEvent::Actuated {
                        iteration: self.state.iteration,
                        direction,
                    });
                }
                Err(e) => {
                    if let Some(outcome) = self.record_failure(FailureReason::Actuation(e.to_string())) {
                        break outcome;
                    }
                }
            }
            self.settle().await;
        };

        self.change_phase(CalibrationPhase::Finished);
        self.state.outcome = Some(outcome.clone());
        self.emit(CalibrationEvent::Finished(outcome.clone()));
        log::info!(
            "🏁 Calibration {} after {} step(s), {} zoom command(s), {} failure(s) in {}ms",
            outcome,
            self.state.iteration,
            self.actuations,
            self.failures,
            start_time.elapsed().as_millis()
        );

        CalibrationReport {
            outcome,
            iterations: self.state.iteration,
            actuations: self.actuations,
            failures: self.failures,
        }
    }

    /// Measure with the same failure budget as the main loop.
    async fn measure_with_retries<F, M>(&mut self, frames: &mut F, estimator: &M) -> VisionResult<ScaleEstimate>
    where
        F: FrameSource,
        M: ScaleMeasure,
    {
        let mut last = FailureReason::NoEstimate;
        for attempt in 1..=self.config.max_consecutive_failures {
            match self.measure(frames, estimator).await {
                Ok(estimate) => return Ok(estimate),
                Err(reason) => {
                    log::warn!(
                        "⚠️ Direction check measurement {}/{} failed: {}",
                        attempt,
                        self.config.max_consecutive_failures,
                        reason
                    );
                    last = reason;
                }
            }
        }
        Err(VisionError::Acquisition(last.to_string()))
    }

    /// Issue the "above target" command once and check that the scale drops.
    ///
    /// Run this against the real device before trusting the mapping.
    pub async fn verify_direction<F, M, A>(
        &mut self,
        frames: &mut F,
        estimator: &M,
        actuator: &mut A,
    ) -> VisionResult<DirectionCheck>
    where
        F: FrameSource,
        M: ScaleMeasure,
        A: Actuator,
    {
        let commanded = self.config.direction.when_above_target;
        let before = self.measure_with_retries(frames, estimator).await?;

        self.change_phase(CalibrationPhase::Actuating);
        actuator.zoom(commanded).await?;
        self.settle().await;

        let after = self.measure_with_retries(frames, estimator).await?;
        self.change_phase(CalibrationPhase::Finished);

        let consistent = after.scale < before.scale;
        if consistent {
            log::info!(
                "✅ {} moved scale {:.3} -> {:.3}, mapping confirmed",
                commanded,
                before.scale,
                after.scale
            );
        } else {
            log::warn!(
                "⚠️ {} moved scale {:.3} -> {:.3}; expected a decrease, check [calibration.direction]",
                commanded,
                before.scale,
                after.scale
            );
        }
        Ok(DirectionCheck {
            commanded,
            before,
            after,
            consistent,
        })
    }
}
