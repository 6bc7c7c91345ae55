mod args;

use adb_vision_calibrate::adb::AdbBackend;
use adb_vision_calibrate::config::AppConfig;
use adb_vision_calibrate::error::{VisionError, VisionResult};
use adb_vision_calibrate::game_automation::{
    AdbFrameSource, AdbZoomActuator, CalibrationCommand, FileFrameSource, FrameSource,
    ZoomCalibrator, create_calibration_channels, tap_match,
};
use adb_vision_calibrate::scale_estimation::ScaleEstimator;
use adb_vision_calibrate::template_matching::{
    DebugSink, DirectoryDebugSink, MatchResult, TemplateMatcher, TemplateStore,
};
use args::{Args, Mode};
use image::RgbImage;
use std::process::ExitCode;
use std::sync::Arc;

const SCREENSHOT_FILE: &str = "cli-screenshot.png";

/// Device screenshots or a saved image, chosen on the command line.
enum Frames {
    Device(AdbFrameSource),
    File(FileFrameSource),
}

impl FrameSource for Frames {
    async fn capture_frame(&mut self) -> VisionResult<RgbImage> {
        match self {
            Frames::Device(source) => source.capture_frame().await,
            Frames::File(source) => source.capture_frame().await,
        }
    }
}

fn main() -> ExitCode {
    let args = match Args::parse() {
        Ok(args) => args,
        Err(status) => return ExitCode::from(status),
    };

    let default_filter = if args.debug_mode { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("❌ Failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(true) => ExitCode::SUCCESS,
        // Ran fine but the goal was not reached (no match, no convergence)
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            log::error!("{e}");
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

async fn connect(config: &AppConfig) -> VisionResult<Arc<AdbBackend>> {
    let backend = AdbBackend::connect(config.device.serial.as_deref(), config.device.backend).await?;
    let (sx, sy) = backend.screen_dimensions();
    log::info!(
        "📱 Device: {} size: {}x{} (backend={:?})",
        backend.device_name(),
        sx,
        sy,
        config.device.backend
    );
    Ok(Arc::new(backend))
}

/// Returns whether the mode reached its goal.
async fn run(args: Args) -> VisionResult<bool> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(kind) = args.backend {
        config.device.backend = kind;
    }

    match args.mode {
        Mode::Screenshot => {
            let backend = connect(&config).await?;
            let capture = backend.screen_capture().await?;
            tokio::fs::write(SCREENSHOT_FILE, &capture.bytes).await?;
            println!(
                "✅ Screenshot ({}ms) saved to {}",
                capture.duration_ms, SCREENSHOT_FILE
            );
        }
        Mode::Match { label, all } => {
            let mut frames = match &args.image {
                Some(path) => Frames::File(FileFrameSource::new(path)),
                None => Frames::Device(AdbFrameSource::new(connect(&config).await?)),
            };
            let frame = frames.capture_frame().await?;
            let matches = find(&config, &frame, &label, all)?;
            if matches.is_empty() {
                println!("🔍 No match for '{}'", label);
            }
            for m in &matches {
                println!("🎯 {}", m);
            }
            record_debug(&config, &label, &frame, &matches)?;
            return Ok(!matches.is_empty());
        }
        Mode::Tap(label) => {
            let backend = connect(&config).await?;
            let frame = AdbFrameSource::new(Arc::clone(&backend)).capture_frame().await?;
            let matches = find(&config, &frame, &label, false)?;
            record_debug(&config, &label, &frame, &matches)?;
            let Some(found) = matches.first() else {
                println!("🔍 No match for '{}', nothing tapped", label);
                return Ok(false);
            };
            let (x, y) = tap_match(&backend, found).await?;
            println!("👆 Tapped {} at ({}, {})", found.label, x, y);
        }
        Mode::Scale => {
            let mut frames = match &args.image {
                Some(path) => Frames::File(FileFrameSource::new(path)),
                None => Frames::Device(AdbFrameSource::new(connect(&config).await?)),
            };
            let frame = frames.capture_frame().await?;
            let estimator = ScaleEstimator::new(config.scale.clone())?;
            let candidates = estimator.detect_candidates(&frame);
            match estimator.estimate_scale(&frame) {
                Some(estimate) => {
                    let (w, h) = estimator.approximate_dimensions(estimate.scale);
                    println!(
                        "📏 Scale {:.3} (confidence {:.2}, {}/{} shapes agree), reference ≈ {}x{}",
                        estimate.scale, estimate.confidence, estimate.inliers, estimate.instances, w, h
                    );
                }
                None => {
                    println!("📏 No scale estimate ({} candidate shape(s))", candidates.len());
                    return Ok(false);
                }
            }
        }
        Mode::Calibrate => {
            let backend = connect(&config).await?;
            let mut frames = AdbFrameSource::new(Arc::clone(&backend));
            let mut actuator = AdbZoomActuator::new(backend, config.zoom.clone())?;
            let estimator = ScaleEstimator::new(config.scale.clone())?;

            let (cmd_tx, cmd_rx, _event_tx, _event_rx) = create_calibration_channels();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("🛑 Interrupt received, stopping after the current step");
                    let _ = cmd_tx.send(CalibrationCommand::Cancel).await;
                }
            });

            let mut calibrator = ZoomCalibrator::new(config.calibration.clone())?.with_commands(cmd_rx);
            let report = calibrator.run(&mut frames, &estimator, &mut actuator).await;
            println!(
                "🏁 {} ({} measurement(s), {} zoom step(s), {} failure(s))",
                report.outcome, report.iterations, report.actuations, report.failures
            );
            return Ok(report.outcome.is_converged());
        }
        Mode::VerifyDirection => {
            let backend = connect(&config).await?;
            let mut frames = AdbFrameSource::new(Arc::clone(&backend));
            let mut actuator = AdbZoomActuator::new(backend, config.zoom.clone())?;
            let estimator = ScaleEstimator::new(config.scale.clone())?;
            let mut calibrator = ZoomCalibrator::new(config.calibration.clone())?;

            let check = calibrator
                .verify_direction(&mut frames, &estimator, &mut actuator)
                .await?;
            let verdict = if check.consistent { "✅ consistent" } else { "⚠️ inverted" };
            println!(
                "{}: {} moved scale {:.3} -> {:.3}",
                verdict, check.commanded, check.before.scale, check.after.scale
            );
            return Ok(check.consistent);
        }
    }
    Ok(true)
}

fn find(config: &AppConfig, frame: &RgbImage, label: &str, all: bool) -> VisionResult<Vec<MatchResult>> {
    let store = TemplateStore::load_from_directory(&config.templates.directory, &config.templates.thresholds)?;
    let variants = store.variants(label);
    if variants.is_empty() {
        let known: Vec<&str> = store.labels().collect();
        return Err(VisionError::Config(format!(
            "no template labelled '{}' in {:?} (known: {})",
            label,
            config.templates.directory,
            known.join(", ")
        )));
    }

    let matcher = TemplateMatcher::new(config.templates.strategy);
    let threshold = config.templates.threshold;
    if !all {
        return Ok(matcher.match_best(frame, variants, threshold)?.into_iter().collect());
    }
    let mut found = Vec::new();
    for template in variants {
        found.extend(matcher.match_all(frame, template, threshold, config.templates.min_separation)?);
    }
    found.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(found)
}

fn record_debug(config: &AppConfig, tag: &str, frame: &RgbImage, matches: &[MatchResult]) -> VisionResult<()> {
    if let Some(dir) = &config.debug.artifact_dir {
        let mut sink = DirectoryDebugSink::new(dir)?;
        sink.record(tag, frame, matches)?;
    }
    Ok(())
}
