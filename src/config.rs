use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::adb::BackendKind;
use crate::error::{VisionError, VisionResult};
use crate::game_automation::{CalibrationConfig, ZoomGesture};
use crate::scale_estimation::ScaleEstimatorConfig;
use crate::template_matching::SearchStrategy;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "adb-vision.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub templates: TemplatesConfig,
    pub scale: ScaleEstimatorConfig,
    pub calibration: CalibrationConfig,
    pub zoom: ZoomGesture,
    pub debug: DebugConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub backend: BackendKind,
    /// Device serial; the first listed device is used when absent.
    pub serial: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    pub directory: PathBuf,
    /// Default ZNCC threshold in [-1, 1]
    pub threshold: f32,
    /// Minimum distance in pixels between two reported matches of one template
    pub min_separation: u32,
    pub strategy: SearchStrategy,
    /// Per-label threshold overrides
    pub thresholds: HashMap<String, f32>,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("assets/templates"),
            threshold: 0.8,
            min_separation: 10,
            strategy: SearchStrategy::default(),
            thresholds: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Annotated frames are written here when set
    pub artifact_dir: Option<PathBuf>,
}

fn check_threshold(name: &str, value: f32) -> VisionResult<()> {
    if !(-1.0..=1.0).contains(&value) {
        return Err(VisionError::Config(format!(
            "{name} must lie in [-1, 1], got {value}"
        )));
    }
    Ok(())
}

impl AppConfig {
    pub fn from_toml_str(content: &str) -> VisionResult<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or `adb-vision.toml` from the working directory.
    /// A missing default file yields the built-in defaults; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> VisionResult<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        if !explicit && !path.exists() {
            log::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let config = Self::from_toml_str(&content)?;
        log::info!("⚙️ Config loaded from {:?} (backend={:?})", path, config.device.backend);
        Ok(config)
    }

    pub fn validate(&self) -> VisionResult<()> {
        check_threshold("templates.threshold", self.templates.threshold)?;
        for (label, &value) in &self.templates.thresholds {
            check_threshold(&format!("templates.thresholds.{label}"), value)?;
        }
        self.scale.validate()?;
        self.calibration.validate()?;
        self.zoom.validate()
    }
}
