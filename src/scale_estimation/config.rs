//! Configuration for reference-shape detection and scale fitting

use crate::error::{VisionError, VisionResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleEstimatorConfig {
    /// Inclusive lower RGB bound of the reference shape's colour
    pub color_lower: [u8; 3],
    /// Inclusive upper RGB bound of the reference shape's colour
    pub color_upper: [u8; 3],
    /// Minimum pixel count of a component
    pub min_area: u32,
    /// Bounding box width and height must lie in `[min_size, max_size]`
    pub min_size: u32,
    pub max_size: u32,
    /// Bounding box aspect (width / height) range
    pub min_aspect: f64,
    pub max_aspect: f64,
    /// Components whose box comes closer than this to a frame edge are treated as clipped
    pub edge_margin: u32,
    /// Size of the reference shape at scale 1.0
    pub reference_width: u32,
    pub reference_height: u32,
    /// Relative band around the median scale that counts as agreement
    pub agreement_band: f64,
    /// Estimates whose agreeing fraction falls below this are discarded
    pub min_confidence: f64,
}

impl Default for ScaleEstimatorConfig {
    fn default() -> Self {
        Self {
            color_lower: [180, 140, 40],
            color_upper: [255, 210, 120],
            min_area: 150,
            min_size: 16,
            max_size: 600,
            min_aspect: 0.5,
            max_aspect: 2.0,
            edge_margin: 8,
            reference_width: 130,
            reference_height: 130,
            agreement_band: 0.15,
            min_confidence: 0.5,
        }
    }
}

impl ScaleEstimatorConfig {
    /// Reject settings that can never produce a meaningful estimate.
    pub fn validate(&self) -> VisionResult<()> {
        if self
            .color_lower
            .iter()
            .zip(&self.color_upper)
            .any(|(lo, hi)| lo > hi)
        {
            return Err(VisionError::Config(format!(
                "scale colour range is empty: lower {:?} exceeds upper {:?}",
                self.color_lower, self.color_upper
            )));
        }
        if self.min_size == 0 || self.min_size > self.max_size {
            return Err(VisionError::Config(format!(
                "scale size range [{}, {}] is invalid",
                self.min_size, self.max_size
            )));
        }
        if !(self.min_aspect > 0.0 && self.min_aspect <= self.max_aspect) {
            return Err(VisionError::Config(format!(
                "scale aspect range [{}, {}] is invalid",
                self.min_aspect, self.max_aspect
            )));
        }
        if self.reference_width == 0 || self.reference_height == 0 {
            return Err(VisionError::Config(
                "reference shape dimensions must be positive".to_string(),
            ));
        }
        if !(self.agreement_band > 0.0) {
            return Err(VisionError::Config(format!(
                "agreement band must be positive, got {}",
                self.agreement_band
            )));
        }
        if !(self.min_confidence > 0.0 && self.min_confidence <= 1.0) {
            return Err(VisionError::Config(format!(
                "min confidence must be in (0, 1], got {}",
                self.min_confidence
            )));
        }
        Ok(())
    }

    /// Whether a pixel falls inside the inclusive colour box.
    pub fn color_matches(&self, rgb: [u8; 3]) -> bool {
        (0..3).all(|c| rgb[c] >= self.color_lower[c] && rgb[c] <= self.color_upper[c])
    }
}
