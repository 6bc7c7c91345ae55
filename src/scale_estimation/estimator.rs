/// Scale estimation from reference-shape instances
///
/// Colour segmentation, 8-connected components, geometric filtering and a
/// median fit with an agreement-based confidence.
use super::config::ScaleEstimatorConfig;
use crate::error::VisionResult;
use image::{GrayImage, Luma, RgbImage};
use imageproc::region_labelling::{Connectivity, connected_components};
use serde::Serialize;
use std::time::Instant;

/// A scale measurement. `scale` is relative to the reference shape size
/// (1.0 = reference zoom level) and always positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaleEstimate {
    pub scale: f64,
    /// Fraction of candidates agreeing with the fitted scale, in (0, 1]
    pub confidence: f64,
    /// Candidates that survived filtering
    pub instances: usize,
    /// Candidates used for the fitted scale
    pub inliers: usize,
}

/// One connected component that passed the geometric filters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShapeCandidate {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub area: u32,
    pub scale: f64,
}

/// Anything that turns a frame into an optional scale measurement.
pub trait ScaleMeasure {
    fn measure(&self, frame: &RgbImage) -> Option<ScaleEstimate>;
}

#[derive(Debug, Clone, Copy)]
struct ComponentBounds {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    area: u32,
}

impl ComponentBounds {
    fn new(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            area: 0,
        }
    }

    fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.area += 1;
    }

    fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}

#[derive(Debug, Clone)]
pub struct ScaleEstimator {
    config: ScaleEstimatorConfig,
}

impl ScaleEstimator {
    pub fn new(config: ScaleEstimatorConfig) -> VisionResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScaleEstimatorConfig {
        &self.config
    }

    /// Binary mask of pixels inside the configured colour box (255 = inside).
    pub fn segment(&self, frame: &RgbImage) -> GrayImage {
        GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
            if self.config.color_matches(frame.get_pixel(x, y).0) {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        })
    }

    /// Components of the segmented frame that look like unclipped reference shapes.
    pub fn detect_candidates(&self, frame: &RgbImage) -> Vec<ShapeCandidate> {
        let mask = self.segment(frame);
        let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

        let mut components: Vec<Option<ComponentBounds>> = Vec::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let id = label[0] as usize;
            if id == 0 {
                continue;
            }
            if components.len() <= id {
                components.resize(id + 1, None);
            }
            components[id]
                .get_or_insert_with(|| ComponentBounds::new(x, y))
                .include(x, y);
        }

        let (frame_w, frame_h) = frame.dimensions();
        components
            .into_iter()
            .flatten()
            .filter(|c| self.accepts(c, frame_w, frame_h))
            .map(|c| ShapeCandidate {
                x: c.min_x,
                y: c.min_y,
                width: c.width(),
                height: c.height(),
                area: c.area,
                scale: self.scale_of(c.width(), c.height()),
            })
            .collect()
    }

    fn accepts(&self, c: &ComponentBounds, frame_w: u32, frame_h: u32) -> bool {
        let cfg = &self.config;
        let (w, h) = (c.width(), c.height());
        if c.area < cfg.min_area {
            return false;
        }
        if w < cfg.min_size || w > cfg.max_size || h < cfg.min_size || h > cfg.max_size {
            return false;
        }
        let aspect = w as f64 / h as f64;
        if aspect < cfg.min_aspect || aspect > cfg.max_aspect {
            return false;
        }
        let margin = cfg.edge_margin;
        c.min_x >= margin
            && c.min_y >= margin
            && c.max_x + margin < frame_w
            && c.max_y + margin < frame_h
    }

    fn scale_of(&self, width: u32, height: u32) -> f64 {
        let sx = width as f64 / self.config.reference_width as f64;
        let sy = height as f64 / self.config.reference_height as f64;
        (sx + sy) / 2.0
    }

    /// Estimate the current zoom scale, or `None` when no trustworthy
    /// measurement exists in this frame.
    pub fn estimate_scale(&self, frame: &RgbImage) -> Option<ScaleEstimate> {
        let start_time = Instant::now();
        let candidates = self.detect_candidates(frame);
        let estimate = fit_scale(
            candidates.iter().map(|c| c.scale).collect(),
            self.config.agreement_band,
        );
        log::debug!(
            "📏 {} candidate(s), estimate {:?} in {}ms",
            candidates.len(),
            estimate,
            start_time.elapsed().as_millis()
        );
        match estimate {
            Some(e) if e.confidence >= self.config.min_confidence => Some(e),
            Some(e) => {
                log::debug!(
                    "📏 Discarding estimate {:.3}: confidence {:.2} below {:.2}",
                    e.scale,
                    e.confidence,
                    self.config.min_confidence
                );
                None
            }
            None => None,
        }
    }

    /// Expected pixel size of the reference shape at `scale`.
    pub fn approximate_dimensions(&self, scale: f64) -> (u32, u32) {
        let w = (self.config.reference_width as f64 * scale).round().max(0.0);
        let h = (self.config.reference_height as f64 * scale).round().max(0.0);
        (w as u32, h as u32)
    }
}

impl ScaleMeasure for ScaleEstimator {
    fn measure(&self, frame: &RgbImage) -> Option<ScaleEstimate> {
        self.estimate_scale(frame)
    }
}

/// Median-anchored fit: candidates within `band * median` of the median are
/// inliers, the scale is their mean and the confidence their share.
pub fn fit_scale(mut scales: Vec<f64>, band: f64) -> Option<ScaleEstimate> {
    scales.retain(|s| s.is_finite() && *s > 0.0);
    if scales.is_empty() {
        return None;
    }
    scales.sort_by(|a, b| a.total_cmp(b));
    let n = scales.len();
    let median = if n % 2 == 1 {
        scales[n / 2]
    } else {
        (scales[n / 2 - 1] + scales[n / 2]) / 2.0
    };

    let limit = band * median;
    let inliers: Vec<f64> = scales
        .iter()
        .copied()
        .filter(|s| (s - median).abs() <= limit)
        .collect();
    if inliers.is_empty() {
        return None;
    }
    let scale = inliers.iter().sum::<f64>() / inliers.len() as f64;
    Some(ScaleEstimate {
        scale,
        confidence: inliers.len() as f64 / n as f64,
        instances: n,
        inliers: inliers.len(),
    })
}
