/// Template matching data types
use crate::error::{VisionError, VisionResult};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A labelled reference image. Several templates may share a label
/// (variants of the same button in different states).
#[derive(Clone, Debug)]
pub struct Template {
    /// Logical name (e.g. "castle", "rally_button")
    pub label: String,
    /// Variant name when a label has several images
    pub variant: Option<String>,
    /// Reference pixels (RGB)
    pub image: RgbImage,
    /// Overrides the caller's threshold for this template
    pub threshold: Option<f32>,
    /// File the template was loaded from
    pub source: Option<PathBuf>,
}

impl Template {
    pub fn new(label: impl Into<String>, image: RgbImage) -> VisionResult<Self> {
        let label = label.into();
        if image.width() == 0 || image.height() == 0 {
            return Err(VisionError::EmptyTemplate {
                label,
                width: image.width(),
                height: image.height(),
            });
        }
        Ok(Self {
            label,
            variant: None,
            image,
            threshold: None,
            source: None,
        })
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_source(mut self, source: PathBuf) -> Self {
        self.source = Some(source);
        self
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Threshold that applies to this template for a call using `default`.
    pub fn effective_threshold(&self, default: f32) -> f32 {
        self.threshold.unwrap_or(default)
    }

    /// Get the template name for display
    pub fn display_name(&self) -> String {
        match &self.variant {
            Some(variant) => format!("{}@{} ({}x{})", self.label, variant, self.width(), self.height()),
            None => format!("{} ({}x{})", self.label, self.width(), self.height()),
        }
    }
}

/// A located template instance.
///
/// The box is the matched template's own size placed at `top_left`; scores are
/// ZNCC values in `[-1, 1]` where higher is better.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchResult {
    pub label: String,
    pub top_left: (u32, u32),
    pub bottom_right: (u32, u32),
    pub score: f32,
    pub template_size: (u32, u32),
}

impl MatchResult {
    pub fn new(template: &Template, x: u32, y: u32, score: f32) -> Self {
        let (w, h) = (template.width(), template.height());
        Self {
            label: template.label.clone(),
            top_left: (x, y),
            bottom_right: (x + w, y + h),
            score,
            template_size: (w, h),
        }
    }

    /// Tap coordinates at the center of this match
    pub fn center(&self) -> (u32, u32) {
        (
            self.top_left.0 + self.template_size.0 / 2,
            self.top_left.1 + self.template_size.1 / 2,
        )
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at ({},{})-({},{}) score={:.3}",
            self.label,
            self.top_left.0,
            self.top_left.1,
            self.bottom_right.0,
            self.bottom_right.1,
            self.score
        )
    }
}

/// How the response surface is explored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SearchStrategy {
    /// Score every integer offset at full resolution.
    Exhaustive,
    /// Coarse-to-fine search over 2x downsampled levels. Levels are added
    /// while the coarsest template side stays at or above `min_template_side`.
    ///
    /// With `exact` set the results equal [`SearchStrategy::Exhaustive`]:
    /// `match_best` accepts a refined candidate only when it correlates
    /// perfectly and otherwise confirms with a full-resolution scan, and
    /// `match_all` always scans every cell. Clearing `exact` trades that
    /// guarantee for speed.
    Pyramid {
        max_levels: u32,
        min_template_side: u32,
        /// Upper bound on coarse candidates refined when `exact` is off.
        max_candidates: usize,
        /// Coarse scores are accepted this far below the final threshold.
        coarse_slack: f32,
        #[serde(default = "default_exact")]
        exact: bool,
    },
}

fn default_exact() -> bool {
    true
}

impl SearchStrategy {
    /// Whether results may differ from an exhaustive scan.
    pub fn is_approximate(&self) -> bool {
        matches!(self, SearchStrategy::Pyramid { exact: false, .. })
    }
}

impl Default for SearchStrategy {
    fn default() -> Self {
        SearchStrategy::Pyramid {
            max_levels: 4,
            min_template_side: 12,
            max_candidates: 512,
            coarse_slack: 0.25,
            exact: true,
        }
    }
}
