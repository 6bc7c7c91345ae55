//! Zoom-scale measurement from a single frame
//!
//! Instances of a fixed reference shape are segmented by colour, filtered by
//! geometry, and their sizes fitted against the shape's size at scale 1.0.

pub mod config;
pub mod estimator;


pub use config::ScaleEstimatorConfig;
pub use estimator::{ScaleEstimate, ScaleEstimator, ScaleMeasure, ShapeCandidate, fit_scale};
