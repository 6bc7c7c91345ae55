use std::path::PathBuf;
use thiserror::Error;

/// A specialized `Result` type for vision and calibration operations.
pub type VisionResult<T> = Result<T, VisionError>;

/// The error type for the matcher, the scale estimator and the calibration loop.
///
/// "Nothing found" is not an error: the matcher returns `None` and the
/// estimator returns `None`. Only malformed input, configuration problems and
/// the two I/O adapters (frame source, actuator) produce a `VisionError`.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Template '{label}' is empty ({width}x{height})")]
    EmptyTemplate {
        label: String,
        width: u32,
        height: u32,
    },

    #[error("Template '{label}' has no contrast and cannot be correlated")]
    FlatTemplate { label: String },

    #[error(
        "Frame {frame_width}x{frame_height} is smaller than template '{label}' ({template_width}x{template_height})"
    )]
    FrameTooSmall {
        label: String,
        frame_width: u32,
        frame_height: u32,
        template_width: u32,
        template_height: u32,
    },

    #[error("Template crop [{x},{y},{width},{height}] exceeds image bounds {image_width}x{image_height} in {path:?}")]
    CropOutOfBounds {
        path: PathBuf,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("Template directory not found: {0:?}")]
    TemplateDirNotFound(PathBuf),

    #[error("Failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Device error: {0}")]
    Device(#[from] crate::adb::AdbError),

    #[error("Frame acquisition failed: {0}")]
    Acquisition(String),

    #[error("Zoom actuation failed: {0}")]
    Actuation(String),
}
