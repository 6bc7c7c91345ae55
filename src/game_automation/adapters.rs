// Device- and file-backed implementations of the calibration traits
use super::types::{Actuator, FrameSource, ZoomDirection};
use crate::adb::{AdbBackend, AdbResult};
use crate::error::{VisionError, VisionResult};
use crate::template_matching::MatchResult;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Android keycodes for the zoom keys.
pub const KEYCODE_ZOOM_IN: u32 = 168;
pub const KEYCODE_ZOOM_OUT: u32 = 169;

fn decode_frame(bytes: &[u8]) -> VisionResult<RgbImage> {
    let frame = image::load_from_memory(bytes)
        .map_err(|e| VisionError::Acquisition(format!("undecodable screenshot: {e}")))?
        .to_rgb8();
    if frame.width() == 0 || frame.height() == 0 {
        return Err(VisionError::Acquisition("empty screenshot".to_string()));
    }
    Ok(frame)
}

/// Screenshots from a connected device.
pub struct AdbFrameSource {
    backend: Arc<AdbBackend>,
    captured: u64,
}

impl AdbFrameSource {
    pub fn new(backend: Arc<AdbBackend>) -> Self {
        Self {
            backend,
            captured: 0,
        }
    }
}

impl FrameSource for AdbFrameSource {
    async fn capture_frame(&mut self) -> VisionResult<RgbImage> {
        let capture = self
            .backend
            .screen_capture()
            .await
            .map_err(|e| VisionError::Acquisition(e.to_string()))?;
        self.captured += 1;
        log::debug!(
            "📸 Capture #{} from {}: {} bytes in {}ms",
            self.captured,
            self.backend.device_name(),
            capture.bytes.len(),
            capture.duration_ms
        );
        decode_frame(&capture.bytes)
    }
}

/// Reads an image file on every capture; for offline runs against saved screenshots.
pub struct FileFrameSource {
    path: PathBuf,
}

impl FileFrameSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl FrameSource for FileFrameSource {
    async fn capture_frame(&mut self) -> VisionResult<RgbImage> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| VisionError::Acquisition(format!("{:?}: {e}", self.path)))?;
        decode_frame(&bytes)
    }
}

/// How a zoom step is performed on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ZoomGesture {
    /// `input keyevent <code>`
    KeyEvent { zoom_in: u32, zoom_out: u32 },
    /// Device-side command lines, e.g. a scripted pinch via `input motionevent`
    Shell {
        zoom_in: Vec<String>,
        zoom_out: Vec<String>,
    },
    /// `input swipe x1 y1 x2 y2 duration`, e.g. dragging a zoom slider.
    /// Each path is `[x1, y1, x2, y2]` in screen pixels.
    Swipe {
        zoom_in: [u32; 4],
        zoom_out: [u32; 4],
        duration_ms: u32,
    },
}

impl Default for ZoomGesture {
    fn default() -> Self {
        ZoomGesture::KeyEvent {
            zoom_in: KEYCODE_ZOOM_IN,
            zoom_out: KEYCODE_ZOOM_OUT,
        }
    }
}

impl ZoomGesture {
    pub fn validate(&self) -> VisionResult<()> {
        match self {
            ZoomGesture::Shell { zoom_in, zoom_out } if zoom_in.is_empty() || zoom_out.is_empty() => {
                Err(VisionError::Config(
                    "shell zoom gesture needs both zoom_in and zoom_out commands".to_string(),
                ))
            }
            ZoomGesture::Swipe { duration_ms: 0, .. } => Err(VisionError::Config(
                "swipe zoom gesture needs a duration_ms above 0".to_string(),
            )),
            ZoomGesture::Swipe { zoom_in, zoom_out, .. } if zoom_in == zoom_out => {
                Err(VisionError::Config(
                    "swipe zoom gesture uses the same path for both directions".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// The device input that performs one step in `direction`.
    pub fn step(&self, direction: ZoomDirection) -> ZoomStep<'_> {
        let zoom_in = direction == ZoomDirection::ZoomIn;
        match self {
            ZoomGesture::KeyEvent {
                zoom_in: i,
                zoom_out: o,
            } => ZoomStep::Key(if zoom_in { *i } else { *o }),
            ZoomGesture::Shell {
                zoom_in: i,
                zoom_out: o,
            } => ZoomStep::Shell(if zoom_in { i.as_slice() } else { o.as_slice() }),
            ZoomGesture::Swipe {
                zoom_in: i,
                zoom_out: o,
                duration_ms,
            } => ZoomStep::Swipe {
                path: if zoom_in { *i } else { *o },
                duration_ms: *duration_ms,
            },
        }
    }
}

/// A single zoom input, resolved from a [`ZoomGesture`] and a direction.
#[derive(Debug, Clone, PartialEq)]
pub enum ZoomStep<'a> {
    Key(u32),
    Shell(&'a [String]),
    Swipe { path: [u32; 4], duration_ms: u32 },
}

/// Zoom actuator dispatching through ADB.
pub struct AdbZoomActuator {
    backend: Arc<AdbBackend>,
    gesture: ZoomGesture,
}

impl AdbZoomActuator {
    pub fn new(backend: Arc<AdbBackend>, gesture: ZoomGesture) -> VisionResult<Self> {
        gesture.validate()?;
        Ok(Self { backend, gesture })
    }

    async fn dispatch(&self, direction: ZoomDirection) -> AdbResult<()> {
        match self.gesture.step(direction) {
            ZoomStep::Key(code) => self.backend.key_event(code).await,
            ZoomStep::Shell(command) => self.backend.shell(command).await.map(|_| ()),
            ZoomStep::Swipe {
                path: [x1, y1, x2, y2],
                duration_ms,
            } => self.backend.swipe(x1, y1, x2, y2, Some(duration_ms)).await,
        }
    }
}

impl Actuator for AdbZoomActuator {
    async fn zoom(&mut self, direction: ZoomDirection) -> VisionResult<()> {
        self.dispatch(direction)
            .await
            .map_err(|e| VisionError::Actuation(e.to_string()))
    }
}

/// Tap the centre of a match. Returns the tapped point.
pub async fn tap_match(backend: &AdbBackend, found: &MatchResult) -> AdbResult<(u32, u32)> {
    let (x, y) = found.center();
    backend.tap(x, y).await?;
    log::info!("✅ Tapped {} at ({}, {})", found.label, x, y);
    Ok((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_gesture_default_uses_zoom_keycodes() {
        assert_eq!(
            ZoomGesture::default(),
            ZoomGesture::KeyEvent {
                zoom_in: 168,
                zoom_out: 169
            }
        );
    }

    #[test]
    fn test_shell_gesture_needs_both_commands() {
        let gesture = ZoomGesture::Shell {
            zoom_in: vec!["input".into(), "keyevent".into(), "168".into()],
            zoom_out: Vec::new(),
        };
        assert!(matches!(gesture.validate(), Err(VisionError::Config(_))));
    }

    #[test]
    fn test_gesture_from_toml() {
        let gesture: ZoomGesture = toml::from_str(
            "kind = \"shell\"\nzoom_in = [\"sh\", \"/sdcard/pinch_out.sh\"]\nzoom_out = [\"sh\", \"/sdcard/pinch_in.sh\"]\n",
        )
        .unwrap();
        assert!(matches!(gesture, ZoomGesture::Shell { ref zoom_in, .. } if zoom_in.len() == 2));
    }

    #[test]
    fn test_swipe_gesture_from_toml() {
        let gesture: ZoomGesture = toml::from_str(
            "kind = \"swipe\"\nzoom_in = [540, 1500, 540, 900]\nzoom_out = [540, 900, 540, 1500]\nduration_ms = 300\n",
        )
        .unwrap();
        gesture.validate().unwrap();
        assert_eq!(
            gesture.step(ZoomDirection::ZoomIn),
            ZoomStep::Swipe {
                path: [540, 1500, 540, 900],
                duration_ms: 300
            }
        );
        assert_eq!(
            gesture.step(ZoomDirection::ZoomOut),
            ZoomStep::Swipe {
                path: [540, 900, 540, 1500],
                duration_ms: 300
            }
        );
    }

    #[test]
    fn test_step_follows_direction_for_every_gesture() {
        let keys = ZoomGesture::default();
        assert_eq!(keys.step(ZoomDirection::ZoomIn), ZoomStep::Key(KEYCODE_ZOOM_IN));
        assert_eq!(keys.step(ZoomDirection::ZoomOut), ZoomStep::Key(KEYCODE_ZOOM_OUT));

        let shell = ZoomGesture::Shell {
            zoom_in: vec!["sh".into(), "in.sh".into()],
            zoom_out: vec!["sh".into(), "out.sh".into()],
        };
        let ZoomStep::Shell(command) = shell.step(ZoomDirection::ZoomOut) else {
            panic!("shell gesture should give a shell step");
        };
        assert_eq!(command, ["sh".to_string(), "out.sh".to_string()]);
    }

    #[test]
    fn test_swipe_gesture_validation() {
        let zero = ZoomGesture::Swipe {
            zoom_in: [0, 10, 0, 0],
            zoom_out: [0, 0, 0, 10],
            duration_ms: 0,
        };
        assert!(matches!(zero.validate(), Err(VisionError::Config(_))));

        let same = ZoomGesture::Swipe {
            zoom_in: [5, 5, 50, 50],
            zoom_out: [5, 5, 50, 50],
            duration_ms: 200,
        };
        assert!(matches!(same.validate(), Err(VisionError::Config(_))));
    }

    #[tokio::test]
    async fn test_file_frame_source_reads_and_reports_missing() {
        let dir = std::env::temp_dir().join(format!("avc-frames-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("frame.png");
        RgbImage::from_pixel(12, 7, Rgb([1, 2, 3])).save(&path).unwrap();

        let mut source = FileFrameSource::new(&path);
        let frame = source.capture_frame().await.unwrap();
        assert_eq!(frame.dimensions(), (12, 7));
        assert_eq!(*frame.get_pixel(3, 3), Rgb([1, 2, 3]));

        let mut missing = FileFrameSource::new(dir.join("nope.png"));
        assert!(matches!(
            missing.capture_frame().await,
            Err(VisionError::Acquisition(_))
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_frame(b"not an image"),
            Err(VisionError::Acquisition(_))
        ));
    }
}
