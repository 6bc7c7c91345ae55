// Core ADB types and traits
use super::error::{AdbError, AdbResult};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ImageCapture {
    pub bytes: Vec<u8>,
    pub duration_ms: u128,
}

// Trait defining ADB capabilities (shell or rust implementations)
#[allow(async_fn_in_trait)]
pub trait AdbClient: Send + Sync {
    async fn list_devices() -> AdbResult<Vec<Device>>
    where
        Self: Sized;
    async fn new_with_device(device_name: &str) -> AdbResult<Self>
    where
        Self: Sized;

    /// Encoded screenshot (PNG) straight from the device
    async fn screen_capture_bytes(&self) -> AdbResult<Vec<u8>>;

    async fn screen_capture(&self) -> AdbResult<ImageCapture> {
        let start = std::time::Instant::now();
        let bytes = self.screen_capture_bytes().await?;
        Ok(ImageCapture {
            bytes,
            duration_ms: start.elapsed().as_millis(),
        })
    }

    async fn tap(&self, x: u32, y: u32) -> AdbResult<()>;
    async fn swipe(
        &self,
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
        duration: Option<u32>,
    ) -> AdbResult<()>;
    /// `input keyevent <code>` (e.g. 168 = KEYCODE_ZOOM_IN, 169 = KEYCODE_ZOOM_OUT)
    async fn key_event(&self, code: u32) -> AdbResult<()>;
    /// Run an arbitrary device-side command, returning its stdout.
    async fn shell(&self, args: &[String]) -> AdbResult<String>;

    fn screen_dimensions(&self) -> (u32, u32);
    fn device_name(&self) -> &str;
    fn transport_id(&self) -> Option<u32>;

    fn check_bounds(&self, x: u32, y: u32) -> AdbResult<()> {
        let (width, height) = self.screen_dimensions();
        if x > width || y > height {
            return Err(AdbError::OutOfBounds {
                x,
                y,
                width,
                height,
            });
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Serialize, Clone)]
pub struct Device {
    pub name: String,
    pub transport_id: Option<String>,
}

/// Parse the `Physical size: WxH` line of `wm size`. An override size
/// (`Override size: ...`) is ignored; screenshots use the physical size.
pub fn parse_screen_size(stdout: &str) -> AdbResult<(u32, u32)> {
    for line in stdout.lines() {
        if let Some(size_str) = line.trim().strip_prefix("Physical size: ") {
            let parts: Vec<&str> = size_str.trim().split('x').collect();
            if parts.len() == 2
                && let (Ok(x), Ok(y)) = (parts[0].parse::<u32>(), parts[1].parse::<u32>())
            {
                return Ok((x, y));
            }
        }
    }
    Err(AdbError::ScreenSizeParseFailed)
}
