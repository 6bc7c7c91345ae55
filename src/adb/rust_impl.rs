// https://crates.io/crates/adb_client
use super::error::{AdbError, AdbResult};
use super::types::{AdbClient, Device, parse_screen_size};
use adb_client::{ADBDeviceExt, ADBServer, ADBServerDevice};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const SHELL_TIMEOUT: Duration = Duration::from_secs(5);
// Full-resolution captures over USB can be slow
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

/// Backend talking to the ADB server through the `adb_client` crate.
pub struct RustAdb {
    device: Device,
    server_device: Arc<Mutex<ADBServerDevice>>,
    screen_x: u32,
    screen_y: u32,
}

impl RustAdb {
    /// Run a device shell command on the blocking pool, bounded by `timeout`.
    async fn blocking_shell(&self, args: Vec<String>, timeout: Duration) -> AdbResult<Vec<u8>> {
        let server_device = Arc::clone(&self.server_device);
        let command = args.join(" ");
        let description = command.clone();
        let task = tokio::task::spawn_blocking(move || -> AdbResult<Vec<u8>> {
            let mut out: Vec<u8> = Vec::new();
            let mut dev = server_device.blocking_lock();
            let refs: Vec<&str> = args.iter().map(String::as_str).collect();
            dev.shell_command(&refs, &mut out)
                .map_err(|source| AdbError::ShellCommandFailed { command, source })?;
            Ok(out)
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(joined) => joined?,
            Err(_) => Err(AdbError::Timeout {
                duration: timeout,
                description,
            }),
        }
    }

    async fn capture_screen_bytes_internal(&self) -> AdbResult<Vec<u8>> {
        let server_device = Arc::clone(&self.server_device);
        let framebuffer = tokio::task::spawn_blocking(move || {
            let mut dev = server_device.blocking_lock();
            dev.framebuffer_bytes()
        })
        .await?;

        match framebuffer {
            Ok(bytes) if bytes.starts_with(b"\x89PNG\r\n\x1a\n") => return Ok(bytes),
            Ok(bytes) => log::debug!(
                "Framebuffer returned {} bytes of unknown format, falling back to screencap",
                bytes.len()
            ),
            Err(e) => log::debug!("Framebuffer capture failed: {}, falling back to screencap", e),
        }

        self.blocking_shell(vec!["screencap".into(), "-p".into()], CAPTURE_TIMEOUT)
            .await
    }

    /// Connect to the first available device
    pub async fn connect_first() -> AdbResult<Self> {
        let devices = <Self as AdbClient>::list_devices().await?;
        let first = devices.into_iter().next().ok_or(AdbError::NoDevices)?;
        <Self as AdbClient>::new_with_device(&first.name).await
    }
}

impl AdbClient for RustAdb {
    async fn list_devices() -> AdbResult<Vec<Device>> {
        let mut server = ADBServer::default();
        let device_list = tokio::task::spawn_blocking(move || server.devices()).await??;
        Ok(device_list
            .into_iter()
            .map(|d| Device {
                name: d.identifier,
                transport_id: None,
            })
            .collect())
    }

    async fn new_with_device(device_name: &str) -> AdbResult<Self> {
        let name = device_name.to_string();
        let mut server = ADBServer::default();
        let opened = tokio::task::spawn_blocking(move || {
            if name.is_empty() {
                server.get_device()
            } else {
                server.get_device_by_name(&name)
            }
        })
        .await?
        .map_err(|e| AdbError::ConnectionFailed {
            name: device_name.to_string(),
            reason: e.to_string(),
        })?;

        let mut adb = RustAdb {
            device: Device {
                name: device_name.to_string(),
                transport_id: None,
            },
            server_device: Arc::new(Mutex::new(opened)),
            screen_x: 0,
            screen_y: 0,
        };
        let out = adb
            .blocking_shell(vec!["wm".into(), "size".into()], SHELL_TIMEOUT)
            .await?;
        (adb.screen_x, adb.screen_y) = parse_screen_size(&String::from_utf8_lossy(&out))?;
        log::info!(
            "📱 Rust backend connected to {} {}x{}",
            adb.device.name,
            adb.screen_x,
            adb.screen_y
        );
        Ok(adb)
    }

    async fn screen_capture_bytes(&self) -> AdbResult<Vec<u8>> {
        match tokio::time::timeout(CAPTURE_TIMEOUT, self.capture_screen_bytes_internal()).await {
            Ok(result) => result,
            Err(_) => Err(AdbError::Timeout {
                duration: CAPTURE_TIMEOUT,
                description: "screen capture (device may be disconnected)".to_string(),
            }),
        }
    }

    async fn tap(&self, x: u32, y: u32) -> AdbResult<()> {
        self.check_bounds(x, y)?;
        self.blocking_shell(
            vec!["input".into(), "tap".into(), x.to_string(), y.to_string()],
            SHELL_TIMEOUT,
        )
        .await
        .map(|_| ())
    }

    async fn swipe(
        &self,
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
        duration: Option<u32>,
    ) -> AdbResult<()> {
        self.check_bounds(x1, y1)?;
        self.check_bounds(x2, y2)?;
        let mut cmd_parts: Vec<String> = vec![
            "input".into(),
            "swipe".into(),
            x1.to_string(),
            y1.to_string(),
            x2.to_string(),
            y2.to_string(),
        ];
        if let Some(d) = duration {
            cmd_parts.push(d.to_string());
        }
        self.blocking_shell(cmd_parts, SHELL_TIMEOUT).await.map(|_| ())
    }

    async fn key_event(&self, code: u32) -> AdbResult<()> {
        self.blocking_shell(
            vec!["input".into(), "keyevent".into(), code.to_string()],
            SHELL_TIMEOUT,
        )
        .await
        .map(|_| ())
    }

    async fn shell(&self, args: &[String]) -> AdbResult<String> {
        if args.is_empty() {
            return Err(AdbError::EmptyCommand);
        }
        let out = self.blocking_shell(args.to_vec(), SHELL_TIMEOUT).await?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn screen_dimensions(&self) -> (u32, u32) {
        (self.screen_x, self.screen_y)
    }

    fn device_name(&self) -> &str {
        &self.device.name
    }

    fn transport_id(&self) -> Option<u32> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires a running ADB server"]
    async fn rust_adb_list_devices_runs() {
        let result = <RustAdb as AdbClient>::list_devices().await;
        assert!(result.is_ok(), "Expected Ok listing devices, got {:?}", result.err());
    }
}
