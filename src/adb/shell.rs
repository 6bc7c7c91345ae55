use super::error::{AdbError, AdbResult};
use super::types::{AdbClient, Device, parse_screen_size};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `command` to completion, killing it if `timeout` expires first.
async fn output_within(
    mut command: Command,
    description: &str,
    timeout: Duration,
) -> AdbResult<Output> {
    // Dropping the future on timeout must not leave the child running
    command.kill_on_drop(true);
    tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| AdbError::Timeout {
            duration: timeout,
            description: description.to_string(),
        })?
        .map_err(|source| AdbError::SpawnFailed {
            command: description.to_string(),
            source,
        })
}

/// Backend driving the external `adb` binary.
pub struct AdbShell {
    pub device: Device,
    pub transport_id: u32,
    pub screen_x: u32,
    pub screen_y: u32,
}

impl AdbShell {
    async fn ensure_adb_available() -> AdbResult<()> {
        let mut command = Command::new("adb");
        command.arg("version");
        match output_within(command, "adb version", COMMAND_TIMEOUT).await {
            Ok(out) if out.status.success() => Ok(()),
            Ok(out) => Err(AdbError::AdbUnavailable {
                reason: format!("'adb version' returned {}", out.status),
            }),
            Err(AdbError::SpawnFailed { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Err(AdbError::AdbUnavailable {
                    reason: "not found in PATH".to_string(),
                })
            }
            Err(e) => Err(AdbError::AdbUnavailable {
                reason: e.to_string(),
            }),
        }
    }

    /// Run `adb <args>` with a timeout and return stdout.
    async fn run_adb(args: &[String]) -> AdbResult<Vec<u8>> {
        let command = format!("adb {}", args.join(" "));
        let mut adb = Command::new("adb");
        adb.args(args);
        let output = output_within(adb, &command, COMMAND_TIMEOUT).await?;
        if !output.status.success() {
            return Err(AdbError::CommandFailed {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        log::debug!("📟 {} -> {} bytes", command, output.stdout.len());
        Ok(output.stdout)
    }

    /// Run `adb -t <transport> <args>` against this device.
    async fn run_on_device(&self, args: &[&str]) -> AdbResult<Vec<u8>> {
        let mut full = vec!["-t".to_string(), self.transport_id.to_string()];
        full.extend(args.iter().map(|s| s.to_string()));
        Self::run_adb(&full).await
    }

    pub async fn new(transport_id: Option<&str>) -> AdbResult<Self> {
        Self::ensure_adb_available().await?;
        let devices = Self::list_devices().await?;
        if devices.is_empty() {
            return Err(AdbError::NoDevices);
        }
        let device = match transport_id {
            Some(tid) => devices
                .into_iter()
                .find(|d| d.transport_id.as_deref() == Some(tid))
                .ok_or_else(|| AdbError::DeviceNotFound {
                    name: format!("transport_id:{tid}"),
                })?,
            None => devices.into_iter().next().ok_or(AdbError::NoDevices)?,
        };
        let transport_id = device
            .transport_id
            .as_deref()
            .and_then(|t| t.parse::<u32>().ok())
            .ok_or_else(|| AdbError::ConnectionFailed {
                name: device.name.clone(),
                reason: "device has no usable transport_id".to_string(),
            })?;

        let wm = Self::run_adb(&[
            "-t".to_string(),
            transport_id.to_string(),
            "shell".to_string(),
            "wm".to_string(),
            "size".to_string(),
        ])
        .await?;
        let (screen_x, screen_y) = parse_screen_size(&String::from_utf8_lossy(&wm))?;
        log::info!(
            "📱 Shell backend connected to {} (transport {}) {}x{}",
            device.name,
            transport_id,
            screen_x,
            screen_y
        );
        Ok(Self {
            device,
            transport_id,
            screen_x,
            screen_y,
        })
    }

    pub async fn new_with_device(device_name: &str) -> AdbResult<Self> {
        let devices = Self::list_devices().await?;
        if let Some(device) = devices.iter().find(|d| d.name == device_name) {
            return Self::new(device.transport_id.as_deref()).await;
        }
        // Network devices (host:port) may need an explicit connect first
        let out = Self::run_adb(&["connect".to_string(), device_name.to_string()]).await?;
        let stdout = String::from_utf8_lossy(&out);
        if stdout.contains("refused") || stdout.contains("failed") {
            return Err(AdbError::ConnectionFailed {
                name: device_name.to_string(),
                reason: format!("{} (try 'adb tcpip 5555')", stdout.trim()),
            });
        }
        let devices = Self::list_devices().await?;
        match devices.iter().find(|d| d.name == device_name) {
            Some(device) => Self::new(device.transport_id.as_deref()).await,
            None => Err(AdbError::DeviceNotFound {
                name: device_name.to_string(),
            }),
        }
    }

    pub fn parse_devices(output: &str) -> Vec<Device> {
        output
            .lines()
            .skip(1)
            .filter_map(|line| {
                let parts: Vec<&str> = line.split_whitespace().collect();
                if parts.len() >= 2 && parts[1] == "device" {
                    let transport_id = parts
                        .iter()
                        .find_map(|part| part.strip_prefix("transport_id:"))
                        .map(str::to_string);
                    Some(Device {
                        name: parts[0].to_string(),
                        transport_id,
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    pub async fn list_devices() -> AdbResult<Vec<Device>> {
        Self::ensure_adb_available().await?;
        let out = Self::run_adb(&["devices".to_string(), "-l".to_string()]).await?;
        Ok(Self::parse_devices(&String::from_utf8_lossy(&out)))
    }
}

impl AdbClient for AdbShell {
    async fn list_devices() -> AdbResult<Vec<Device>> {
        Self::list_devices().await
    }

    async fn new_with_device(device_name: &str) -> AdbResult<Self> {
        Self::new_with_device(device_name).await
    }

    async fn screen_capture_bytes(&self) -> AdbResult<Vec<u8>> {
        self.run_on_device(&["exec-out", "screencap", "-p"]).await
    }

    async fn tap(&self, x: u32, y: u32) -> AdbResult<()> {
        self.check_bounds(x, y)?;
        let (xs, ys) = (x.to_string(), y.to_string());
        self.run_on_device(&["shell", "input", "tap", &xs, &ys])
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
        let mut parts = vec![
            "shell".to_string(),
            "input".to_string(),
            "swipe".to_string(),
            x1.to_string(),
            y1.to_string(),
            x2.to_string(),
            y2.to_string(),
        ];
        if let Some(d) = duration {
            parts.push(d.to_string());
        }
        let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
        self.run_on_device(&refs).await.map(|_| ())
    }

    async fn key_event(&self, code: u32) -> AdbResult<()> {
        let code = code.to_string();
        self.run_on_device(&["shell", "input", "keyevent", &code])
            .await
            .map(|_| ())
    }

    async fn shell(&self, args: &[String]) -> AdbResult<String> {
        if args.is_empty() {
            return Err(AdbError::EmptyCommand);
        }
        let mut parts = vec!["shell"];
        parts.extend(args.iter().map(String::as_str));
        let out = self.run_on_device(&parts).await?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn screen_dimensions(&self) -> (u32, u32) {
        (self.screen_x, self.screen_y)
    }

    fn device_name(&self) -> &str {
        &self.device.name
    }

    fn transport_id(&self) -> Option<u32> {
        Some(self.transport_id)
    }
}
