use super::error::{AdbError, AdbResult};
use super::rust_impl::RustAdb;
use super::shell::AdbShell;
use super::types::{AdbClient, Device, ImageCapture};
use serde::{Deserialize, Serialize};

/// Which ADB implementation to drive the device with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// `adb_client` talking to the ADB server directly
    #[default]
    Rust,
    /// External `adb` binary
    Shell,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rust" => Ok(BackendKind::Rust),
            "shell" => Ok(BackendKind::Shell),
            other => Err(format!("unknown backend '{other}' (expected 'rust' or 'shell')")),
        }
    }
}

pub enum AdbBackend {
    Shell(AdbShell),
    Rust(RustAdb),
}

impl AdbBackend {
    pub async fn list_devices(kind: BackendKind) -> AdbResult<Vec<Device>> {
        match kind {
            BackendKind::Rust => <RustAdb as AdbClient>::list_devices().await,
            BackendKind::Shell => AdbShell::list_devices().await,
        }
    }

    pub async fn connect_first(kind: BackendKind) -> AdbResult<Self> {
        let devices = Self::list_devices(kind).await?;
        let first = devices.into_iter().next().ok_or(AdbError::NoDevices)?;
        Self::new_with_device(&first.name, kind).await
    }

    pub async fn new_with_device(name: &str, kind: BackendKind) -> AdbResult<Self> {
        match kind {
            BackendKind::Rust => Ok(AdbBackend::Rust(
                <RustAdb as AdbClient>::new_with_device(name).await?,
            )),
            BackendKind::Shell => Ok(AdbBackend::Shell(AdbShell::new_with_device(name).await?)),
        }
    }

    /// Connect to `serial` when given, otherwise to the first listed device.
    pub async fn connect(serial: Option<&str>, kind: BackendKind) -> AdbResult<Self> {
        match serial {
            Some(name) => Self::new_with_device(name, kind).await,
            None => Self::connect_first(kind).await,
        }
    }

    pub fn device_name(&self) -> &str {
        match self {
            AdbBackend::Shell(s) => s.device_name(),
            AdbBackend::Rust(r) => r.device_name(),
        }
    }

    pub fn screen_dimensions(&self) -> (u32, u32) {
        match self {
            AdbBackend::Shell(s) => s.screen_dimensions(),
            AdbBackend::Rust(r) => r.screen_dimensions(),
        }
    }

    pub fn transport_id(&self) -> Option<u32> {
        match self {
            AdbBackend::Shell(s) => s.transport_id(),
            AdbBackend::Rust(r) => r.transport_id(),
        }
    }

    pub async fn screen_capture(&self) -> AdbResult<ImageCapture> {
        match self {
            AdbBackend::Shell(s) => s.screen_capture().await,
            AdbBackend::Rust(r) => r.screen_capture().await,
        }
    }

    pub async fn screen_capture_bytes(&self) -> AdbResult<Vec<u8>> {
        match self {
            AdbBackend::Shell(s) => s.screen_capture_bytes().await,
            AdbBackend::Rust(r) => r.screen_capture_bytes().await,
        }
    }

    pub async fn tap(&self, x: u32, y: u32) -> AdbResult<()> {
        match self {
            AdbBackend::Shell(s) => s.tap(x, y).await,
            AdbBackend::Rust(r) => r.tap(x, y).await,
        }
    }

    pub async fn swipe(
        &self,
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
        duration: Option<u32>,
    ) -> AdbResult<()> {
        match self {
            AdbBackend::Shell(s) => s.swipe(x1, y1, x2, y2, duration).await,
            AdbBackend::Rust(r) => r.swipe(x1, y1, x2, y2, duration).await,
        }
    }

    pub async fn key_event(&self, code: u32) -> AdbResult<()> {
        match self {
            AdbBackend::Shell(s) => s.key_event(code).await,
            AdbBackend::Rust(r) => r.key_event(code).await,
        }
    }

    pub async fn shell(&self, args: &[String]) -> AdbResult<String> {
        match self {
            AdbBackend::Shell(s) => s.shell(args).await,
            AdbBackend::Rust(r) => r.shell(args).await,
        }
    }
}

impl AdbClient for AdbBackend {
    async fn list_devices() -> AdbResult<Vec<Device>>
    where
        Self: Sized,
    {
        AdbBackend::list_devices(BackendKind::default()).await
    }

    async fn new_with_device(device_name: &str) -> AdbResult<Self>
    where
        Self: Sized,
    {
        AdbBackend::new_with_device(device_name, BackendKind::default()).await
    }

    async fn screen_capture_bytes(&self) -> AdbResult<Vec<u8>> {
        self.screen_capture_bytes().await
    }

    async fn tap(&self, x: u32, y: u32) -> AdbResult<()> {
        self.tap(x, y).await
    }

    async fn swipe(
        &self,
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
        duration: Option<u32>,
    ) -> AdbResult<()> {
        self.swipe(x1, y1, x2, y2, duration).await
    }

    async fn key_event(&self, code: u32) -> AdbResult<()> {
        self.key_event(code).await
    }

    async fn shell(&self, args: &[String]) -> AdbResult<String> {
        self.shell(args).await
    }

    fn screen_dimensions(&self) -> (u32, u32) {
        self.screen_dimensions()
    }

    fn device_name(&self) -> &str {
        self.device_name()
    }

    fn transport_id(&self) -> Option<u32> {
        self.transport_id()
    }
}
