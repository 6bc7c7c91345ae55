// Tests for backend-independent ADB logic

use super::error::{AdbError, AdbResult};
use super::types::{AdbClient, Device, parse_screen_size};
use super::BackendKind;
use std::sync::Mutex;

/// In-memory client recording the commands it receives.
struct FakeClient {
    screen: (u32, u32),
    log: Mutex<Vec<String>>,
}

impl FakeClient {
    fn new(width: u32, height: u32) -> Self {
        Self {
            screen: (width, height),
            log: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, entry: String) {
        if let Ok(mut log) = self.log.lock() {
            log.push(entry);
        }
    }

    fn entries(&self) -> Vec<String> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl AdbClient for FakeClient {
    async fn list_devices() -> AdbResult<Vec<Device>> {
        Ok(vec![Device {
            name: "fake".into(),
            transport_id: Some("1".into()),
        }])
    }

    async fn new_with_device(_device_name: &str) -> AdbResult<Self> {
        Ok(FakeClient::new(1080, 1920))
    }

    async fn screen_capture_bytes(&self) -> AdbResult<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn tap(&self, x: u32, y: u32) -> AdbResult<()> {
        self.check_bounds(x, y)?;
        self.record(format!("tap {x} {y}"));
        Ok(())
    }

    async fn swipe(
        &self,
        x1: u32,
        y1: u32,
        x2: u32,
        y2: u32,
        _duration: Option<u32>,
    ) -> AdbResult<()> {
        self.check_bounds(x1, y1)?;
        self.check_bounds(x2, y2)?;
        self.record(format!("swipe {x1} {y1} {x2} {y2}"));
        Ok(())
    }

    async fn key_event(&self, code: u32) -> AdbResult<()> {
        self.record(format!("keyevent {code}"));
        Ok(())
    }

    async fn shell(&self, args: &[String]) -> AdbResult<String> {
        if args.is_empty() {
            return Err(AdbError::EmptyCommand);
        }
        self.record(args.join(" "));
        Ok(String::new())
    }

    fn screen_dimensions(&self) -> (u32, u32) {
        self.screen
    }

    fn device_name(&self) -> &str {
        "fake"
    }

    fn transport_id(&self) -> Option<u32> {
        Some(1)
    }
}

#[test]
fn test_parse_screen_size_physical() {
    assert_eq!(parse_screen_size("Physical size: 1080x2280\n").unwrap(), (1080, 2280));
}

#[test]
fn test_parse_screen_size_ignores_override() {
    let out = "Physical size: 3840x2160\nOverride size: 1920x1080\n";
    assert_eq!(parse_screen_size(out).unwrap(), (3840, 2160));
}

#[test]
fn test_parse_screen_size_garbage() {
    assert!(matches!(
        parse_screen_size("error: no devices/emulators found"),
        Err(AdbError::ScreenSizeParseFailed)
    ));
    assert!(matches!(
        parse_screen_size("Physical size: axb"),
        Err(AdbError::ScreenSizeParseFailed)
    ));
}

#[test]
fn test_backend_kind_parsing() {
    assert_eq!("rust".parse::<BackendKind>(), Ok(BackendKind::Rust));
    assert_eq!("shell".parse::<BackendKind>(), Ok(BackendKind::Shell));
    assert!("usb".parse::<BackendKind>().is_err());
    assert_eq!(BackendKind::default(), BackendKind::Rust);
}

#[test]
fn test_disconnect_classification() {
    assert!(
        AdbError::CommandFailed {
            command: "adb -t 1 exec-out screencap -p".into(),
            stderr: "error: device offline".into(),
        }
        .is_disconnect()
    );
    assert!(AdbError::NoDevices.is_disconnect());
    assert!(!AdbError::ScreenSizeParseFailed.is_disconnect());
    assert!(!AdbError::EmptyCommand.is_disconnect());
}

#[tokio::test]
async fn test_tap_bounds_checked_before_dispatch() {
    let client = FakeClient::new(100, 200);
    client.tap(50, 60).await.unwrap();
    let err = client.tap(150, 60).await.unwrap_err();
    assert!(matches!(err, AdbError::OutOfBounds { x: 150, .. }));
    assert!(client.swipe(0, 0, 100, 201, Some(300)).await.is_err());
    assert_eq!(client.entries(), vec!["tap 50 60".to_string()]);
}

#[tokio::test]
async fn test_default_screen_capture_wraps_bytes() {
    let client = FakeClient::new(10, 10);
    let capture = client.screen_capture().await.unwrap();
    assert_eq!(capture.bytes.len(), 4);
}

#[tokio::test]
async fn test_key_event_and_shell_are_forwarded() {
    let client = FakeClient::new(10, 10);
    client.key_event(169).await.unwrap();
    client
        .shell(&["input".into(), "swipe".into(), "1".into()])
        .await
        .unwrap();
    assert!(matches!(client.shell(&[]).await, Err(AdbError::EmptyCommand)));
    assert_eq!(client.entries(), vec!["keyevent 169", "input swipe 1"]);
}
