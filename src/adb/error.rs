use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` type for ADB operations.
pub type AdbResult<T> = Result<T, AdbError>;

/// The error type for all ADB-related operations.
#[derive(Debug, Error)]
pub enum AdbError {
    #[error(
        "'adb' binary not usable: {reason}. Install Android Platform Tools or run with --impl=rust."
    )]
    AdbUnavailable { reason: String },

    #[error("Failed to run '{command}': {source}")]
    SpawnFailed {
        command: String,
        source: std::io::Error,
    },

    #[error("'{command}' exited with failure: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Failed to query devices from ADB server: {source}")]
    DeviceEnumerationFailed {
        #[from]
        source: adb_client::RustADBError,
    },

    #[error("Failed to connect to device '{name}': {reason}")]
    ConnectionFailed { name: String, reason: String },

    #[error("No devices available")]
    NoDevices,

    #[error("Device '{name}' not found")]
    DeviceNotFound { name: String },

    #[error("Shell command '{command}' failed: {source}")]
    ShellCommandFailed {
        command: String,
        source: adb_client::RustADBError,
    },

    #[error("Operation timed out after {duration:?}: {description}")]
    Timeout {
        duration: Duration,
        description: String,
    },

    #[error("Task failed to complete: {source}")]
    JoinError {
        #[from]
        source: tokio::task::JoinError,
    },

    #[error("Could not parse screen size from 'wm size' output")]
    ScreenSizeParseFailed,

    #[error("Coordinates are out of bounds: x={x}, y={y} (screen {width}x{height})")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    #[error("Empty shell command")]
    EmptyCommand,
}

impl AdbError {
    /// Errors that usually mean the device went away rather than a bad request.
    pub fn is_disconnect(&self) -> bool {
        match self {
            AdbError::Timeout { .. } | AdbError::NoDevices | AdbError::DeviceNotFound { .. } => true,
            AdbError::ShellCommandFailed { source, .. } => {
                is_disconnect_message(&source.to_string())
            }
            AdbError::CommandFailed { stderr, .. } => is_disconnect_message(stderr),
            _ => false,
        }
    }
}

pub(crate) fn is_disconnect_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["device offline", "not found", "no devices", "broken pipe", "connection reset"]
        .iter()
        .any(|needle| lower.contains(needle))
}
