// ADB module - Android Debug Bridge access for screen capture and input.
// Two interchangeable backends: the external `adb` binary and the
// `adb_client` crate talking to the ADB server.

pub mod backend;
pub mod error;
pub mod rust_impl;
pub mod shell;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export the main types and functions for easy access
pub use backend::{AdbBackend, BackendKind};
pub use error::{AdbError, AdbResult};
pub use types::{AdbClient, Device, ImageCapture};
