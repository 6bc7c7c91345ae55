pub mod adb;
pub mod config;
pub mod error;
pub mod game_automation;
pub mod scale_estimation;
pub mod template_matching;

pub use adb::{AdbBackend, BackendKind};
pub use config::AppConfig;
pub use error::{VisionError, VisionResult};
