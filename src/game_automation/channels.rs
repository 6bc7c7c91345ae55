// Communication channels for the calibration loop
use super::types::{CalibrationCommand, CalibrationEvent};
use tokio::sync::mpsc;

/// Helper function to create calibration channels
pub fn create_calibration_channels() -> (
    mpsc::Sender<CalibrationCommand>,
    mpsc::Receiver<CalibrationCommand>,
    mpsc::Sender<CalibrationEvent>,
    mpsc::Receiver<CalibrationEvent>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let (event_tx, event_rx) = mpsc::channel(256);
    (cmd_tx, cmd_rx, event_tx, event_rx)
}
