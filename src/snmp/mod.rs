pub mod agent;
pub mod ber;
pub mod codec;

/// hrDeviceStatus.0
pub const HR_DEVICE_STATUS: [u32; 12] = [1, 3, 6, 1, 2, 1, 25, 3, 2, 1, 5, 0];
/// hrPrinterDetectedErrorState.0
pub const HR_PRINTER_DETECTED_ERROR_STATE: [u32; 12] = [1, 3, 6, 1, 2, 1, 25, 3, 5, 1, 1, 0];
/// hrPrinterStatus.0
pub const HR_PRINTER_STATUS: [u32; 12] = [1, 3, 6, 1, 2, 1, 25, 3, 5, 1, 2, 0];

/// hrDeviceStatus `running(2)`.
pub const DEVICE_RUNNING: u16 = 2;
/// Reported for hrPrinterDetectedErrorState regardless of state.
pub const DETECTED_ERROR_STATE: u16 = 2;
