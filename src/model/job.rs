use chrono::{
    DateTime,
    Utc,
};
use std::{
    fmt::Display,
    path::PathBuf,
};

/// Extension of every persisted job log.
pub const JOB_EXTENSION: &str = "prn";

/// What the emulated printer reports as `hrPrinterStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceStatus {
    #[default]
    Idle,
    Printing,
}

impl DeviceStatus {
    /// Numeric code served over SNMP. 128 is not a Printer-MIB value but is
    /// what monitoring tools pointed at this emulator expect to see.
    pub fn code(self) -> u16 {
        match self {
            DeviceStatus::Idle => 0,
            DeviceStatus::Printing => 128,
        }
    }
}

impl Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let str = match self {
            DeviceStatus::Idle => "idle",
            DeviceStatus::Printing => "printing",
        };
        write!(f, "{} ({})", str, self.code())
    }
}

/// The job currently receiving data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintJob {
    pub id: String,
    pub path: PathBuf,
    pub created: DateTime<Utc>,
}

/// A job log found on disk, as shown in the history list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub id: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Formats the second-resolution id a job created at `now` starts from.
pub fn timestamp_id(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Ids are used as file stems, so anything that could escape the jobs
/// directory is rejected.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(['/', '\\']) && !id.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_codes() {
        assert_eq!(DeviceStatus::default(), DeviceStatus::Idle);
        assert_eq!(DeviceStatus::Idle.code(), 0);
        assert_eq!(DeviceStatus::Printing.code(), 128);
        assert_eq!(DeviceStatus::Printing.to_string(), "printing (128)");
    }

    #[test]
    fn timestamp_ids_sort_by_time() {
        let a = Utc.with_ymd_and_hms(2024, 3, 9, 8, 5, 7).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap();
        assert_eq!(timestamp_id(a), "2024-03-09_08-05-07");
        assert!(timestamp_id(a) < timestamp_id(b));
        assert!(timestamp_id(a) < format!("{}-001", timestamp_id(a)));
    }

    #[test]
    fn ids_cannot_escape_directory() {
        assert!(is_valid_id("2024-03-09_08-05-07"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("../etc/passwd"));
        assert!(!is_valid_id("a/b"));
        assert!(!is_valid_id("a\\b"));
    }
}
