//! Session policy configuration
//!
//! Central home of the scheduling constants: the slot grid width, how early
//! a room may open before its slot, and the default history page size.
//! Loadable from a TOML file; absent keys fall back to the defaults.

use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use counsel_core::models::{SessionWindow, TimeSlot};
use counsel_core::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPolicy {
    /// Width of a bookable slot in minutes
    pub slot_minutes: i64,
    /// How many minutes before the first slot a session may open
    pub early_open_minutes: i64,
    /// Default page size for history reads
    pub history_page_size: u32,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            slot_minutes: 60,
            early_open_minutes: 5,
            history_page_size: 50,
        }
    }
}

impl SessionPolicy {
    pub fn slot_width(&self) -> Duration {
        Duration::minutes(self.slot_minutes)
    }

    pub fn early_open(&self) -> Duration {
        Duration::minutes(self.early_open_minutes)
    }

    /// The session window for a booked slot set. All window arithmetic in
    /// the service goes through here.
    pub fn window_for(&self, date: NaiveDate, slots: &[TimeSlot]) -> Option<SessionWindow> {
        SessionWindow::for_slots(date, slots, self.early_open())
    }

    /// Load policy from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from the user config directory, falling back to defaults when
    /// no file exists
    pub fn load_default() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "counsel", "counsel")
            .ok_or_else(|| Error::Config("could not determine config directory".to_string()))?;
        Ok(dirs.config_dir().join("policy.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let policy = SessionPolicy::default();
        assert_eq!(policy.slot_minutes, 60);
        assert_eq!(policy.early_open_minutes, 5);
        assert_eq!(policy.slot_width(), Duration::minutes(60));
    }

    #[test]
    fn test_load_full_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "slot_minutes = 30\nearly_open_minutes = 10\nhistory_page_size = 25"
        )
        .unwrap();

        let policy = SessionPolicy::load(file.path()).unwrap();
        assert_eq!(policy.slot_minutes, 30);
        assert_eq!(policy.early_open_minutes, 10);
        assert_eq!(policy.history_page_size, 25);
    }

    #[test]
    fn test_absent_keys_use_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "slot_minutes = 45").unwrap();

        let policy = SessionPolicy::load(file.path()).unwrap();
        assert_eq!(policy.slot_minutes, 45);
        assert_eq!(policy.early_open_minutes, 5);
    }

    #[test]
    fn test_malformed_file_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "slot_minutes = \"an hour\"").unwrap();

        let err = SessionPolicy::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_window_for_slots() {
        let policy = SessionPolicy::default();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let slots: Vec<TimeSlot> = vec!["08:00-09:00".parse().unwrap()];

        let window = policy.window_for(date, &slots).unwrap();
        assert_eq!(window.opens_at.to_rfc3339(), "2024-06-01T07:55:00+00:00");
        assert_eq!(window.closes_at.to_rfc3339(), "2024-06-01T09:00:00+00:00");

        assert!(policy.window_for(date, &[]).is_none());
    }
}
