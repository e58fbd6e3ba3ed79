//! Configuration for update checks.

use crate::error::{Result, UpdateCheckError};
use crate::record::InstalledBuild;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SERVER_URL: &str = "https://builds.example.org/exodus/";
const DEFAULT_MANIFEST_FILE: &str = "update_list";
const WEEKLY_SECS: u64 = 7 * 24 * 60 * 60;

/// How often periodic checks should run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum CheckFrequency {
    /// Only when explicitly requested.
    Manual,
    /// At most once per interval.
    Every { seconds: u64 },
}

impl CheckFrequency {
    /// Whether a periodic invocation at `now` should run a check, given the
    /// time of the last successful one (unix seconds).
    pub fn is_due(&self, last_checked: Option<u64>, now: u64) -> bool {
        match (self, last_checked) {
            (CheckFrequency::Manual, _) => false,
            (CheckFrequency::Every { .. }, None) => true,
            (CheckFrequency::Every { seconds }, Some(last)) => now >= last.saturating_add(*seconds),
        }
    }
}

impl Default for CheckFrequency {
    fn default() -> Self {
        CheckFrequency::Every {
            seconds: WEEKLY_SECS,
        }
    }
}

/// Configuration for the update checker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UpdateCheckConfig {
    /// Base URL of the build server; the device name is appended to it.
    pub server_url: String,
    /// Name of the manifest file inside the device directory.
    pub manifest_file_name: String,
    /// Directory holding the state snapshot and cached changelogs.
    pub data_dir: PathBuf,
    /// Upper bound on parallel changelog fetches.
    pub changelog_concurrency: usize,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Policy for scheduled checks.
    pub check_frequency: CheckFrequency,
}

impl Default for UpdateCheckConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            manifest_file_name: DEFAULT_MANIFEST_FILE.to_string(),
            data_dir: std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".update-check"),
            changelog_concurrency: 4,
            request_timeout_secs: 30,
            check_frequency: CheckFrequency::default(),
        }
    }
}

impl UpdateCheckConfig {
    /// Load a JSON config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)?;
        serde_json::from_slice(&raw).map_err(|err| {
            UpdateCheckError::Config(format!("{}: {err}", path.display()))
        })
    }

    /// Set the server base URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    /// Set the data directory
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the changelog fetch concurrency
    pub fn changelog_concurrency(mut self, limit: usize) -> Self {
        self.changelog_concurrency = limit;
        self
    }

    /// Location of the manifest for `device`:
    /// `<server_url><device>/<manifest_file_name>`.
    pub fn manifest_url(&self, device: &str) -> Result<Url> {
        let mut base = self.server_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .map_err(|err| UpdateCheckError::InvalidUrl(format!("{base}: {err}")))?;
        base.join(&format!("{device}/"))
            .and_then(|dir| dir.join(&self.manifest_file_name))
            .map_err(|err| UpdateCheckError::InvalidUrl(format!("{device}: {err}")))
    }

    /// Location of the state snapshot.
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    /// Directory of the changelog cache.
    pub fn changelog_dir(&self) -> PathBuf {
        self.data_dir.join("changelogs")
    }

    /// Per-request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Changelog concurrency, never below one.
    pub fn effective_concurrency(&self) -> usize {
        self.changelog_concurrency.max(1)
    }
}

/// Screen class of the host, derived from its shortest side in dp.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// Shortest side below 600dp.
    Phone,
    /// Shortest side from 600dp up to 719dp.
    Hybrid,
    /// Shortest side of 720dp or more.
    Tablet,
}

impl DeviceClass {
    /// Classify a screen by its shortest side in dp.
    pub fn from_shortest_side_dp(dp: u32) -> Self {
        match dp {
            0..=599 => DeviceClass::Phone,
            600..=719 => DeviceClass::Hybrid,
            _ => DeviceClass::Tablet,
        }
    }

    /// Lowercase label, as used in the user agent.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Phone => "phone",
            DeviceClass::Hybrid => "hybrid",
            DeviceClass::Tablet => "tablet",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts about the host, gathered once at startup and passed around by
/// reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostProfile {
    /// Device code name, used as the manifest directory.
    pub device: String,
    /// Screen class, reported in the user agent.
    pub device_class: DeviceClass,
    /// Build currently running on the host.
    pub installed: InstalledBuild,
}

impl HostProfile {
    /// Profile for `device` running `installed`.
    pub fn new(device: impl Into<String>, device_class: DeviceClass, installed: InstalledBuild) -> Self {
        Self {
            device: device.into(),
            device_class,
            installed,
        }
    }

    /// `User-Agent` value identifying this checker and host.
    pub fn user_agent(&self) -> String {
        format!(
            "update-check/{} ({}; {})",
            env!("CARGO_PKG_VERSION"),
            self.device,
            self.device_class
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_defaults() {
        let config = UpdateCheckConfig::default();
        assert_eq!(config.manifest_file_name, "update_list");
        assert_eq!(config.changelog_concurrency, 4);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(
            config.check_frequency,
            CheckFrequency::Every { seconds: WEEKLY_SECS }
        );
        assert!(config.state_path().ends_with(".update-check/state.json"));
    }

    #[test]
    fn manifest_url_appends_device_directory() {
        let config = UpdateCheckConfig::default()
            .server_url("https://dl.example.net/exodus")
            .changelog_concurrency(0);
        assert_eq!(config.effective_concurrency(), 1);
        assert_eq!(
            config.manifest_url("hammerhead").unwrap().as_str(),
            "https://dl.example.net/exodus/hammerhead/update_list"
        );

        let bad = UpdateCheckConfig::default().server_url("not a url");
        assert!(matches!(
            bad.manifest_url("hammerhead"),
            Err(UpdateCheckError::InvalidUrl(_))
        ));
    }

    #[test]
    fn load_fills_missing_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "server_url": "https://mirror.example.org/", "check_frequency": { "mode": "manual" } }"#,
        )
        .unwrap();

        let config = UpdateCheckConfig::load(&path).unwrap();
        assert_eq!(config.server_url, "https://mirror.example.org/");
        assert_eq!(config.check_frequency, CheckFrequency::Manual);
        assert_eq!(config.manifest_file_name, "update_list");

        std::fs::write(&path, r#"{ "changelog_concurrency": "four" }"#).unwrap();
        assert!(matches!(
            UpdateCheckConfig::load(&path),
            Err(UpdateCheckError::Config(_))
        ));
    }

    #[test]
    fn frequency_policy() {
        let hourly = CheckFrequency::Every { seconds: 3600 };
        assert!(hourly.is_due(None, 10));
        assert!(!hourly.is_due(Some(1000), 4599));
        assert!(hourly.is_due(Some(1000), 4600));
        assert!(!CheckFrequency::Manual.is_due(None, 10));
    }

    #[test]
    fn device_class_thresholds() {
        assert_eq!(DeviceClass::from_shortest_side_dp(360), DeviceClass::Phone);
        assert_eq!(DeviceClass::from_shortest_side_dp(600), DeviceClass::Hybrid);
        assert_eq!(DeviceClass::from_shortest_side_dp(719), DeviceClass::Hybrid);
        assert_eq!(DeviceClass::from_shortest_side_dp(720), DeviceClass::Tablet);

        let host = HostProfile::new("flo", DeviceClass::Tablet, InstalledBuild::default());
        assert!(host.user_agent().ends_with("(flo; tablet)"));
    }
}
