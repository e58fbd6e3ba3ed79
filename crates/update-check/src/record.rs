use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Release track a build was published on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// `stable`
    Stable,
    /// `RC`
    Rc,
    /// `snapshot`
    Snapshot,
    /// `nightly`, and any manifest entry without a channel column.
    Nightly,
    /// Any label not listed above.
    Unknown,
}

impl Channel {
    /// Map a channel label as published by the build server.
    ///
    /// `RC` is matched case-sensitively like the other labels; anything that
    /// is not an exact match is [`Channel::Unknown`].
    pub fn from_label(label: &str) -> Self {
        match label {
            "stable" => Channel::Stable,
            "RC" => Channel::Rc,
            "snapshot" => Channel::Snapshot,
            "nightly" => Channel::Nightly,
            _ => Channel::Unknown,
        }
    }

    /// Label as published; [`Channel::Unknown`] renders as `unknown`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Stable => "stable",
            Channel::Rc => "RC",
            Channel::Snapshot => "snapshot",
            Channel::Nightly => "nightly",
            Channel::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata about the build currently running on this host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InstalledBuild {
    /// Human readable version label (e.g. `exodus-5.1-20150301`).
    pub version: String,
    /// Platform API level of the installed image.
    pub api_level: u32,
    /// Build time of the installed image, unix seconds.
    pub timestamp_utc: u64,
}

/// One published build, as listed in the manifest.
///
/// Identity is the file name: two records describing the same file are equal
/// even when their other fields differ. Recency is a separate question
/// answered by [`BuildRecord::is_newer_than`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Artefact file name as listed, also the record's identity.
    pub file_name: String,
    /// Build time, unix seconds.
    pub timestamp_utc: u64,
    /// Platform API level the build targets.
    pub api_level: u32,
    /// Absolute URL of the artefact.
    pub download_url: String,
    /// MD5 of the artefact, lowercase or uppercase hex.
    pub checksum: String,
    /// Release track, `Nightly` unless the manifest says otherwise.
    pub channel: Channel,
}

impl BuildRecord {
    /// Assemble a record from already validated fields.
    pub fn new(
        file_name: impl Into<String>,
        timestamp_utc: u64,
        api_level: u32,
        download_url: impl Into<String>,
        checksum: impl Into<String>,
        channel: Channel,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            timestamp_utc,
            api_level,
            download_url: download_url.into(),
            checksum: checksum.into(),
            channel,
        }
    }

    /// True iff this build is strictly newer than the installed one.
    pub fn is_newer_than(&self, installed: &InstalledBuild) -> bool {
        self.timestamp_utc > installed.timestamp_utc
    }

    /// Name used when listing the build to a user.
    pub fn display_name(&self) -> &str {
        self.file_name
            .strip_suffix(".zip")
            .unwrap_or(self.file_name.as_str())
    }

    /// Location of the changelog published next to the artefact.
    pub fn changelog_url(&self) -> String {
        format!("{}.changelog", self.download_url)
    }
}

impl PartialEq for BuildRecord {
    fn eq(&self, other: &Self) -> bool {
        self.file_name == other.file_name
    }
}

impl Eq for BuildRecord {}

impl Hash for BuildRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.file_name.hash(state);
    }
}

impl fmt::Display for BuildRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, api {}, {})",
            self.file_name, self.channel, self.api_level, self.timestamp_utc
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, ts: u64) -> BuildRecord {
        BuildRecord::new(
            name,
            ts,
            21,
            format!("https://builds.example.org/{name}"),
            "0123abcd",
            Channel::Nightly,
        )
    }

    #[test]
    fn equality_is_by_file_name_only() {
        let a = record("exodus-20150301.zip", 1000);
        let mut b = record("exodus-20150301.zip", 2000);
        b.checksum = "ffff".into();
        assert_eq!(a, b);
        assert_ne!(a, record("exodus-20150302.zip", 1000));
    }

    #[test]
    fn newer_is_strictly_greater_timestamp() {
        let installed = InstalledBuild {
            version: "exodus-5.1".into(),
            api_level: 21,
            timestamp_utc: 1500,
        };
        assert!(record("a.zip", 1501).is_newer_than(&installed));
        assert!(!record("b.zip", 1500).is_newer_than(&installed));
        assert!(!record("c.zip", 10).is_newer_than(&installed));
    }

    #[test]
    fn channel_labels_map_exhaustively() {
        assert_eq!(Channel::from_label("stable"), Channel::Stable);
        assert_eq!(Channel::from_label("RC"), Channel::Rc);
        assert_eq!(Channel::from_label("snapshot"), Channel::Snapshot);
        assert_eq!(Channel::from_label("nightly"), Channel::Nightly);
        assert_eq!(Channel::from_label("rc"), Channel::Unknown);
        assert_eq!(Channel::from_label(""), Channel::Unknown);
        for channel in [
            Channel::Stable,
            Channel::Rc,
            Channel::Snapshot,
            Channel::Nightly,
        ] {
            assert_eq!(Channel::from_label(channel.as_str()), channel);
        }
    }

    #[test]
    fn display_name_and_changelog_url() {
        let r = record("exodus-20150301.zip", 1);
        assert_eq!(r.display_name(), "exodus-20150301");
        assert_eq!(
            r.changelog_url(),
            "https://builds.example.org/exodus-20150301.zip.changelog"
        );
        assert_eq!(record("plain", 1).display_name(), "plain");
    }
}
