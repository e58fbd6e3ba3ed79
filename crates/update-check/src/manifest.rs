//! Parser for the line-oriented build manifest.
//!
//! Each non-blank line describes one build:
//!
//! ```text
//! filename;checksum;timestampUtc;apiLevel[;channel]
//! ```
//!
//! Whitespace around fields is ignored. Lines that do not fit the shape are
//! reported and skipped; they never fail the batch.

use crate::record::{BuildRecord, Channel};
use reqwest::Url;
use std::collections::HashSet;
use tracing::{debug, warn};

const FIELD_SEPARATOR: char = ';';
const REQUIRED_FIELDS: usize = 4;

/// Why a single manifest line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineError {
    /// The line has fewer than the four mandatory fields.
    #[error("expected at least 4 fields, found {0}")]
    TooFewFields(usize),
    /// A mandatory field is blank after trimming.
    #[error("missing {0}")]
    EmptyField(&'static str),
    /// The file name would escape the build directory or is not a name.
    #[error("file name {0:?} is not a plain file name")]
    InvalidFileName(String),
    /// The checksum contains non-hex characters.
    #[error("checksum {0:?} is not hex")]
    InvalidChecksum(String),
    /// The timestamp is not a non-negative integer.
    #[error("timestamp {0:?} is not an integer")]
    InvalidTimestamp(String),
    /// The api level is not a non-negative integer.
    #[error("api level {0:?} is not an integer")]
    InvalidApiLevel(String),
    /// Joining the file name onto the manifest location failed.
    #[error("cannot derive a download url for {0:?}")]
    InvalidDownloadUrl(String),
    /// An earlier line already listed this file name.
    #[error("duplicate entry for {0:?}")]
    Duplicate(String),
}

/// A rejected manifest line, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIssue {
    /// 1-based line number in the manifest body.
    pub line_number: usize,
    /// Why the line was rejected.
    pub error: LineError,
}

/// Outcome of parsing a whole manifest.
#[derive(Debug, Clone, Default)]
pub struct ParsedManifest {
    /// Valid records, in manifest order.
    pub records: Vec<BuildRecord>,
    /// Rejected lines, in manifest order.
    pub issues: Vec<LineIssue>,
}

impl ParsedManifest {
    /// Number of non-blank lines that were dropped.
    pub fn skipped(&self) -> usize {
        self.issues.len()
    }
}

/// Parse a manifest body fetched from `manifest_url`.
///
/// Download URLs are resolved relative to the manifest location, so a build
/// named `foo.zip` listed in `https://host/dev/update_list` downloads from
/// `https://host/dev/foo.zip`.
pub fn parse_manifest(text: &str, manifest_url: &Url) -> ParsedManifest {
    let mut parsed = ParsedManifest::default();
    let mut seen = HashSet::new();

    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_number = index + 1;

        let result = parse_line(line, manifest_url).and_then(|record| {
            if seen.insert(record.file_name.clone()) {
                Ok(record)
            } else {
                Err(LineError::Duplicate(record.file_name))
            }
        });

        match result {
            Ok(record) => {
                debug!(
                    file = %record.file_name,
                    checksum = %record.checksum,
                    utc = record.timestamp_utc,
                    api = record.api_level,
                    "parsed manifest entry"
                );
                parsed.records.push(record);
            }
            Err(error) => {
                warn!(line = line_number, %error, "skipping manifest line");
                parsed.issues.push(LineIssue { line_number, error });
            }
        }
    }

    parsed
}

/// Parse one manifest line into a record.
pub fn parse_line(line: &str, manifest_url: &Url) -> Result<BuildRecord, LineError> {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).map(str::trim).collect();
    if fields.len() < REQUIRED_FIELDS {
        return Err(LineError::TooFewFields(fields.len()));
    }

    let file_name = require(fields[0], "file name")?;
    if !is_plain_file_name(file_name) {
        return Err(LineError::InvalidFileName(file_name.to_string()));
    }

    let checksum = require(fields[1], "checksum")?;
    if !checksum.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(LineError::InvalidChecksum(checksum.to_string()));
    }

    let utc = require(fields[2], "timestamp")?;
    let timestamp_utc = utc
        .parse::<u64>()
        .map_err(|_| LineError::InvalidTimestamp(utc.to_string()))?;

    let api = require(fields[3], "api level")?;
    let api_level = api
        .parse::<u32>()
        .map_err(|_| LineError::InvalidApiLevel(api.to_string()))?;

    // The manifest format has no mandatory channel column; entries without
    // one are nightlies.
    let channel = match fields.get(4) {
        Some(label) if !label.is_empty() => Channel::from_label(label),
        _ => Channel::Nightly,
    };

    // The "./" prefix keeps names like "exodus:5.1.zip" a path segment
    // instead of a URL scheme.
    let download_url = manifest_url
        .join(&format!("./{file_name}"))
        .map_err(|_| LineError::InvalidDownloadUrl(file_name.to_string()))?;

    Ok(BuildRecord::new(
        file_name,
        timestamp_utc,
        api_level,
        download_url.as_str(),
        checksum,
        channel,
    ))
}

/// Render a record back into manifest line form.
pub fn manifest_line(record: &BuildRecord) -> String {
    let mut line = format!(
        "{};{};{};{}",
        record.file_name, record.checksum, record.timestamp_utc, record.api_level
    );
    if record.channel != Channel::Nightly {
        line.push(FIELD_SEPARATOR);
        line.push_str(record.channel.as_str());
    }
    line
}

fn require<'a>(field: &'a str, what: &'static str) -> Result<&'a str, LineError> {
    if field.is_empty() {
        Err(LineError::EmptyField(what))
    } else {
        Ok(field)
    }
}

fn is_plain_file_name(name: &str) -> bool {
    name != "."
        && name != ".."
        && !name
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '?' | '#') || c.is_control())
}
