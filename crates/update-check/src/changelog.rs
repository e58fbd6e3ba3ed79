//! Changelog rendering and the on-disk changelog cache.
//!
//! Published changelogs are plain text. A line made only of `=` opens or
//! closes a category block whose lines become headings, a line starting with
//! `*` becomes a sub-heading and everything else becomes a bullet. The result
//! is a small HTML fragment meant to be shown as-is by a UI layer.

use crate::error::Result;
use crate::record::BuildRecord;
use std::collections::HashSet;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const SEPARATOR: &str = "<br />";
const ARTIFACT_SUFFIX: &str = ".changelog.html";

/// Render a raw changelog read from `reader` into `writer`.
///
/// Single pass, line by line. Returns the number of items written; zero means
/// the changelog had no content and nothing was written.
pub fn render_changelog<R: BufRead, W: Write>(reader: R, mut writer: W) -> io::Result<usize> {
    let mut in_category = false;
    let mut written = 0usize;

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.chars().all(|c| c == '=') {
            in_category = !in_category;
            continue;
        }

        if written > 0 {
            writer.write_all(SEPARATOR.as_bytes())?;
        }

        if in_category {
            write!(writer, "<b><u>{}</u></b>", escape(line))?;
        } else if line.starts_with('*') {
            write!(writer, "<b>{}</b>", escape(line.replace('*', "").trim()))?;
        } else {
            write!(writer, "&#8226;&nbsp;{}", escape(line))?;
        }
        written += 1;
    }

    writer.flush()?;
    Ok(written)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Filename-addressed store of rendered changelogs.
///
/// An artifact either exists and is complete or does not exist at all:
/// content is rendered into a temporary file in the same directory and only
/// renamed into place once rendering finished. A failure drops the temporary
/// file.
#[derive(Debug, Clone)]
pub struct ChangelogCache {
    dir: PathBuf,
}

impl ChangelogCache {
    /// Cache rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the artifacts.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the artifact for a build file name.
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(format!("{file_name}{ARTIFACT_SUFFIX}"))
    }

    /// True when a complete artifact for `record` is cached.
    pub fn contains(&self, record: &BuildRecord) -> bool {
        self.path_for(&record.file_name).is_file()
    }

    /// Read a cached artifact, if one exists.
    pub fn read(&self, file_name: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(file_name)) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Render `reader` and publish it as the artifact for `record`.
    ///
    /// On any I/O failure no artifact is left behind for the record.
    pub fn materialize<R: BufRead>(&self, record: &BuildRecord, reader: R) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let target = self.path_for(&record.file_name);

        let mut temp = NamedTempFile::new_in(&self.dir)?;
        let items = render_changelog(reader, io::BufWriter::new(temp.as_file_mut()))?;
        temp.as_file().sync_all()?;
        temp.persist(&target).map_err(|err| err.error)?;

        debug!(file = %record.file_name, items, path = %target.display(), "changelog stored");
        Ok(target)
    }

    /// Remove the artifact for a build, if present.
    pub fn remove(&self, file_name: &str) -> Result<()> {
        match fs::remove_file(self.path_for(file_name)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Remove every artifact whose build file name is not in `keep`.
    ///
    /// Files without the artifact suffix, including in-flight temporary
    /// files, are left alone. Returns the number of artifacts removed.
    pub fn prune(&self, keep: &HashSet<&str>) -> Result<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(file_name) = name.to_str().and_then(|n| n.strip_suffix(ARTIFACT_SUFFIX)) else {
                continue;
            };
            if keep.contains(file_name) {
                continue;
            }
            self.remove(file_name)?;
            debug!(file = %file_name, "changelog pruned");
            removed += 1;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Channel;
    use std::io::{Cursor, Read};
    use tempfile::tempdir;

    fn render(input: &str) -> String {
        let mut out = Vec::new();
        render_changelog(Cursor::new(input), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn record(name: &str) -> BuildRecord {
        BuildRecord::new(
            name,
            1,
            21,
            format!("https://builds.example.org/{name}"),
            "aa",
            Channel::Nightly,
        )
    }

    #[test]
    fn renders_categories_subheadings_and_bullets() {
        let input = "\
===========
Framework
===========
* Settings *
Added a toggle

Fixed <b> crash & burn
";
        assert_eq!(
            render(input),
            "<b><u>Framework</u></b><br /><b>Settings</b><br />\
             &#8226;&nbsp;Added a toggle<br />\
             &#8226;&nbsp;Fixed &lt;b&gt; crash &amp; burn"
        );
    }

    #[test]
    fn category_block_spans_lines_until_closed() {
        let input = "==\nKernel\nDrivers\n==\n*not heading*\n";
        assert_eq!(
            render(input),
            "<b><u>Kernel</u></b><br /><b><u>Drivers</u></b><br /><b>not heading</b>"
        );
    }

    #[test]
    fn blank_lines_do_not_toggle_or_emit() {
        assert_eq!(render(""), "");
        assert_eq!(render("\n\n   \n"), "");
        assert_eq!(render("\n==\n\nA\n"), "<b><u>A</u></b>");
    }

    #[test]
    fn equals_prefix_with_text_is_a_bullet() {
        assert_eq!(render("=> moved"), "&#8226;&nbsp;=&gt; moved");
    }

    struct FailingWriter {
        budget: usize,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_failure_is_reported() {
        let input = "one\ntwo\nthree\n";
        let err = render_changelog(Cursor::new(input), FailingWriter { budget: 20 }).unwrap_err();
        assert_eq!(err.to_string(), "disk full");
    }

    /// Yields `data`, then fails.
    struct BrokenStream {
        data: Cursor<Vec<u8>>,
    }

    impl Read for BrokenStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.data.read(buf)?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset",
                ));
            }
            Ok(n)
        }
    }

    #[test]
    fn interrupted_materialize_leaves_no_artifact() {
        let dir = tempdir().unwrap();
        let cache = ChangelogCache::new(dir.path().join("changelogs"));
        let build = record("exodus-1.zip");

        let stream = BrokenStream {
            data: Cursor::new(b"==\nCore\n==\n* Fixes\nline one\nline two\n".to_vec()),
        };
        let result = cache.materialize(&build, io::BufReader::new(stream));

        assert!(result.is_err());
        assert!(!cache.contains(&build));
        let leftovers = fs::read_dir(cache.dir()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn materialize_publishes_complete_artifact() {
        let dir = tempdir().unwrap();
        let cache = ChangelogCache::new(dir.path());
        let build = record("exodus-2.zip");

        assert!(!cache.contains(&build));
        assert_eq!(cache.read(&build.file_name).unwrap(), None);

        let path = cache
            .materialize(&build, Cursor::new("* Camera\nfaster shutter\n"))
            .unwrap();
        assert_eq!(path, dir.path().join("exodus-2.zip.changelog.html"));
        assert!(cache.contains(&build));
        assert_eq!(
            cache.read(&build.file_name).unwrap().as_deref(),
            Some("<b>Camera</b><br />&#8226;&nbsp;faster shutter")
        );

        cache.remove(&build.file_name).unwrap();
        assert!(!cache.contains(&build));
        cache.remove(&build.file_name).unwrap();
    }

    #[test]
    fn prune_keeps_listed_builds_and_foreign_files() {
        let dir = tempdir().unwrap();
        let cache = ChangelogCache::new(dir.path());
        assert_eq!(cache.prune(&HashSet::new()).unwrap(), 0);

        for name in ["a.zip", "b.zip", "c.zip"] {
            cache
                .materialize(&record(name), Cursor::new("change\n"))
                .unwrap();
        }
        fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

        let keep = HashSet::from(["b.zip"]);
        assert_eq!(cache.prune(&keep).unwrap(), 2);
        assert!(!cache.contains(&record("a.zip")));
        assert!(cache.contains(&record("b.zip")));
        assert!(!cache.contains(&record("c.zip")));
        assert!(dir.path().join("notes.txt").is_file());
    }

    #[test]
    fn empty_changelog_is_a_complete_empty_artifact() {
        let dir = tempdir().unwrap();
        let cache = ChangelogCache::new(dir.path());
        let build = record("exodus-3.zip");

        cache.materialize(&build, Cursor::new("\n\n")).unwrap();
        assert_eq!(cache.read(&build.file_name).unwrap().as_deref(), Some(""));
    }
}
