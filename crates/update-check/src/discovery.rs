use crate::{
    changelog::ChangelogCache,
    error::{Result, UpdateCheckError},
    fetcher::BuildFetcher,
    manifest::parse_manifest,
    record::{BuildRecord, InstalledBuild},
    state::StateStore,
};
use futures::stream::{self, StreamExt};
use reqwest::Url;
use std::collections::HashSet;
use std::io::Cursor;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, info, warn};

const DEFAULT_CHANGELOG_CONCURRENCY: usize = 4;

/// Outcome of one discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryResult {
    /// Every valid build in the manifest, in manifest order.
    pub records: Vec<BuildRecord>,
    /// Builds not present in the previous run's snapshot.
    pub new_count: usize,
    /// Builds strictly newer than the installed one.
    pub real_count: usize,
    /// Records persisted by the previous run.
    pub previous: Vec<BuildRecord>,
    /// Manifest lines dropped as malformed.
    pub skipped_lines: usize,
    /// Changelogs fetched and cached during this run.
    pub changelogs_fetched: usize,
    /// Changelogs that could not be fetched; retried next run.
    pub changelog_failures: usize,
    /// Time the new snapshot was written, unix seconds.
    pub checked_at: u64,
    /// Installed build the records were classified against.
    pub installed: InstalledBuild,
}

impl DiscoveryResult {
    /// Number of valid builds listed by the manifest.
    pub fn total_count(&self) -> usize {
        self.records.len()
    }

    /// Builds newer than the installed one, in manifest order.
    pub fn real_updates(&self) -> impl Iterator<Item = &BuildRecord> + '_ {
        self.records
            .iter()
            .filter(move |r| r.is_newer_than(&self.installed))
    }
}

/// Fetches the manifest, classifies builds and persists what was seen.
///
/// Runs are serialised: a second `discover` call waits for the first to
/// finish.
pub struct DiscoveryEngine<F> {
    fetcher: F,
    store: StateStore,
    changelogs: ChangelogCache,
    changelog_concurrency: usize,
    run_gate: Mutex<()>,
}

impl<F> DiscoveryEngine<F>
where
    F: BuildFetcher,
{
    /// Engine with the default changelog concurrency.
    pub fn new(fetcher: F, store: StateStore, changelogs: ChangelogCache) -> Self {
        Self {
            fetcher,
            store,
            changelogs,
            changelog_concurrency: DEFAULT_CHANGELOG_CONCURRENCY,
            run_gate: Mutex::new(()),
        }
    }

    /// Bound the number of changelog fetches in flight. Values below one are
    /// treated as one.
    pub fn with_changelog_concurrency(mut self, limit: usize) -> Self {
        self.changelog_concurrency = limit.max(1);
        self
    }

    /// Snapshot store used between runs.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Cache the rendered changelogs are written to.
    pub fn changelogs(&self) -> &ChangelogCache {
        &self.changelogs
    }

    /// Run one discovery pass against `manifest_url`.
    ///
    /// Fails only when the manifest cannot be fetched or the new snapshot
    /// cannot be written; in both cases the previous snapshot is kept.
    pub async fn discover(
        &self,
        manifest_url: &Url,
        installed: &InstalledBuild,
    ) -> Result<DiscoveryResult> {
        let _guard = self.run_gate.lock().await;

        let store = self.store.clone();
        let previous = task::spawn_blocking(move || store.load())
            .await
            .map_err(|err| UpdateCheckError::Other(format!("task join error: {err}")))?;
        debug!(previous = previous.len(), "loaded prior state");

        info!(url = %manifest_url, "looking for updates");
        let text = self.fetcher.fetch_text(manifest_url).await?;

        let parsed = parse_manifest(&text, manifest_url);
        let skipped_lines = parsed.skipped();
        let records = parsed.records;

        let (changelogs_fetched, changelog_failures) = self.fetch_missing_changelogs(&records).await;

        let seen: HashSet<&str> = previous.iter().map(|r| r.file_name.as_str()).collect();
        let new_count = records
            .iter()
            .filter(|r| !seen.contains(r.file_name.as_str()))
            .count();
        let real_count = records.iter().filter(|r| r.is_newer_than(installed)).count();
        debug!(new = new_count, real = real_count, "classified builds");

        let store = self.store.clone();
        let changelogs = self.changelogs.clone();
        let to_save = records.clone();
        let saved = task::spawn_blocking(move || {
            let saved = store.save(&to_save)?;
            // Artifacts of builds no longer listed are dead weight, but
            // failing to drop them never fails the run.
            let keep: HashSet<&str> = to_save.iter().map(|r| r.file_name.as_str()).collect();
            match changelogs.prune(&keep) {
                Ok(0) => {}
                Ok(pruned) => debug!(pruned, "removed stale changelogs"),
                Err(err) => warn!(%err, "could not prune changelogs"),
            }
            Ok::<_, UpdateCheckError>(saved)
        })
        .await
        .map_err(|err| UpdateCheckError::Other(format!("task join error: {err}")))??;

        info!(
            found = records.len(),
            newer_than_installed = real_count,
            new = new_count,
            skipped = skipped_lines,
            "update check completed"
        );

        Ok(DiscoveryResult {
            records,
            new_count,
            real_count,
            previous,
            skipped_lines,
            changelogs_fetched,
            changelog_failures,
            checked_at: saved.checked_at,
            installed: installed.clone(),
        })
    }

    /// Fetch and store changelogs for records that have none cached yet.
    /// Failures are logged and counted, never returned.
    async fn fetch_missing_changelogs(&self, records: &[BuildRecord]) -> (usize, usize) {
        let missing: Vec<&BuildRecord> = records
            .iter()
            .filter(|r| !self.changelogs.contains(r))
            .collect();
        if missing.is_empty() {
            return (0, 0);
        }

        let outcomes: Vec<bool> = stream::iter(missing)
            .map(|record| async move {
                match self.fetch_changelog(record).await {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(file = %record.file_name, %err, "changelog unavailable");
                        false
                    }
                }
            })
            .buffer_unordered(self.changelog_concurrency)
            .collect()
            .await;

        let fetched = outcomes.iter().filter(|ok| **ok).count();
        (fetched, outcomes.len() - fetched)
    }

    async fn fetch_changelog(&self, record: &BuildRecord) -> Result<()> {
        let url = Url::parse(&record.changelog_url())
            .map_err(|err| UpdateCheckError::InvalidUrl(format!("{}: {err}", record.changelog_url())))?;
        debug!(file = %record.file_name, %url, "fetching changelog");
        let body = self.fetcher.fetch_bytes(&url).await?;

        // Rendering touches the filesystem; keep it off the async workers.
        let cache = self.changelogs.clone();
        let record = record.clone();
        task::spawn_blocking(move || cache.materialize(&record, Cursor::new(body)))
            .await
            .map_err(|err| UpdateCheckError::Other(format!("task join error: {err}")))??;
        Ok(())
    }
}
