//! Build update discovery for devices tracking a build server.
//!
//! A build server publishes a line-oriented manifest of builds per device.
//! This crate fetches that manifest, turns it into [`BuildRecord`]s, renders
//! each build's changelog into a small cached document, counts which builds
//! are new since the last run and which are newer than the installed build,
//! persists what it saw, and plans a notification for a UI layer to show.
//!
//! ```ignore
//! use update_check::{
//!     plan, ChangelogCache, DeviceClass, DiscoveryEngine, HostProfile, HttpFetcher,
//!     InstalledBuild, StateStore, UpdateCheckConfig,
//! };
//!
//! # async fn demo() -> update_check::Result<()> {
//! let config = UpdateCheckConfig::default();
//! let host = HostProfile::new("hammerhead", DeviceClass::Phone, InstalledBuild::default());
//!
//! let fetcher = HttpFetcher::builder()
//!     .user_agent(host.user_agent())
//!     .timeout(config.request_timeout())
//!     .build()?;
//! let engine = DiscoveryEngine::new(
//!     fetcher,
//!     StateStore::new(config.state_path()),
//!     ChangelogCache::new(config.changelog_dir()),
//! );
//!
//! let result = engine
//!     .discover(&config.manifest_url(&host.device)?, &host.installed)
//!     .await?;
//! println!("{}", plan(&result));
//! # Ok(())
//! # }
//! ```

mod changelog;
mod config;
mod discovery;
mod error;
mod fetcher;
mod manifest;
mod planner;
mod record;
mod state;

pub use changelog::{render_changelog, ChangelogCache};
pub use config::{CheckFrequency, DeviceClass, HostProfile, UpdateCheckConfig};
pub use discovery::{DiscoveryEngine, DiscoveryResult};
pub use error::{Result, UpdateCheckError};
pub use fetcher::{BuildFetcher, HttpFetcher, HttpFetcherBuilder};
pub use manifest::{manifest_line, parse_line, parse_manifest, LineError, LineIssue, ParsedManifest};
pub use planner::{plan, plan_with_cap, PresentationPlan, PrimaryAction, LISTED_UPDATES_CAP};
pub use record::{BuildRecord, Channel, InstalledBuild};
pub use state::{PersistedState, StateStore};

/// Re-exported so callers can build manifest URLs without a direct dependency.
pub use reqwest::Url;
