//! Turns a discovery result into what a notifier should show.
//!
//! Planning is pure: it never touches the network, the filesystem or any UI.

use crate::discovery::DiscoveryResult;
use crate::record::BuildRecord;
use std::fmt;

/// Maximum number of builds listed individually.
pub const LISTED_UPDATES_CAP: usize = 4;

/// Single action offered when exactly one update is available.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryAction {
    /// Fetch the one available build.
    Download(BuildRecord),
}

/// What to present after a discovery run.
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationPlan {
    /// Nothing newer than the installed build.
    NoUpdates { total_available: usize },
    /// At least one build is newer than the installed one.
    UpdatesFound {
        /// Number of builds newer than the installed one.
        update_count: usize,
        /// Display names, newest first, at most the cap.
        listed: Vec<String>,
        /// Real updates not listed individually.
        more: Option<usize>,
        /// All builds in the manifest, newer or not.
        total_available: usize,
        /// Offered only when exactly one update exists.
        primary_action: Option<PrimaryAction>,
    },
}

impl PresentationPlan {
    /// True for [`PresentationPlan::UpdatesFound`].
    pub fn has_updates(&self) -> bool {
        matches!(self, PresentationPlan::UpdatesFound { .. })
    }
}

/// Plan with the default listing cap.
pub fn plan(result: &DiscoveryResult) -> PresentationPlan {
    plan_with_cap(result, LISTED_UPDATES_CAP)
}

/// Plan listing at most `cap` builds by name.
///
/// Updates are the result's records newer than the build it was classified
/// against, so `update_count` always equals `result.real_count`.
pub fn plan_with_cap(result: &DiscoveryResult, cap: usize) -> PresentationPlan {
    let mut real: Vec<&BuildRecord> = result.real_updates().collect();
    let total_available = result.total_count();

    if real.is_empty() {
        return PresentationPlan::NoUpdates { total_available };
    }

    // Stable sort: equal timestamps keep manifest order.
    real.sort_by(|a, b| b.timestamp_utc.cmp(&a.timestamp_utc));

    let update_count = real.len();
    let listed: Vec<String> = real
        .iter()
        .take(cap)
        .map(|r| r.display_name().to_string())
        .collect();
    let more = (update_count > listed.len()).then(|| update_count - listed.len());
    let primary_action = match real.as_slice() {
        [only] => Some(PrimaryAction::Download((*only).clone())),
        _ => None,
    };

    PresentationPlan::UpdatesFound {
        update_count,
        listed,
        more,
        total_available,
        primary_action,
    }
}

impl fmt::Display for PresentationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresentationPlan::NoUpdates { total_available } => {
                write!(f, "No updates found ({total_available} builds available)")
            }
            PresentationPlan::UpdatesFound {
                update_count,
                listed,
                more,
                primary_action,
                ..
            } => {
                let noun = if *update_count == 1 { "update" } else { "updates" };
                writeln!(f, "{update_count} {noun} available")?;
                for name in listed {
                    writeln!(f, "  {name}")?;
                }
                if let Some(more) = more {
                    writeln!(f, "  +{more} more")?;
                }
                if let Some(PrimaryAction::Download(record)) = primary_action {
                    write!(f, "Download: {}", record.download_url)?;
                }
                Ok(())
            }
        }
    }
}
