//! Command-line entry point for running update checks.
//!
//! A scheduler (cron, a systemd timer, an init hook) invokes `check` on its
//! own cadence; this binary never loops or retries by itself.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};
use update_check::{
    plan, ChangelogCache, DeviceClass, DiscoveryEngine, HostProfile, HttpFetcher,
    InstalledBuild, StateStore, UpdateCheckConfig,
};

/// Command-line arguments for the update checker
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the build server base URL
    #[arg(long)]
    server_url: Option<String>,

    /// Override the number of changelogs fetched in parallel
    #[arg(long)]
    changelog_concurrency: Option<usize>,

    /// Device code name used as the manifest directory
    #[arg(long, default_value = "generic")]
    device: String,

    /// Shortest screen side in dp, used to classify the device
    #[arg(long, default_value_t = 360)]
    screen_dp: u32,

    /// Version label of the installed build
    #[arg(long, default_value = "unknown")]
    installed_version: String,

    /// API level of the installed build
    #[arg(long, default_value_t = 0)]
    installed_api: u32,

    /// Build time of the installed build, unix seconds
    #[arg(long, default_value_t = 0)]
    installed_timestamp: u64,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Look for updates now
    Check {
        /// Skip the check unless the configured frequency says one is due
        #[arg(long, default_value_t = false)]
        if_due: bool,
    },
    /// Show the builds recorded by the last successful check
    Status,
    /// Print the cached changelog of a build
    Changelog {
        /// Build file name as listed in the manifest
        file_name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("debug,update_check=debug")
    } else {
        EnvFilter::new("info,update_check=info")
    };
    fmt().with_env_filter(filter).init();

    let mut config = match &args.config {
        Some(path) => UpdateCheckConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => UpdateCheckConfig::default(),
    };
    if let Some(dir) = args.data_dir.clone() {
        config = config.data_dir(dir);
    }
    if let Some(url) = args.server_url.clone() {
        config = config.server_url(url);
    }
    if let Some(limit) = args.changelog_concurrency {
        config = config.changelog_concurrency(limit);
    }

    // Gathered once and passed down by reference from here on.
    let host = HostProfile::new(
        args.device.clone(),
        DeviceClass::from_shortest_side_dp(args.screen_dp),
        InstalledBuild {
            version: args.installed_version.clone(),
            api_level: args.installed_api,
            timestamp_utc: args.installed_timestamp,
        },
    );

    match args.command {
        Commands::Check { if_due } => run_check(&config, &host, if_due).await,
        Commands::Status => show_status(&config),
        Commands::Changelog { file_name } => show_changelog(&config, &file_name),
    }
}

async fn run_check(config: &UpdateCheckConfig, host: &HostProfile, if_due: bool) -> anyhow::Result<()> {
    let store = StateStore::new(config.state_path());

    if if_due {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)?
            .as_secs();
        if !config.check_frequency.is_due(store.last_checked(), now) {
            tracing::info!("update check not due yet");
            return Ok(());
        }
    }

    let fetcher = HttpFetcher::builder()
        .user_agent(host.user_agent())
        .timeout(config.request_timeout())
        .build()?;
    let engine = DiscoveryEngine::new(fetcher, store, ChangelogCache::new(config.changelog_dir()))
        .with_changelog_concurrency(config.effective_concurrency());

    let manifest_url = config.manifest_url(&host.device)?;
    let result = match engine.discover(&manifest_url, &host.installed).await {
        Ok(result) => result,
        Err(err) if err.is_fetch_failure() => {
            eprintln!("Could not check for updates: {err}");
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    };

    println!("{}", plan(&result));
    Ok(())
}

fn show_status(config: &UpdateCheckConfig) -> anyhow::Result<()> {
    let store = StateStore::new(config.state_path());
    let Some(snapshot) = store.load_snapshot() else {
        println!("No update check has completed yet.");
        return Ok(());
    };

    println!("Last checked at {} (unix time)", snapshot.checked_at);
    for record in &snapshot.records {
        println!("  {record}");
    }
    Ok(())
}

fn show_changelog(config: &UpdateCheckConfig, file_name: &str) -> anyhow::Result<()> {
    let cache = ChangelogCache::new(config.changelog_dir());
    match cache.read(file_name)? {
        Some(changelog) => println!("{changelog}"),
        None => println!("No changelog cached for {file_name}"),
    }
    Ok(())
}
