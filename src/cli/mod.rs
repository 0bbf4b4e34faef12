//! Command-line interface for chartsync.
//!
//! Provides commands for storing credentials, checking both accounts,
//! planning a reconciliation and applying it to the library.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::adapters::{ContentService, LastFmClient, SpotifyClient};
use crate::config::{self, ResolvedConfig};
use crate::core::{
    Period, Reconciler, ReconcileSnapshot, RunContext, RunParams, SearchDirection, Side, Stage,
    StageOutcome, StageState,
};
use crate::domain::{Action, ContentKind, Entry, Status};
use crate::store::{self, Credentials, KeyValueStore};

/// chartsync - Reconcile a streaming library against a listening chart
#[derive(Parser, Debug)]
#[command(name = "chartsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store service credentials
    Login {
        /// Streaming-service bearer token
        #[arg(long, env = "CHARTSYNC_LIBRARY_TOKEN", hide_env_values = true)]
        library_token: Option<String>,

        /// Chart-service API key
        #[arg(long, env = "CHARTSYNC_CHART_KEY", hide_env_values = true)]
        chart_key: Option<String>,

        /// Chart-service username
        #[arg(long)]
        chart_user: Option<String>,

        /// Forget all stored credentials
        #[arg(long, conflicts_with_all = ["library_token", "chart_key", "chart_user"])]
        logout: bool,
    },

    /// Show the signed-in profile on both services
    Whoami,

    /// Fetch both sides, compare, and print what would change
    Plan {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Plan, then import and/or clear
    Apply {
        #[command(flatten)]
        run: RunArgs,

        /// Add chart items missing from the library
        #[arg(long)]
        import: bool,

        /// Remove library items absent from the chart
        #[arg(long)]
        clear: bool,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Run parameters; unset values fall back to the configured defaults
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// artist, album or track
    #[arg(short, long)]
    pub kind: Option<ContentKind>,

    /// overall, 7day, 1month, 3month, 6month or 12month
    #[arg(short, long)]
    pub period: Option<Period>,

    /// Number of chart entries to fetch
    #[arg(short, long)]
    pub limit: Option<u32>,

    /// Minimum play count for a chart entry to be considered
    #[arg(long)]
    pub min_plays: Option<u64>,

    /// Search the chart service for library items instead
    #[arg(long)]
    pub reverse: bool,
}

impl RunArgs {
    pub fn params(&self, defaults: RunParams) -> RunParams {
        RunParams {
            kind: self.kind.unwrap_or(defaults.kind),
            period: self.period.unwrap_or(defaults.period),
            limit: self.limit.unwrap_or(defaults.limit),
            min_play_count: self.min_plays.unwrap_or(defaults.min_play_count),
        }
    }

    pub fn direction(&self) -> SearchDirection {
        if self.reverse {
            SearchDirection::LibraryInChart
        } else {
            SearchDirection::ChartInLibrary
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Login {
                library_token,
                chart_key,
                chart_user,
                logout,
            } => login(library_token, chart_key, chart_user, logout),
            Commands::Whoami => whoami().await,
            Commands::Plan { run } => {
                let (reconciler, _) = plan(&run).await?;
                print_plan(&reconciler.snapshot());
                Ok(())
            }
            Commands::Apply { run, import, clear } => apply(&run, import, clear).await,
            Commands::Config => show_config(),
        }
    }
}

fn services(cfg: &ResolvedConfig) -> (Arc<SpotifyClient>, Arc<LastFmClient>) {
    let library = SpotifyClient::new(cfg.library_url.as_str()).with_search_limit(cfg.search_limit);
    let chart = LastFmClient::new(cfg.chart_url.as_str()).with_search_limit(cfg.search_limit);
    (Arc::new(library), Arc::new(chart))
}

fn load_context() -> Result<RunContext> {
    let store = KeyValueStore::open_default()?;
    Credentials::load(&store).context("Not signed in; run `chartsync login` first")
}

/// Store or forget credentials
fn login(
    library_token: Option<String>,
    chart_key: Option<String>,
    chart_user: Option<String>,
    logout: bool,
) -> Result<()> {
    let store = KeyValueStore::open_default()?;

    if logout {
        for key in [store::LIBRARY_TOKEN, store::CHART_API_KEY, store::CHART_USERNAME] {
            store.remove(key)?;
        }
        println!("Removed stored credentials from {}", store.path().display());
        return Ok(());
    }

    let updates = [
        (store::LIBRARY_TOKEN, library_token),
        (store::CHART_API_KEY, chart_key),
        (store::CHART_USERNAME, chart_user),
    ];

    let mut stored = 0;
    for (key, value) in updates {
        if let Some(value) = value {
            store.set(key, value.trim())?;
            println!("Stored {}", key);
            stored += 1;
        }
    }

    if stored == 0 {
        anyhow::bail!("Nothing to store; pass --library-token, --chart-key or --chart-user");
    }
    Ok(())
}

/// Print both profiles
async fn whoami() -> Result<()> {
    let cfg = config::config()?;
    let ctx = load_context()?;
    let (library, chart) = services(cfg);

    let (library_profile, chart_profile) = tokio::join!(
        library.fetch_profile(&ctx.library),
        chart.fetch_profile(&ctx.chart)
    );

    for (name, profile) in [
        (library.name().to_string(), library_profile),
        (chart.name().to_string(), chart_profile),
    ] {
        match profile {
            Ok(p) => println!(
                "{:<10} {} ({})",
                name,
                p.display_name.as_deref().unwrap_or(&p.id),
                p.profile_url.as_deref().unwrap_or("-")
            ),
            Err(e) => println!("{:<10} error: {}", name, e),
        }
    }

    Ok(())
}

/// Fetch both sides and compare them
async fn plan(run: &RunArgs) -> Result<(Reconciler, RunContext)> {
    let cfg = config::config()?;
    let ctx = load_context()?;
    let (library, chart) = services(cfg);

    let reconciler = Reconciler::new(library, chart);
    reconciler.set_params(run.params(cfg.defaults))?;

    let (library_fetch, chart_fetch) = reconciler.refresh(&ctx).await;
    library_fetch?;
    chart_fetch?;

    let failed = report_failures(&reconciler, &[Stage::FetchLibrary, Stage::FetchChart]);
    if failed {
        anyhow::bail!("Could not fetch both collections");
    }

    let done = AtomicBool::new(false);
    let (outcome, _) = tokio::join!(
        async {
            let outcome = reconciler.compare(&ctx, run.direction()).await;
            done.store(true, Ordering::Relaxed);
            outcome
        },
        show_progress(&reconciler, &done)
    );

    if outcome? == StageOutcome::Failed {
        report_failures(&reconciler, &[Stage::Search]);
        anyhow::bail!("Search failed");
    }

    Ok((reconciler, ctx))
}

async fn show_progress(reconciler: &Reconciler, done: &AtomicBool) {
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    while !done.load(Ordering::Relaxed) {
        ticker.tick().await;
        eprint!("\rSearching... {:>3}%", reconciler.progress());
        let _ = std::io::stderr().flush();
    }
    eprintln!("\rSearching... done");
}

/// Print recorded stage failures with hints; returns whether any failed
fn report_failures(reconciler: &Reconciler, stages: &[Stage]) -> bool {
    let mut failed = false;
    for &stage in stages {
        if let StageState::Failed(e) = reconciler.stage_state(stage) {
            eprintln!("{} failed: {}", stage, e);
            if let Some(hint) = e.hint() {
                eprintln!("  hint: {}", hint);
            }
            failed = true;
        }
    }
    failed
}

async fn apply(run: &RunArgs, import: bool, clear: bool) -> Result<()> {
    if !import && !clear {
        anyhow::bail!("Nothing to apply; pass --import and/or --clear");
    }

    let (reconciler, ctx) = plan(run).await?;
    print_plan(&reconciler.snapshot());
    println!();

    let readiness = reconciler.readiness();

    if import {
        if readiness.import {
            let outcome = reconciler.import(&ctx).await?;
            report_mutation(&reconciler, Stage::Import, outcome);
        } else {
            println!("{}: nothing to do", Stage::Import);
        }
    }

    if clear {
        if readiness.clear {
            let outcome = reconciler.clear(&ctx).await?;
            report_mutation(&reconciler, Stage::Clear, outcome);
        } else {
            println!("{}: nothing to do", Stage::Clear);
        }
    }

    Ok(())
}

fn report_mutation(reconciler: &Reconciler, stage: Stage, outcome: StageOutcome) {
    match outcome {
        StageOutcome::Applied => println!("{}: done", stage),
        StageOutcome::Discarded => println!("{}: done, plan changed meanwhile", stage),
        StageOutcome::Failed => {
            report_failures(reconciler, &[stage]);
        }
    }
}

fn print_plan(snapshot: &ReconcileSnapshot) {
    let params = snapshot.params;
    println!(
        "Run {} ({}s, {}, top {}, at least {} plays)",
        snapshot.run_id, params.kind, params.period, params.limit, params.min_play_count
    );
    println!();

    for (side, title) in [(Side::Chart, "CHART"), (Side::Library, "LIBRARY")] {
        let counts = snapshot.counts(side);
        let summary: Vec<String> = counts
            .iter()
            .map(|(status, n)| format!("{} {}", n, status))
            .collect();
        println!("{}: {} ({})", title, counts.total(), summary.join(", "));
    }
    println!();

    println!("{:<8} {:<10} {:<50}", "ACTION", "STATUS", "NAME");
    println!("{}", "-".repeat(70));

    let mut rows = 0;
    for (side, action) in [(Side::Chart, Action::Import), (Side::Library, Action::Clear)] {
        if let Some(collection) = snapshot.collection(side) {
            for entry in collection.marked(action) {
                print_row(entry);
                rows += 1;
            }
        }
    }
    if rows == 0 {
        println!("(nothing to import or clear)");
    }

    let readiness = snapshot.readiness;
    println!();
    println!(
        "Ready: import={} clear={}",
        readiness.import, readiness.clear
    );
}

fn print_row(entry: &Entry) {
    let status = if entry.status == Status::Marked {
        "pending".to_string()
    } else {
        entry.status.to_string()
    };
    println!(
        "{:<8} {:<10} {:<50}",
        entry.action,
        status,
        entry.record.display_name()
    );
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("chartsync configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:        {}", cfg.home.display());
    println!("  Credentials: {}", cfg.home.join("credentials.json").display());
    println!();
    println!("Services:");
    println!("  Library: {}", cfg.library_url);
    println!("  Chart:   {}", cfg.chart_url);
    println!("  Search results per item: {}", cfg.search_limit);
    println!();
    println!("Defaults:");
    println!("  Kind:           {}", cfg.defaults.kind);
    println!("  Period:         {}", cfg.defaults.period);
    println!("  Limit:          {}", cfg.defaults.limit);
    println!("  Min play count: {}", cfg.defaults.min_play_count);

    Ok(())
}
