use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use castsync::{
    Config, FeedOptions, FetchClient, FetchOrigin, FileCache, Item, MemoryRepository,
    NoopReporter, ProgressEvent, ProgressReporter, ReqwestClient, SharedProgressReporter,
    SubscribeOutcome, SyncCoordinator, SyncOutcome,
};

// Emoji with fallback for terminals without Unicode support
static SATELLITE: Emoji<'_, '_> = Emoji("📡 ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static PACKAGE: Emoji<'_, '_> = Emoji("📦 ", "[c] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static SPARKLES: Emoji<'_, '_> = Emoji("✨ ", "* ");
static BROOM: Emoji<'_, '_> = Emoji("🧹 ", "");

const SUBSCRIPTIONS_FILE: &str = "subscriptions.json";

/// Synchronize and cache RSS and Atom podcast feeds
#[derive(Parser, Debug)]
#[command(name = "castsync")]
#[command(about = "Synchronize and cache RSS and Atom podcast feeds")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to the TOML config file [default: ~/.config/castsync/config.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the feed cache and subscriptions
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Maximum number of feeds synced at once
    #[arg(short = 'c', long, global = true)]
    concurrent: Option<usize>,

    /// Quiet mode - suppress progress output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Log debug details
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a feed and list its items
    Fetch {
        url: String,

        /// Ignore a fresh cached copy
        #[arg(long)]
        no_cache: bool,
    },

    /// Add a feed to the subscriptions, or refresh it if already present
    Subscribe { url: String },

    /// Refresh every subscription and show new items (Ctrl-C stops)
    Sync,

    /// Drop the cached copy of one feed, or of all feeds
    ClearCache { url: Option<String> },
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    main_bar: ProgressBar,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_bar = multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {wide_msg}") {
            main_bar.set_style(style);
        }
        main_bar.enable_steady_tick(std::time::Duration::from_millis(100));

        Self { multi, main_bar }
    }

    fn line(&self, message: String) {
        let _ = self.multi.println(message);
    }

    fn finish(&self) {
        self.main_bar.finish_and_clear();
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FetchingFeed { url } => {
                self.main_bar
                    .set_message(format!("{SEARCH}Fetching feed: {}", url.cyan()));
            }

            ProgressEvent::CacheHit { url } => {
                self.main_bar
                    .set_message(format!("{PACKAGE}Using cached copy of {}", url.cyan()));
            }

            ProgressEvent::NotModified { url } => {
                self.main_bar
                    .set_message(format!("{PACKAGE}Unchanged since last fetch: {}", url.cyan()));
            }

            ProgressEvent::FeedParsed {
                title, total_items, ..
            } => {
                self.main_bar.set_message(format!(
                    "{HEADPHONES}{} • {} items",
                    title.bold().green(),
                    total_items.to_string().cyan()
                ));
            }

            ProgressEvent::FeedUpdated {
                title, new_items, ..
            } => {
                let count = if new_items > 0 {
                    new_items.to_string().yellow().bold()
                } else {
                    new_items.to_string().dimmed()
                };
                self.line(format!("{SUCCESS}{} - {} new", truncate_title(&title, 50), count));
            }

            ProgressEvent::FeedFailed { url, error } => {
                self.line(format!("{FAILURE}{} - {}", url.red(), error.dimmed()));
            }

            ProgressEvent::BulkSyncStarted { total_sources } => {
                self.main_bar.set_message(format!(
                    "{SEARCH}Syncing {} feeds",
                    total_sources.to_string().cyan()
                ));
            }

            ProgressEvent::BulkSyncCompleted {
                succeeded,
                failed,
                cancelled,
            } => {
                self.finish();
                println!(
                    "\n{PARTY}{} {} updated, {} failed, {} cancelled",
                    "Sync complete:".bold().green(),
                    succeeded.to_string().green().bold(),
                    if failed > 0 {
                        failed.to_string().red().bold()
                    } else {
                        failed.to_string().green()
                    },
                    cancelled.to_string().yellow()
                );
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let kept: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn format_duration(secs: u64) -> String {
    match (secs / 3600, (secs % 3600) / 60, secs % 60) {
        (0, 0, 0) => "--:--".to_string(),
        (0, m, s) => format!("{m}:{s:02}"),
        (h, m, s) => format!("{h}:{m:02}:{s:02}"),
    }
}

fn print_items(items: &[Item]) {
    for item in items {
        let date = item
            .published
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "----------".to_string());
        println!(
            "  {} {:>8}  {}",
            date.dimmed(),
            format_duration(item.duration_secs).cyan(),
            truncate_title(&item.title, 70)
        );
    }
}

fn init_tracing(quiet: bool, verbose: bool) {
    let default = if quiet {
        "warn"
    } else if verbose {
        "castsync=debug"
    } else {
        "castsync=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn default_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("castsync")
            .join("config.toml")
    })
}

async fn load_repository(path: &Path) -> Result<MemoryRepository> {
    MemoryRepository::load(path)
        .await
        .with_context(|| format!("Failed to load subscriptions from {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.quiet, args.verbose);

    let config = match args.config.clone().or_else(default_config_path) {
        Some(path) => Config::load(&path).context("Failed to load configuration")?,
        None => Config::default(),
    };
    let data_dir = args.data_dir.clone().unwrap_or_else(|| config.data_dir());
    let mut options: FeedOptions = config.feed_options();

    let indicatif = (!args.quiet).then(|| Arc::new(IndicatifReporter::new()));
    let reporter: SharedProgressReporter = match &indicatif {
        Some(r) => r.clone() as SharedProgressReporter,
        None => NoopReporter::shared(),
    };

    let cache = FileCache::open(data_dir.join("cache"))
        .await
        .context("Failed to open feed cache")?;
    let coordinator = SyncCoordinator::new(FetchClient::new(ReqwestClient::new()), cache)
        .with_reporter(reporter)
        .with_max_concurrent(args.concurrent.unwrap_or(config.max_concurrent));

    let subscriptions = data_dir.join(SUBSCRIPTIONS_FILE);

    if !args.quiet {
        println!(
            "\n{}{} {}\n",
            SATELLITE,
            "castsync".bold().magenta(),
            "- Feed Sync".dimmed()
        );
    }

    match args.command {
        Command::Fetch { url, no_cache } => {
            options.use_cache = !no_cache;
            let result = coordinator.fetch_feed(&url, &options).await;
            if let Some(r) = &indicatif {
                r.finish();
            }
            let snapshot = result.with_context(|| format!("Failed to fetch {url}"))?;

            let origin = match snapshot.origin {
                FetchOrigin::CacheHit => "cached",
                FetchOrigin::Fetched => "fetched",
                FetchOrigin::Revalidated => "revalidated",
            };
            println!(
                "{HEADPHONES}{} by {} ({}, {})",
                snapshot.source.title.bold().green(),
                snapshot.source.author.yellow(),
                snapshot.format,
                origin.dimmed()
            );
            print_items(&snapshot.items);
        }

        Command::Subscribe { url } => {
            let repo = load_repository(&subscriptions).await?;
            let result = coordinator.subscribe(&repo, &url, &options).await;
            if let Some(r) = &indicatif {
                r.finish();
            }
            let outcome = result.with_context(|| format!("Failed to subscribe to {url}"))?;
            repo.save(&subscriptions)
                .await
                .context("Failed to save subscriptions")?;

            match &outcome {
                SubscribeOutcome::Created(snapshot) => {
                    println!(
                        "{SPARKLES}Subscribed to {} ({} items)",
                        snapshot.source.title.bold().green(),
                        snapshot.items.len().to_string().cyan()
                    );
                }
                SubscribeOutcome::Updated(update) => {
                    println!(
                        "{SUCCESS}Already subscribed to {}, {} new items",
                        update.source.title.bold().green(),
                        update.new_items.len().to_string().yellow()
                    );
                    print_items(&update.new_items);
                }
            }
        }

        Command::Sync => {
            let repo = load_repository(&subscriptions).await?;
            let shutdown = async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupted, stopping sync");
                } else {
                    std::future::pending::<()>().await;
                }
            };

            let report = coordinator
                .refresh_subscriptions(&repo, &options, shutdown)
                .await
                .context("Failed to refresh subscriptions")?;
            repo.save(&subscriptions)
                .await
                .context("Failed to save subscriptions")?;

            if !args.quiet {
                for entry in &report.outcomes {
                    if let SyncOutcome::Updated(update) = &entry.outcome {
                        if !update.new_items.is_empty() {
                            println!("\n{}", update.source.title.bold());
                            print_items(&update.new_items);
                        }
                    }
                }
                println!();
            }

            if report.failed() > 0 && report.succeeded() == 0 {
                std::process::exit(1);
            }
        }

        Command::ClearCache { url } => {
            coordinator
                .clear_cache(url.as_deref())
                .await
                .context("Failed to clear cache")?;
            if let Some(r) = &indicatif {
                r.finish();
            }
            match url {
                Some(url) => println!("{BROOM}Cleared cached copy of {}", url.cyan()),
                None => println!("{BROOM}Cleared feed cache"),
            }
        }
    }

    Ok(())
}
