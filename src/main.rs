use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use favicon_cache::{
    config::Config,
    favicon::{CacheKey, FaviconFetcher, FaviconLookup, FetchState, IconCache},
    links::{load_links, matching_links},
};

#[derive(Parser)]
#[command(name = "favicon-cache")]
#[command(version)]
#[command(about = "Fetch and cache website favicons for launcher frontends")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Icon cache directory (overrides config file)
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Number of fetch workers (overrides config file)
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// Per-request timeout, e.g. "10s" (overrides config file)
    #[arg(short, long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Non-blocking lookup: print the cached icon path or "-" for each URL
    ///
    /// Fetches scheduled by the lookup are abandoned on exit unless --wait is given.
    Lookup {
        /// Let scheduled fetches finish before exiting so the next run is served from cache
        #[arg(long)]
        wait: bool,
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Fuzzy-match link names and print each hit with its URL and icon
    Search {
        /// JSON file mapping link names to URLs
        #[arg(short, long, value_name = "FILE")]
        links: PathBuf,
        /// Let scheduled fetches finish before exiting so the next run is served from cache
        #[arg(long)]
        wait: bool,
        /// Characters to match, in order, against link names (empty lists everything)
        #[arg(default_value = "")]
        query: String,
    },
    /// Fetch icons for the given URLs and wait for every fetch to settle
    Prefetch {
        /// JSON file mapping link names to URLs
        #[arg(short, long, value_name = "FILE")]
        links: Option<PathBuf>,
        urls: Vec<String>,
    },
    /// Print the cache key and cache path for a URL without any network access
    Key { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("favicon_cache={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting favicon-cache v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config.display());

    if let Some(cache_dir) = cli.cache_dir {
        config.cache.directory = cache_dir;
    }
    if let Some(workers) = cli.workers {
        config.fetcher.workers = workers;
    }
    if let Some(timeout) = cli.timeout {
        config.fetcher.request_timeout = timeout;
    }
    config.validate()?;

    info!("Using icon cache: {}", config.cache.directory.display());

    match cli.command {
        Command::Key { url } => {
            let cache = IconCache::new(config.cache.directory.clone());
            println!("{}\t{}", CacheKey::encode(&url), cache.path_for(&url).display());
        }
        Command::Lookup { wait, urls } => {
            let lookup = FaviconLookup::new(Arc::new(FaviconFetcher::from_config(&config)?));
            for url in &urls {
                println!("{url}\t{}", icon_column(&lookup, url));
            }
            finish_lookups(&lookup, wait).await;
        }
        Command::Search { links, wait, query } => {
            let links = load_links(&links);
            let lookup = FaviconLookup::new(Arc::new(FaviconFetcher::from_config(&config)?));
            for (name, url) in matching_links(&links, &query) {
                println!("{name}\t{url}\t{}", icon_column(&lookup, url));
            }
            finish_lookups(&lookup, wait).await;
        }
        Command::Prefetch { links, mut urls } => {
            if let Some(links_file) = links {
                urls.extend(load_links(&links_file).into_values());
            }

            let fetcher = FaviconFetcher::from_config(&config)?;
            for url in &urls {
                fetcher.request(url);
            }
            fetcher.wait_idle().await;

            for url in &urls {
                let state = match fetcher.state_of(url) {
                    FetchState::Cached => fetcher.cache().path_for(url).display().to_string(),
                    FetchState::Failed => "failed".to_string(),
                    FetchState::InFlight => "pending".to_string(),
                    FetchState::Unknown => "unknown".to_string(),
                };
                println!("{url}\t{state}");
            }

            info!(
                "Prefetch finished: {} urls, {} failed",
                urls.len(),
                fetcher.failed_count()
            );
            fetcher.shutdown().await;
        }
    }

    Ok(())
}

fn icon_column(lookup: &FaviconLookup, url: &str) -> String {
    lookup
        .icon_for(url)
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "-".to_string())
}

async fn finish_lookups(lookup: &FaviconLookup, wait: bool) {
    let fetcher = lookup.fetcher();
    if wait {
        info!("Waiting for {} scheduled fetches", fetcher.in_flight_count());
        fetcher.wait_idle().await;
    }
    fetcher.shutdown().await;
}
