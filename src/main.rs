//! WebMonitor CLI: run the monitor daemon or drive one-shot scans.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use webmonitor::config::{Config, LogFormat};
use webmonitor::discovery::CrawlSettings;
use webmonitor::scan::{run_scan_job, ScanOutcome};
use webmonitor::store::{MemoryStore, Store};
use webmonitor::types::{DiscoveryMethod, Job, JobType, Site};
use webmonitor::MonitorService;

#[derive(Parser)]
#[command(name = "webmonitor")]
#[command(about = "Structural change monitoring for web sites")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor: dispatcher, reaper, and HTTP API
    Serve,

    /// Run a single scan of a URL and print the counters
    Scan {
        /// Site root URL
        url: String,

        /// Discovery method
        #[arg(long, value_enum, default_value = "crawling")]
        method: DiscoveryArg,

        /// Maximum crawl depth
        #[arg(short, long, default_value = "2")]
        depth: u8,

        /// Maximum pages to discover
        #[arg(short, long, default_value = "100")]
        max_pages: usize,

        /// Delay between fetches in milliseconds
        #[arg(long, default_value = "500")]
        delay_ms: u64,
    },

    /// Write a default configuration file
    Init {
        /// Output path
        #[arg(default_value = "webmonitor.toml")]
        path: PathBuf,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum DiscoveryArg {
    Sitemap,
    Crawling,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::from_env(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_tracing(&config);

    match cli.command {
        Commands::Serve => {
            let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
            let service = MonitorService::new(config, store);
            service.run().await
        }

        Commands::Scan {
            url,
            method,
            depth,
            max_pages,
            delay_ms,
        } => {
            let url = webmonitor::types::canonicalize_url(&url)
                .with_context(|| format!("'{}' is not an absolute http(s) URL", url))?;
            let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

            let mut site = Site::new(uuid::Uuid::new_v4(), url.clone(), url.clone());
            site.discovery.method = match method {
                DiscoveryArg::Sitemap => DiscoveryMethod::Sitemap,
                DiscoveryArg::Crawling => DiscoveryMethod::Crawling,
            };
            site.discovery.crawl = CrawlSettings {
                max_depth: depth,
                max_pages,
                crawl_delay_ms: delay_ms,
                ..Default::default()
            };
            let site_id = store.create_site(site).await?;

            let job = Job::new(site_id, JobType::Scan);
            store.create_job(job.clone()).await?;
            store.acquire_job_lease(job.id).await?;
            let job = store
                .get_job(job.id)
                .await?
                .context("job row disappeared")?;

            match run_scan_job(&store, &config.crawler, &job).await? {
                ScanOutcome::Completed(report) => {
                    println!("scan {} completed", report.scan_id);
                    println!("  total pages:   {}", report.total_pages);
                    println!("  new pages:     {}", report.new_pages);
                    println!("  changed pages: {}", report.changed_pages);
                    println!("  removed pages: {}", report.removed_pages);
                    println!("  error pages:   {}", report.error_pages);
                    println!("  duration:      {}ms", report.duration_ms);

                    let scan = store
                        .get_scan(report.scan_id)
                        .await?
                        .context("scan row disappeared")?;
                    if !scan.warnings.is_empty() {
                        println!("  warnings:");
                        for warning in &scan.warnings {
                            println!("    - {}", warning);
                        }
                    }
                    for url in scan.scanned_urls.iter().take(25) {
                        println!("  {}", url);
                    }
                }
                ScanOutcome::Cancelled => println!("scan cancelled"),
            }
            Ok(())
        }

        Commands::Init { path } => {
            let rendered =
                toml::to_string_pretty(&Config::default()).context("config serialization")?;
            std::fs::write(&path, rendered)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("wrote {}", path.display());
            Ok(())
        }
    }
}
