//! CityDigest command-line interface.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use citydigest::config;
use citydigest::digest::DigestGenerator;
use citydigest::llm::LlmClient;
use citydigest::repository::{
    open_store, ArchiveRepository, DedupRepository, FailureRepository,
};
use citydigest::scrapers::{FetchOrchestrator, HttpFetcher};
use citydigest::sources::SourceRegistry;

#[derive(Parser, Debug)]
#[command(author, version, about = "Local news aggregation and digest generation", long_about = None)]
struct Cli {
    /// Path to the config file
    #[arg(long, env = "CITYDIGEST_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scrape configured sources into the archive
    Scrape {
        /// Source ids to scrape (default: all active sources)
        #[arg(long = "source")]
        sources: Vec<String>,
    },
    /// Generate a digest from unused articles for one source
    Digest {
        /// Source id to digest
        source: String,
        /// Maximum articles per digest
        #[arg(long, default_value_t = 30)]
        limit: i64,
    },
    /// List configured sources
    Sources,
    /// Show archive and dedup statistics
    Stats,
    /// Inspect or edit the URL blocklist
    Blocklist {
        #[command(subcommand)]
        command: BlocklistCommands,
    },
}

#[derive(Subcommand, Debug)]
enum BlocklistCommands {
    /// List blocklisted URLs
    List,
    /// Remove a URL from the blocklist, making it fetchable again
    Remove { url: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let (config, settings) = config::load_settings(cli.config.as_deref());
    settings
        .ensure_directories()
        .context("failed to create data directory")?;

    let pool = open_store(&settings.database_path()).context("failed to open article store")?;

    let registry = SourceRegistry::with_config(&config.sources);
    let dedup = DedupRepository::new(pool.clone(), settings.url_ttl(), settings.fingerprint_ttl());
    let failures = FailureRepository::new(pool.clone(), settings.url_ttl());
    let archive = ArchiveRepository::new(pool, settings.archive_batch_size);

    match cli.command {
        Commands::Scrape { sources } => {
            let endpoints = select_endpoints(&registry, &sources)?;
            let timeout = Duration::from_secs(settings.request_timeout);
            let fetcher = HttpFetcher::with_user_agent(timeout, settings.user_agent.as_deref());
            let orchestrator = FetchOrchestrator::new(
                fetcher,
                dedup,
                failures,
                archive,
                settings.scrape_policy(),
            );

            let summary = orchestrator.run(&endpoints).await;
            println!("Scrape complete:");
            println!("  sources processed:  {}", summary.sources_processed);
            println!("  sources failed:     {}", summary.sources_failed);
            println!("  articles archived:  {}", summary.fetched);
            println!("  duplicate URLs:     {}", summary.skipped_duplicate_url);
            println!("  duplicate content:  {}", summary.skipped_duplicate_content);
            println!("  blocklisted:        {}", summary.skipped_blocklisted);
            println!("  failed:             {}", summary.failed);
            println!("  newly blocklisted:  {}", summary.newly_blocklisted);
        }
        Commands::Digest { source, limit } => {
            let source_name = registry
                .get(&source)
                .map(|endpoint| endpoint.name.clone())
                .unwrap_or_else(|| source.clone());

            let llm = LlmClient::new(config.llm.clone());
            if !llm.is_available().await {
                warn!(endpoint = %llm.config().endpoint, "LLM service is not available");
                println!(
                    "LLM service is not available at {}; no digest generated.",
                    llm.config().endpoint
                );
                return Ok(());
            }

            // Digest failures are per-source: log and leave the articles
            // unused for the next attempt.
            let generator = DigestGenerator::new(archive, llm);
            match generator
                .generate_for_source(&source, &source_name, limit)
                .await
            {
                Ok(Some(digest)) => {
                    info!(
                        digest_id = %digest.id,
                        articles = digest.article_count,
                        "digest generated"
                    );
                    println!("{}", digest.title);
                    println!();
                    println!("{}", digest.body);
                }
                Ok(None) => println!("No unused articles for source '{}'.", source),
                Err(error) => {
                    warn!(source = %source, error = %error, "digest generation failed");
                    println!("Digest generation failed for '{}': {}", source, error);
                }
            }
        }
        Commands::Sources => {
            for endpoint in registry.all() {
                let status = if endpoint.active { "active" } else { "disabled" };
                println!(
                    "{:<14} {:<26} {} [{}]",
                    endpoint.id, endpoint.name, endpoint.base_url, status
                );
            }
        }
        Commands::Stats => {
            let articles = archive.article_count().await?;
            let unused = archive.unused_count().await?;
            let digests = archive.digest_count().await?;
            let urls = dedup.url_count().await?;
            let fingerprints = dedup.fingerprint_count().await?;
            let blocked = failures.blocklist_count().await?;

            println!("Archive:");
            println!("  articles:       {} ({} unused)", articles, unused);
            println!("  digests:        {}", digests);
            println!("Dedup:");
            println!("  tracked URLs:   {}", urls);
            println!("  fingerprints:   {}", fingerprints);
            println!("Blocklist:");
            println!("  blocked URLs:   {}", blocked);
        }
        Commands::Blocklist { command } => match command {
            BlocklistCommands::List => {
                let entries = failures.blocklist().await?;
                if entries.is_empty() {
                    println!("Blocklist is empty.");
                }
                for entry in entries {
                    println!(
                        "{}  added {}  reason: {}",
                        entry.url,
                        entry.added_at.format("%Y-%m-%d %H:%M"),
                        entry.reason
                    );
                }
            }
            BlocklistCommands::Remove { url } => {
                if failures.remove_from_blocklist(&url).await? {
                    println!("Removed {} from the blocklist.", url);
                } else {
                    println!("{} was not on the blocklist.", url);
                }
            }
        },
    }

    Ok(())
}

/// Resolve the endpoints a scrape should cover. Explicitly named sources
/// must exist; disabled ones are skipped with a warning either way.
fn select_endpoints(
    registry: &SourceRegistry,
    requested: &[String],
) -> anyhow::Result<Vec<citydigest::models::SourceEndpoint>> {
    let endpoints = if requested.is_empty() {
        registry.active()
    } else {
        let mut endpoints = Vec::new();
        for id in requested {
            match registry.get(id) {
                Some(endpoint) if endpoint.active => endpoints.push(endpoint.clone()),
                Some(_) => warn!(source = %id, "source is disabled in config, skipping"),
                None => warn!(source = %id, "unknown source id, skipping"),
            }
        }
        endpoints
    };

    if endpoints.is_empty() {
        anyhow::bail!("no sources to scrape");
    }
    Ok(endpoints)
}
