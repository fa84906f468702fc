use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use harvester_core::indexer::{
    BasicSearch, BookSearch, MovieSearch, MusicSearch, SearchBase, TvSearch,
};
use harvester_core::sync::Application;
use harvester_core::{
    create_sync_system, load_config, validate_config, ApplicationRegistry, ArrApplication,
    Config, HttpTransport, IndexerRegistry, LogFormat, QueryOrchestrator, SanitizedConfig,
    SearchCriteria, StandardCategory, StatusTracker, SyncEvent, Transport,
};

/// Indexer aggregation with failure isolation and downstream sync
#[derive(Parser, Debug)]
#[command(name = "harvester", version, about)]
struct Cli {
    /// Config file (default: $HARVESTER_CONFIG, then config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query every enabled indexer and print the merged results as JSON
    Search {
        term: String,

        #[arg(long, value_enum, default_value_t = Kind::Basic)]
        kind: Kind,

        /// Standard category ids, e.g. 2000 or 5040
        #[arg(long = "category")]
        categories: Vec<u32>,

        #[arg(long)]
        limit: Option<u32>,
    },

    /// Push the indexer roster to downstream applications
    Sync {
        /// Only this application (default: all enabled)
        #[arg(long)]
        application: Option<u32>,
    },

    /// Print the effective configuration with secrets redacted
    Config,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    Basic,
    Movie,
    Tv,
    Music,
    Book,
}

fn criteria(kind: Kind, base: SearchBase) -> SearchCriteria {
    match kind {
        Kind::Basic => SearchCriteria::Basic(BasicSearch { base }),
        Kind::Movie => SearchCriteria::Movie(MovieSearch {
            base,
            imdb_id: None,
            year: None,
        }),
        Kind::Tv => SearchCriteria::Tv(TvSearch {
            base,
            season: None,
            episode: None,
            tvdb_id: None,
        }),
        Kind::Music => SearchCriteria::Music(MusicSearch {
            base,
            artist: None,
            album: None,
            label: None,
            year: None,
        }),
        Kind::Book => SearchCriteria::Book(BookSearch {
            base,
            author: None,
            title: None,
        }),
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        error!("Fatal error: {:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli
        .config
        .or_else(|| std::env::var("HARVESTER_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    init_logging(config.logging.format);
    info!(
        path = ?config_path,
        indexers = config.indexers.len(),
        applications = config.applications.len(),
        "Configuration loaded"
    );

    let transport: Arc<dyn Transport> = Arc::new(
        HttpTransport::new(&config.transport).context("Failed to create HTTP transport")?,
    );
    let indexers = Arc::new(IndexerRegistry::from_definitions(config.indexers.clone()));

    match cli.command {
        Command::Search {
            term,
            kind,
            categories,
            limit,
        } => search(&config, indexers, transport, kind, &term, categories, limit).await,
        Command::Sync { application } => sync(&config, indexers, transport, application).await,
        Command::Config => print_json(&SanitizedConfig::from(&config)),
    }
}

async fn search(
    config: &Config,
    indexers: Arc<IndexerRegistry>,
    transport: Arc<dyn Transport>,
    kind: Kind,
    term: &str,
    categories: Vec<u32>,
    limit: Option<u32>,
) -> Result<()> {
    let status = Arc::new(StatusTracker::new("indexer", config.backoff.clone()));
    let orchestrator =
        QueryOrchestrator::new(config.orchestrator.clone(), indexers, transport, status);

    let mut base = SearchBase::new(term)
        .with_categories(categories.into_iter().map(StandardCategory).collect());
    if let Some(limit) = limit {
        base = base.with_limit(limit);
    }

    let outcome = orchestrator.search(&criteria(kind, base)).await;
    info!(
        results = outcome.results.len(),
        failures = outcome.failures().count(),
        duration_ms = outcome.duration_ms,
        "Search finished"
    );
    print_json(&outcome)
}

async fn sync(
    config: &Config,
    indexers: Arc<IndexerRegistry>,
    transport: Arc<dyn Transport>,
    application: Option<u32>,
) -> Result<()> {
    let applications = Arc::new(ApplicationRegistry::new());
    for definition in &config.applications {
        let app: Arc<dyn Application> = Arc::new(ArrApplication::new(
            definition.clone(),
            Arc::clone(&transport),
            config.sync.feed_settings(),
        ));
        applications.insert(app);
    }

    let status = Arc::new(StatusTracker::new("application", config.backoff.clone()));
    let (_handle, mut service) =
        create_sync_system(indexers, applications, status, config.sync.buffer_size);

    let report = service
        .handle_event(&SyncEvent::ManualSync {
            application_id: application,
        })
        .await;
    info!(
        pushes = report.pushes.len(),
        failed = report.failed(),
        "Sync finished"
    );
    print_json(&report)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}
