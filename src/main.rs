use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsdesk::config::Config;
use newsdesk::db::Database;
use newsdesk::fetcher::{start_background_refresh, Fetcher};
use newsdesk::routes::{router, AppState};
use newsdesk::sources::default_sources;

#[derive(Debug, Parser)]
#[command(name = "newsdesk", version, about = "News aggregation backend")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "news.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve,
    /// Ingest every source once and exit
    Fetch,
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = if path.exists() {
        Config::load(path)?
    } else {
        warn!("Config file {} not found, using defaults", path.display());
        Config::default()
    };
    Ok(config.with_env_overrides())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newsdesk=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let db = Database::new(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;
    db.initialize().await?;
    info!("Database initialized");
    let db = Arc::new(db);

    let fetcher = Fetcher::new(
        db.clone(),
        default_sources(&config),
        Duration::from_secs(config.request_timeout),
    )?;

    match cli.command {
        Command::Fetch => {
            let report = fetcher.fetch_all().await;
            for source in fetcher.sources() {
                let stored = report.stored_for(&source.label).unwrap_or_default();
                println!("{}: {} articles", source.label, stored);
            }
            println!("Total: {} articles", report.total());
        }
        Command::Serve => {
            if config.refresh_interval > 0 {
                let fetcher = Arc::new(fetcher);
                let interval = config.refresh_interval;
                tokio::spawn(async move {
                    start_background_refresh(fetcher, interval).await;
                });
                info!("Background refresh every {} minutes", interval);
            }

            let state = Arc::new(AppState {
                db,
                expose_reset_tokens: config.expose_reset_tokens,
            });
            let app = router(state);

            let listener = tokio::net::TcpListener::bind(&config.bind_address)
                .await
                .with_context(|| format!("Failed to bind {}", config.bind_address))?;
            info!("Server listening on http://{}", config.bind_address);

            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
