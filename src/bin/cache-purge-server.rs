use std::path::PathBuf;
use std::sync::Arc;

use cache_purge::CacheManager;
use cache_purge::config::PurgeConfig;
use cache_purge::http::{PurgeHttpState, router};
use clap::Parser;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(name = "cache-purge-server", about = "Cache purge and management endpoint")]
struct Cli {
    /// JSON or TOML config; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,

    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json_logs: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let fmt_layer = if json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(false).boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    let config = match &cli.config {
        Some(path) => PurgeConfig::load(path)?,
        None => PurgeConfig::default(),
    };
    tracing::info!(
        buckets = config.bucket_count,
        shards = config.shard_count,
        proxies = config.proxies.len(),
        manager_uri = %config.manager_uri,
        "cache configured"
    );

    let (manager, _driver) = CacheManager::start(config);
    let app = router(PurgeHttpState::new(Arc::new(manager)));

    let listener = tokio::net::TcpListener::bind(&cli.listen).await?;
    tracing::info!(listen = %cli.listen, "cache-purge-server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
