use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ifox_domain::config::{Config, ConfigSeverity};
use ifox_ragcache::api::{self, RagState};
use ifox_ragcache::cache::TreeCache;
use ifox_ragcache::fetch::{DisabledFetcher, HttpTreeFetcher, TreeFetcher};

#[derive(Parser)]
#[command(name = "ifox-ragcache", about = "Infrafox knowledge-base service")]
struct Cli {
    /// Path to the platform TOML config.
    #[arg(long, default_value = "infrafox.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ifox_ragcache=debug")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config: Config = match std::fs::read_to_string(&cli.config) {
        Ok(raw) => toml::from_str(&raw).context("parsing config")?,
        Err(_) => {
            tracing::warn!(path = %cli.config.display(), "config file missing, using defaults");
            Config::default()
        }
    };
    for issue in config.validate() {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => anyhow::bail!("config: {issue}"),
        }
    }

    let rag = config.ragcache.clone();
    std::fs::create_dir_all(&rag.trees_dir).context("creating trees dir")?;

    let fetcher: Arc<dyn TreeFetcher> = if rag.s3.enabled {
        Arc::new(HttpTreeFetcher::new(&rag.s3)?)
    } else {
        Arc::new(DisabledFetcher)
    };
    let cache = Arc::new(TreeCache::new(
        rag.trees_dir.clone(),
        fetcher,
        rag.max_trees,
        rag.max_cache_bytes(),
    ));

    tracing::info!(
        trees_dir = %rag.trees_dir.display(),
        default_tree = %rag.default_tree,
        s3_enabled = rag.s3.enabled,
        max_trees = rag.max_trees,
        max_cache_gb = rag.max_cache_gb,
        "knowledge base starting"
    );

    // Preload the default tree; absence is not fatal.
    if !rag.default_tree.is_empty() {
        match cache.load(&rag.default_tree).await {
            Ok(_) => tracing::info!(tree = %rag.default_tree, "default tree preloaded"),
            Err(e) => tracing::warn!(tree = %rag.default_tree, error = %e, "default tree not available"),
        }
    }

    let addr = rag.server.bind_addr();
    let state = Arc::new(RagState { cache, config: rag });
    let app = api::router(state);

    tracing::info!(%addr, "knowledge base listening");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("binding ragcache listener")?;
    axum::serve(listener, app).await.context("serving ragcache")?;
    Ok(())
}
