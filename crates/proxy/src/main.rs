use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ifox_domain::config::{Config, ConfigSeverity};
use ifox_proxy::state::ProxyState;

#[derive(Parser)]
#[command(name = "ifox-proxy", about = "Infrafox LLM translating proxy")]
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
                .unwrap_or_else(|_| EnvFilter::new("info,ifox_proxy=debug")),
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

    let config = Arc::new(config);
    let addr = config.proxy.server.bind_addr();
    let state = ProxyState::new(config)?;
    let app = ifox_proxy::router(state);

    tracing::info!(%addr, "llm proxy listening");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("binding proxy listener")?;
    axum::serve(listener, app).await.context("serving proxy")?;
    Ok(())
}
