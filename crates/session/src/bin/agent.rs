use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ifox_domain::config::{Config, ConfigSeverity};
use ifox_session::server::{self, SessionManager};

#[derive(Parser)]
#[command(name = "ifox-agent", about = "Infrafox agent session service")]
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
                .unwrap_or_else(|_| EnvFilter::new("info,ifox_session=debug")),
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

    let internal_token = std::env::var(&config.orchestrator.internal_token_env)
        .unwrap_or_default();
    let addr = config.session.server.bind_addr();
    let state = Arc::new(SessionManager::new(config.session.clone(), internal_token));
    let app = server::router(state);

    tracing::info!(%addr, "agent session service listening");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("binding agent listener")?;
    axum::serve(listener, app).await.context("serving agent")?;
    Ok(())
}
