use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ifox_domain::config::{Config, ConfigSeverity};
use ifox_orchestrator::api;
use ifox_orchestrator::state::AppState;

#[derive(Parser)]
#[command(name = "ifox-orchestrator", about = "Infrafox orchestrator & routing plane")]
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
                .unwrap_or_else(|_| EnvFilter::new("info,ifox_orchestrator=debug")),
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
    let state = AppState::new(config.clone())?;

    // ── Stale-run sweeper ────────────────────────────────────────────
    {
        let runs = state.runs.clone();
        let max_age = config.orchestrator.run_max_age_seconds;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                let swept = runs.sweep_stale(max_age);
                for run_id in swept {
                    tracing::warn!(run_id = %run_id, "agent run timed out");
                }
            }
        });
    }

    let addr = config.orchestrator.server.bind_addr();
    let app = api::router(state);

    tracing::info!(%addr, "orchestrator listening");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("binding orchestrator listener")?;
    axum::serve(listener, app)
        .await
        .context("serving orchestrator")?;
    Ok(())
}
