use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ifox_cluster_agent::connection::GatewayConnection;
use ifox_domain::config::{Config, ConfigSeverity};
use ifox_k8s::executor::CommandExecutor;
use ifox_k8s::KubeClient;

#[derive(Parser)]
#[command(name = "ifox-cluster-agent", about = "Infrafox in-cluster command agent")]
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
                .unwrap_or_else(|_| EnvFilter::new("info,ifox_cluster_agent=debug")),
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

    let api_key = std::env::var(&config.cluster_agent.api_key_env)
        .with_context(|| format!("{} must be set", config.cluster_agent.api_key_env))?;

    let kube = KubeClient::from_config(&config.k8s)?
        .context("no Kubernetes credentials: set k8s.api_url or run in-cluster")?;
    let executor = Arc::new(CommandExecutor::new(kube));

    let connection = GatewayConnection::new(
        config.cluster_agent.clone(),
        api_key,
        env!("CARGO_PKG_VERSION").to_string(),
        executor,
    )?;
    let stop = connection.stop_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });

    connection.run().await;
    Ok(())
}
