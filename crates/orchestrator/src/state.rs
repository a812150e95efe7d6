use std::sync::Arc;
use std::time::Duration;

use ifox_audit::{MiscStore, RunStore, ToolCallStore};
use ifox_config_client::{AdminAuthCache, ConfigServiceClient};
use ifox_domain::config::Config;
use ifox_domain::Result;
use ifox_k8s::KubeClient;

use crate::clients::{AgentApiClient, PipelineApiClient, TelemetryCollectorClient};
use crate::gateway::CommandBroker;
use crate::metrics::Metrics;
use crate::provision::{ProvisioningStore, TeamLocks};

/// Shared orchestrator state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Upstream clients ─────────────────────────────────────────────
    pub config_service: Arc<ConfigServiceClient>,
    pub pipeline_api: Arc<PipelineApiClient>,
    pub agent_api: Arc<AgentApiClient>,
    /// Only set when a telemetry collector is configured; gates the
    /// license check.
    pub telemetry_collector: Option<Arc<TelemetryCollectorClient>>,

    // ── Stores ───────────────────────────────────────────────────────
    pub provisioning: Arc<ProvisioningStore>,
    pub runs: Arc<RunStore>,
    pub tool_calls: Arc<ToolCallStore>,
    pub misc: Arc<MiscStore>,

    // ── Concurrency & caches ─────────────────────────────────────────
    pub team_locks: Arc<TeamLocks>,
    pub admin_cache: Arc<AdminAuthCache>,

    // ── Gateway & Kubernetes ─────────────────────────────────────────
    pub broker: Arc<CommandBroker>,
    /// `None` when neither in-cluster credentials nor an explicit API
    /// URL are available; handlers answer `kubernetes_not_available`.
    pub kube: Option<Arc<KubeClient>>,

    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let orch = &config.orchestrator;
        let config_service = Arc::new(ConfigServiceClient::new(&orch.config_service_url)?);
        let pipeline_api = Arc::new(PipelineApiClient::new(&orch.pipeline_api_url)?);
        let agent_api = Arc::new(AgentApiClient::new(&orch.agent_api_url)?);
        let telemetry_collector = match &orch.telemetry_collector_url {
            Some(url) => {
                tracing::info!(%url, "telemetry collector configured");
                Some(Arc::new(TelemetryCollectorClient::new(url)?))
            }
            None => {
                tracing::info!("telemetry collector not configured");
                None
            }
        };

        let provisioning = Arc::new(ProvisioningStore::open(&config.state_dir)?);
        let runs = Arc::new(RunStore::open(&config.state_dir)?);
        let tool_calls = Arc::new(ToolCallStore::open(&config.state_dir)?);
        let misc = Arc::new(MiscStore::open(&config.state_dir)?);

        let admin_cache = Arc::new(AdminAuthCache::new(Duration::from_secs(
            orch.admin_auth_cache_ttl_seconds,
        )));
        let broker = Arc::new(CommandBroker::new(Duration::from_secs(
            orch.gateway.command_timeout_seconds,
        )));

        let kube = KubeClient::from_config(&config.k8s)?.map(Arc::new);
        if kube.is_none() {
            tracing::warn!("kubernetes not available; workload operations will be skipped");
        }

        Ok(Self {
            config_service,
            pipeline_api,
            agent_api,
            telemetry_collector,
            provisioning,
            runs,
            tool_calls,
            misc,
            team_locks: Arc::new(TeamLocks::new()),
            admin_cache,
            broker,
            kube,
            metrics: Arc::new(Metrics::new(config.metrics.enabled)),
            config,
        })
    }

    /// Internal service token used for audit writes and internal reads.
    pub fn internal_token(&self) -> Option<String> {
        std::env::var(&self.config.orchestrator.internal_token_env)
            .ok()
            .filter(|t| !t.is_empty())
    }
}
