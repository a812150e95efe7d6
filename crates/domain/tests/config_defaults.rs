use ifox_domain::config::Config;

#[test]
fn default_ports_are_distinct_per_service() {
    let config = Config::default();
    assert_eq!(config.orchestrator.server.port, 8080);
    assert_eq!(config.proxy.server.port, 8002);
    assert_eq!(config.ragcache.server.port, 8010);
}

#[test]
fn session_defaults_match_runtime_contract() {
    let config = Config::default();
    assert_eq!(config.session.execute_timeout_seconds, 600);
    assert_eq!(config.session.question_timeout_seconds, 60);
    assert_eq!(config.session.max_tool_output_bytes, 50_000);
    assert_eq!(config.session.max_tool_loops, 25);
}

#[test]
fn reconnect_defaults() {
    let config = Config::default();
    assert_eq!(config.cluster_agent.reconnect.initial_delay_seconds, 1);
    assert_eq!(config.cluster_agent.reconnect.multiplier, 2.0);
    assert_eq!(config.cluster_agent.reconnect.max_delay_seconds, 60);
}

#[test]
fn ragcache_limits_scale_to_bytes() {
    let config = Config::default();
    assert_eq!(config.ragcache.max_trees, 5);
    assert_eq!(config.ragcache.max_cache_bytes(), 16 * (1u64 << 30));
}

#[test]
fn explicit_sections_parse() {
    let toml_str = r#"
[orchestrator.server]
host = "0.0.0.0"
port = 9090

[proxy]
deployment_model = "openai/gpt-4o"

[cluster_agent]
cluster_name = "prod-east"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.orchestrator.server.port, 9090);
    assert_eq!(config.proxy.deployment_model.as_deref(), Some("openai/gpt-4o"));
    assert_eq!(config.cluster_agent.cluster_name, "prod-east");
}
