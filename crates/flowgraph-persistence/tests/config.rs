use flowgraph_persistence::EngineConfig;

#[test]
fn engine_config_falls_back_to_defaults_without_database_url() {
    std::env::remove_var("DATABASE_URL");
    let cfg = EngineConfig::from_env();
    assert!(cfg.min_connections <= cfg.max_connections);
    assert!(cfg.default_http_timeout_ms > 0);
}
