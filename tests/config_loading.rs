use vtlcore::config::{self, EngineConfig, LineageCachePolicy};
use vtlcore::VtlError;

#[test]
fn defaults() {
    let defaults = EngineConfig::default();
    assert_eq!(defaults.parallel_threshold, 1024);
    assert_eq!(defaults.lineage_cache, LineageCachePolicy::Strong);
    assert_eq!(defaults.log_filter, "warn");
}

#[test]
fn settings_from_toml() {
    let settings = EngineConfig::from_toml("parallel_threshold = 8\nlineage_cache = \"weak\"").expect("valid toml");
    assert_eq!(settings.parallel_threshold, 8);
    assert_eq!(settings.lineage_cache, LineageCachePolicy::Weak);
    assert_eq!(settings.log_filter, "warn", "missing keys keep their defaults");
}

#[test]
fn invalid_settings_are_reported() {
    let err = EngineConfig::from_toml("lineage_cache = \"sometimes\"").unwrap_err();
    assert!(matches!(err, VtlError::Config(_)), "unexpected error {err}");
    assert!(err.to_string().starts_with("Config error: "));
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let settings = EngineConfig::load_from("no-such-vtlcore-settings").expect("optional file");
    assert_eq!(settings.lineage_cache, LineageCachePolicy::Strong);
}

#[test]
fn installed_settings_are_visible() {
    config::install(EngineConfig {
        parallel_threshold: 3,
        ..EngineConfig::default()
    });
    assert_eq!(config::settings().parallel_threshold, 3);
    // installing a subscriber twice is harmless
    config::init_tracing(&config::settings());
    config::init_tracing(&config::settings());
}
