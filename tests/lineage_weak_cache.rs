use vtlcore::config::{self, EngineConfig, LineageCachePolicy};
use vtlcore::Transformation;

// every test in this binary runs under the weak policy
fn setup() -> Transformation {
    config::install(EngineConfig {
        lineage_cache: LineageCachePolicy::Weak,
        ..EngineConfig::default()
    });
    Transformation::membership(Transformation::var("ds"), "obs")
}

#[test]
fn weak_cache_serves_live_lineage() {
    let t = setup();
    let first = t.lineage();
    let second = t.lineage();
    assert!(first.same_as(&second), "held lineage is shared");
}

#[test]
fn weak_cache_forgets_dropped_lineage() {
    let t = setup();
    let text = t.lineage().to_string();
    assert!(t.cached_lineage().is_none(), "nothing holds the lineage any more");
    assert_eq!(t.lineage().to_string(), text, "recomputed on the next request");
}
