//! Engine-wide settings.
//!
//! Settings are read once with the `config` crate, layering an optional
//! `vtlcore.toml` and `VTL_`-prefixed environment variables over the
//! defaults, and then installed as the engine-wide singleton consulted by
//! the transformations.

use std::sync::{Arc, RwLock};

use ::config::{Config, Environment, File, FileFormat};
use lazy_static::lazy_static;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::error::Result;

/// How long a transformation keeps the lineage it computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineageCachePolicy {
    /// Keep the lineage until it is evicted explicitly.
    Strong,
    /// Keep it only while some value still holds it.
    Weak,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Row count from which partitions and groups go to the rayon pool.
    pub parallel_threshold: usize,
    pub lineage_cache: LineageCachePolicy,
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: 1024,
            lineage_cache: LineageCachePolicy::Strong,
            log_filter: String::from("warn"),
        }
    }
}

impl EngineConfig {
    /// Loads `vtlcore.toml` (if present) and `VTL_*` variables over the defaults.
    pub fn load() -> Result<Self> {
        Self::load_from("vtlcore")
    }
    pub fn load_from(file_stem: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(file_stem).required(false))
            .add_source(Environment::with_prefix("VTL").try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
    /// Parses settings from a TOML snippet, used for embedded configurations.
    pub fn from_toml(toml: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

lazy_static! {
    static ref SETTINGS: RwLock<Arc<EngineConfig>> = RwLock::new(Arc::new(EngineConfig::default()));
}

/// Replaces the engine-wide settings.
pub fn install(config: EngineConfig) {
    let mut settings = SETTINGS.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    *settings = Arc::new(config);
}

/// The engine-wide settings currently installed.
pub fn settings() -> Arc<EngineConfig> {
    let settings = SETTINGS.read().unwrap_or_else(|poisoned| poisoned.into_inner());
    Arc::clone(&settings)
}

/// Sets up a `tracing` subscriber honoring `RUST_LOG`, falling back to the
/// configured filter. Calling it again once a subscriber exists does nothing.
pub fn init_tracing(config: &EngineConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
