//! Runtime configuration with environment overrides.
//!
//! Every knob has a compiled-in default; `from_env()` applies `SONDE_*`
//! variables on top. Unparseable values are logged and ignored.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Default upper bound for a discovered file, in bytes (1 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Default number of jobs the orchestrator runs at once.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Default number of files persisted per storage call.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default size of the rayon pool used for per-file extraction.
pub const DEFAULT_PARSE_WORKERS: usize = 4;

/// Terminal jobs older than this are evicted by the sweep (24h).
pub const DEFAULT_JOB_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = trimmed, "ignoring unparseable environment override");
            None
        }
    }
}

#[derive(Clone, Debug)]
pub struct DiscoveryConfig {
    pub max_file_size: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DiscoveryConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_parse::<u64>("SONDE_MAX_FILE_SIZE") {
            cfg.max_file_size = v;
        }
        cfg
    }
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Upper bound on simultaneously `processing` jobs. Never below 1.
    pub concurrency: usize,
    pub retention: Duration,
    pub sweep_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retention: DEFAULT_JOB_RETENTION,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_parse::<usize>("SONDE_CONCURRENCY") {
            cfg.concurrency = v.max(1);
        }
        if let Some(v) = env_parse::<u64>("SONDE_JOB_RETENTION_SECS") {
            cfg.retention = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u64>("SONDE_SWEEP_INTERVAL_SECS") {
            cfg.sweep_interval = Duration::from_secs(v.max(1));
        }
        cfg
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub parse_workers: usize,
    /// Directory under which clones and archive extractions are placed.
    pub workspace_root: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            parse_workers: DEFAULT_PARSE_WORKERS,
            workspace_root: PathBuf::from("workspace"),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_parse::<usize>("SONDE_BATCH_SIZE") {
            cfg.batch_size = v.max(1);
        }
        if let Some(v) = env_parse::<usize>("SONDE_PARSE_WORKERS") {
            cfg.parse_workers = v.max(1);
        }
        if let Some(v) = env_parse::<PathBuf>("SONDE_WORKSPACE_ROOT") {
            cfg.workspace_root = v;
        }
        cfg
    }
}

/// All configuration sections in one place.
#[derive(Clone, Debug, Default)]
pub struct SondeConfig {
    pub discovery: DiscoveryConfig,
    pub orchestrator: OrchestratorConfig,
    pub pipeline: PipelineConfig,
}

impl SondeConfig {
    pub fn from_env() -> Self {
        Self {
            discovery: DiscoveryConfig::from_env(),
            orchestrator: OrchestratorConfig::from_env(),
            pipeline: PipelineConfig::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SondeConfig::default();
        assert_eq!(cfg.discovery.max_file_size, 1_048_576);
        assert_eq!(cfg.orchestrator.concurrency, 2);
        assert_eq!(cfg.orchestrator.retention, Duration::from_secs(86_400));
        assert_eq!(cfg.pipeline.batch_size, 100);
        assert_eq!(cfg.pipeline.parse_workers, 4);
    }

    #[test]
    fn concurrency_never_drops_to_zero() {
        let cfg = OrchestratorConfig::default().with_concurrency(0);
        assert_eq!(cfg.concurrency, 1);
    }
}
