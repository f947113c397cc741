use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::engine::TransitionPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Host settings, read from `SPACEBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Compact once this many events were appended since the last compaction.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    pub metrics_port: Option<u16>,
    pub transition_policy: TransitionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(60),
            metrics_port: None,
            transition_policy: TransitionPolicy::Overwrite,
        }
    }
}

impl FromStr for TransitionPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(TransitionPolicy::Overwrite),
            "strict" => Ok(TransitionPolicy::Strict),
            _ => Err(()),
        }
    }
}

impl Config {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if dotenvy::dotenv().is_err() {
            tracing::debug!("no .env file found");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset variables keep their defaults; malformed ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        if let Some(dir) = lookup("SPACEBOOK_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Some(v) = parse(&lookup, "SPACEBOOK_COMPACT_THRESHOLD")? {
            cfg.compact_threshold = v;
        }
        let interval_secs: Option<u64> = parse(&lookup, "SPACEBOOK_COMPACT_INTERVAL_SECS")?;
        if let Some(secs) = interval_secs {
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    var: "SPACEBOOK_COMPACT_INTERVAL_SECS",
                    value: secs.to_string(),
                });
            }
            cfg.compact_interval = Duration::from_secs(secs);
        }
        cfg.metrics_port = parse(&lookup, "SPACEBOOK_METRICS_PORT")?;
        if let Some(policy) = parse(&lookup, "SPACEBOOK_TRANSITION_POLICY")? {
            cfg.transition_policy = policy;
        }
        Ok(cfg)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("spacebook.wal")
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}
