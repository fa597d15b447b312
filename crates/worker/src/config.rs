use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use secinv_core::feature_gate::RootAllowList;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(anyhow!("Unknown log format '{other}', expected 'text' or 'json'")),
        }
    }
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// Pool size (default: `20`).
    pub db_max_connections: u32,
    /// Root namespaces analyzer status updates run for.
    pub enabled_roots: RootAllowList,
    /// Delay between outbox polls (default: 1s).
    pub outbox_poll_interval: Duration,
    /// Events claimed per poll (default: `100`).
    pub outbox_batch_size: i64,
    /// Attempts before an event is left for inspection (default: `5`).
    pub outbox_max_attempts: i32,
    /// Settings sweep period; `None` disables the sweep.
    pub sweep_interval: Option<Duration>,
    pub log_format: LogFormat,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default  |
    /// |---------------------------------|----------|
    /// | `DATABASE_URL`                  | required |
    /// | `DB_MAX_CONNECTIONS`            | `20`     |
    /// | `ANALYZER_STATUS_ENABLED_ROOTS` | `*`      |
    /// | `OUTBOX_POLL_INTERVAL_MS`       | `1000`   |
    /// | `OUTBOX_BATCH_SIZE`             | `100`    |
    /// | `OUTBOX_MAX_ATTEMPTS`           | `5`      |
    /// | `SWEEP_INTERVAL_SECS`           | `3600`   |
    /// | `LOG_FORMAT`                    | `text`   |
    ///
    /// `SWEEP_INTERVAL_SECS=0` disables the settings sweep.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;

        let db_max_connections: u32 = parse_or(&lookup, "DB_MAX_CONNECTIONS", 20)?;

        let enabled_roots = RootAllowList::parse(
            &lookup("ANALYZER_STATUS_ENABLED_ROOTS").unwrap_or_else(|| "*".into()),
        )
        .map_err(|e| anyhow!("ANALYZER_STATUS_ENABLED_ROOTS: {e}"))?;

        let poll_ms: u64 = parse_or(&lookup, "OUTBOX_POLL_INTERVAL_MS", 1000)?;
        if poll_ms == 0 {
            anyhow::bail!("OUTBOX_POLL_INTERVAL_MS must be greater than zero");
        }

        let outbox_batch_size: i64 = parse_or(&lookup, "OUTBOX_BATCH_SIZE", 100)?;
        if outbox_batch_size <= 0 {
            anyhow::bail!("OUTBOX_BATCH_SIZE must be greater than zero");
        }

        let outbox_max_attempts: i32 = parse_or(&lookup, "OUTBOX_MAX_ATTEMPTS", 5)?;

        let sweep_secs: u64 = parse_or(&lookup, "SWEEP_INTERVAL_SECS", 3600)?;
        let sweep_interval = (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs));

        let log_format: LogFormat = parse_or(&lookup, "LOG_FORMAT", LogFormat::Text)?;

        Ok(Self {
            database_url,
            db_max_connections,
            enabled_roots,
            outbox_poll_interval: Duration::from_millis(poll_ms),
            outbox_batch_size,
            outbox_max_attempts,
            sweep_interval,
            log_format,
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key} has invalid value '{raw}': {e}")),
        None => Ok(default),
    }
}
