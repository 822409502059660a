use crate::{
    Error,
    Result,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs,
    path::Path,
    time::Duration,
};

pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_QUARANTINE_COOLDOWN_SECS: u64 = 5 * 60;
pub const DEFAULT_DRAIN_INTERVAL_MS: u64 = 100;

const MAX_QUEUE_SIZE_VAR: &str = "DISPATCH_MAX_QUEUE_SIZE";
const FAILURE_THRESHOLD_VAR: &str = "DISPATCH_FAILURE_THRESHOLD";
const QUARANTINE_COOLDOWN_VAR: &str = "DISPATCH_QUARANTINE_COOLDOWN_SECS";
const DRAIN_INTERVAL_VAR: &str = "DISPATCH_DRAIN_INTERVAL_MS";


#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchConfig {
    /// Requests allowed to wait for a signer; anything beyond is rejected.
    pub max_queue_size: usize,
    /// Consecutive failures that put a signer into quarantine.
    pub failure_threshold: u32,
    pub quarantine_cooldown_secs: u64,
    /// Safety-net period of the drain loop; frees and enqueues also wake it.
    pub drain_interval_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            quarantine_cooldown_secs: DEFAULT_QUARANTINE_COOLDOWN_SECS,
            drain_interval_ms: DEFAULT_DRAIN_INTERVAL_MS,
        }
    }
}

impl DispatchConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source. Unset variables keep
    /// their defaults; set but unparsable ones are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            max_queue_size: parse_var(&lookup, MAX_QUEUE_SIZE_VAR)?
                .unwrap_or(defaults.max_queue_size),
            failure_threshold: parse_var(&lookup, FAILURE_THRESHOLD_VAR)?
                .unwrap_or(defaults.failure_threshold),
            quarantine_cooldown_secs: parse_var(&lookup, QUARANTINE_COOLDOWN_VAR)?
                .unwrap_or(defaults.quarantine_cooldown_secs),
            drain_interval_ms: parse_var(&lookup, DRAIN_INTERVAL_VAR)?
                .unwrap_or(defaults.drain_interval_ms),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read(path.as_ref())?;
        let config: Self = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(Error::InvalidConfig {
                key: "failureThreshold",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.drain_interval_ms == 0 {
            return Err(Error::InvalidConfig {
                key: "drainIntervalMs",
                reason: "must be greater than zero".to_owned(),
            });
        }
        Ok(())
    }

    pub fn quarantine_cooldown(&self) -> Duration {
        Duration::from_secs(self.quarantine_cooldown_secs)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    pub fn with_failure_threshold(mut self, failure_threshold: u32) -> Self {
        self.failure_threshold = failure_threshold;
        self
    }

    /// The cooldown is kept in whole seconds; a fractional part rounds up so
    /// a short cooldown never collapses to zero.
    pub fn with_quarantine_cooldown(mut self, cooldown: Duration) -> Self {
        self.quarantine_cooldown_secs =
            cooldown.as_secs() + u64::from(cooldown.subsec_nanos() > 0);
        self
    }

    pub fn with_drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval_ms = interval.as_millis() as u64;
        self
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|e| Error::InvalidConfig {
            key,
            reason: format!("cannot parse {raw:?}: {e}"),
        })
}
