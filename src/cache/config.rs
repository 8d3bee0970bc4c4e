//! Setup-time configuration for the cache middleware.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use super::lock::DEFAULT_LOCK_TIMEOUT;
use super::store::DEFAULT_MAX_ENTRIES;
use super::{ConfigError, KeyPolicy};

/// A duration given either as raw milliseconds or as a human-readable string.
///
/// Strings accept anything `humantime` understands (`"5 minutes"`, `"1h 30m"`,
/// `"30s"`) as well as a bare number of milliseconds (`"5000"`).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use routecache::cache::Lifetime;
///
/// assert_eq!(Lifetime::from("10 minutes").to_duration().unwrap(), Duration::from_secs(600));
/// assert_eq!(Lifetime::from(1500u64).to_duration().unwrap(), Duration::from_millis(1500));
/// assert!(Lifetime::from("soon").to_duration().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Lifetime {
    Millis(u64),
    Text(String),
}

impl Lifetime {
    /// Parses the value, rejecting zero and malformed durations.
    pub fn to_duration(&self) -> Result<Duration, ConfigError> {
        self.parse_nonzero("lifetime")
    }

    fn parse_nonzero(&self, field: &'static str) -> Result<Duration, ConfigError> {
        let duration = match self {
            Self::Millis(ms) => Duration::from_millis(*ms),
            Self::Text(text) => {
                let text = text.trim();
                match text.parse::<u64>() {
                    Ok(ms) => Duration::from_millis(ms),
                    Err(_) => humantime::parse_duration(text).map_err(|source| {
                        ConfigError::InvalidDuration {
                            input: text.to_owned(),
                            source,
                        }
                    })?,
                }
            }
        };

        if duration.is_zero() {
            return Err(ConfigError::Zero { field });
        }
        Ok(duration)
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Millis(ms) => write!(f, "{ms}ms"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<u64> for Lifetime {
    fn from(ms: u64) -> Self {
        Self::Millis(ms)
    }
}

impl From<&str> for Lifetime {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Lifetime {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Duration> for Lifetime {
    fn from(duration: Duration) -> Self {
        Self::Millis(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Full configuration of a cache middleware instance.
///
/// Deserializable so it can live in the application's own config file:
///
/// ```
/// use routecache::cache::CacheConfig;
///
/// let config: CacheConfig = serde_json::from_str(r#"{
///     "lifetime": "5 minutes",
///     "lock_timeout": 2000,
///     "key": { "vary_headers": ["accept-language"] }
/// }"#).unwrap();
///
/// let resolved = config.resolve().unwrap();
/// assert_eq!(resolved.lifetime.as_secs(), 300);
/// assert_eq!(resolved.lock_timeout.as_millis(), 2000);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// How long a captured response stays servable.
    pub lifetime: Lifetime,
    /// How long a request waits for a concurrent fill of the same key.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout: Lifetime,
    /// Capacity of the in-memory store.
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    #[serde(default)]
    pub key: KeyPolicy,
}

fn default_lock_timeout() -> Lifetime {
    Lifetime::from(DEFAULT_LOCK_TIMEOUT)
}

fn default_max_entries() -> u64 {
    DEFAULT_MAX_ENTRIES
}

/// [`CacheConfig`] with every duration parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub lifetime: Duration,
    pub lock_timeout: Duration,
    pub max_entries: u64,
    pub key: KeyPolicy,
}

impl CacheConfig {
    pub fn new(lifetime: impl Into<Lifetime>) -> Self {
        Self {
            lifetime: lifetime.into(),
            lock_timeout: default_lock_timeout(),
            max_entries: DEFAULT_MAX_ENTRIES,
            key: KeyPolicy::default(),
        }
    }

    #[must_use]
    pub fn lock_timeout(mut self, timeout: impl Into<Lifetime>) -> Self {
        self.lock_timeout = timeout.into();
        self
    }

    #[must_use]
    pub fn max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = max_entries;
        self
    }

    #[must_use]
    pub fn key_policy(mut self, policy: KeyPolicy) -> Self {
        self.key = policy;
        self
    }

    /// Parses every duration once.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] for unparsable or zero durations and a zero capacity.
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::Zero {
                field: "max_entries",
            });
        }
        Ok(ResolvedConfig {
            lifetime: self.lifetime.parse_nonzero("lifetime")?,
            lock_timeout: self.lock_timeout.parse_nonzero("lock_timeout")?,
            max_entries: self.max_entries,
            key: self.key.clone(),
        })
    }
}
