//! Configuration for search index synchronization.
//!
//! All structs deserialize from any serde format with defaults for every
//! field. Durations use humantime notation (`"250ms"`, `"5s"`).
//!
//! ```
//! use qa_persistence::config::{IndexSyncMode, IndexingConfig};
//!
//! let config: IndexingConfig = serde_json::from_str(
//!     r#"{"mode": "background", "retry": {"max_retries": 5, "initial_delay": "50ms"}}"#,
//! ).unwrap();
//!
//! assert_eq!(config.mode, IndexSyncMode::Background);
//! assert_eq!(config.retry.max_retries, 5);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How reindexing is scheduled relative to the mutation that triggered it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexSyncMode {
    /// Reindex right after commit. The caller waits for the index writes
    /// for at most [`IndexingConfig::inline_wait`]; anything still running
    /// then, such as retries against a struggling index, finishes in the
    /// background. Index failures are logged and recorded, never returned to
    /// the caller.
    #[default]
    Inline,
    /// Queue change events for a single background worker.
    Background,
}

/// Retry policy for transient search index failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first call.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay between retries.
    #[serde(with = "humantime_serde", default = "default_initial_delay")]
    pub initial_delay: Duration,

    /// Maximum delay between retries.
    #[serde(with = "humantime_serde", default = "default_max_delay")]
    pub max_delay: Duration,

    /// Backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Returns the delay to wait after `current`, capped at `max_delay`.
    ///
    /// A multiplier that yields no valid duration (negative, NaN, overflow)
    /// jumps straight to `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_multiplier)
            .map_or(self.max_delay, |next| next.min(self.max_delay))
    }
}

/// Search index synchronization configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Inline or background reindexing.
    #[serde(default)]
    pub mode: IndexSyncMode,

    /// Retry policy for transient index failures.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Timeout applied to every individual index call.
    #[serde(with = "humantime_serde", default = "default_write_timeout")]
    pub write_timeout: Duration,

    /// Longest time an inline caller waits for its index writes.
    #[serde(with = "humantime_serde", default = "default_inline_wait")]
    pub inline_wait: Duration,

    /// Capacity of the background queue, in batches of change events.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_write_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_inline_wait() -> Duration {
    Duration::from_secs(1)
}

fn default_queue_capacity() -> usize {
    1000
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            mode: IndexSyncMode::default(),
            retry: RetryConfig::default(),
            write_timeout: default_write_timeout(),
            inline_wait: default_inline_wait(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl IndexingConfig {
    /// Sets the sync mode.
    pub fn with_mode(mut self, mode: IndexSyncMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the per-call index timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets how long inline callers wait for their index writes.
    pub fn with_inline_wait(mut self, wait: Duration) -> Self {
        self.inline_wait = wait;
        self
    }
}

/// Serde module for Duration with humantime format.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
