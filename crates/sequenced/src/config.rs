use core::time::Duration;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which generation strategy a deployment uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum StrategyKind {
    /// Scan the table for the scope's current maximum under a scope lock.
    /// See [`ScanStrategy`](crate::ScanStrategy).
    #[default]
    Scan,
    /// Advance a dedicated counter row under a row lock.
    /// See [`CounterStrategy`](crate::CounterStrategy).
    Counter,
}

/// How [`Sequencer::create`](crate::Sequencer::create) repeats a failed
/// generate-and-save operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RetryPolicy {
    /// Total attempts, including the first. `1` disables retries.
    pub max_attempts: u32,
    /// Pause between attempts.
    #[cfg_attr(feature = "serde", serde(rename = "backoff_ms", with = "millis"))]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(10),
        }
    }
}

/// Deployment-level settings for a [`Sequencer`](crate::Sequencer).
///
/// With the `serde` feature, durations are (de)serialized as integer
/// milliseconds and every field is optional:
///
/// ```json
/// { "strategy": "counter", "lock_timeout_ms": 2000, "retry": { "max_attempts": 5 } }
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SequencerConfig {
    pub strategy: StrategyKind,
    /// Upper bound on every scope or counter lock wait.
    #[cfg_attr(feature = "serde", serde(rename = "lock_timeout_ms", with = "millis"))]
    pub lock_timeout: Duration,
    /// Upper bound on collision-driven increments within one generation.
    pub max_collision_retries: u32,
    pub retry: RetryPolicy,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Scan,
            lock_timeout: Duration::from_secs(5),
            max_collision_retries: 64,
            retry: RetryPolicy::default(),
        }
    }
}

impl SequencerConfig {
    #[must_use]
    pub const fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub const fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(feature = "serde")]
mod millis {
    use core::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
