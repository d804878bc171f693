//! Executor and transport configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use dynaflow_model::DynamoDBOperation;

use crate::error::{DynaflowError, DynaflowResult};

/// Base deadline for calls touching a single item.
pub const SHORT_LATENCY_BUDGET: Duration = Duration::from_millis(1_000);
/// Base deadline for multi-item, paginated and transactional calls.
pub const LONG_LATENCY_BUDGET: Duration = Duration::from_millis(5_000);
/// Segments a full-table scan fans out to unless configured otherwise.
pub const DEFAULT_SCAN_SEGMENTS: u32 = 10;

/// Bounded exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub min_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub factor: u32,
}

impl RetryPolicy {
    /// Delay to wait after `attempt` (1-based) has failed.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let multiplier = self.factor.saturating_pow(exponent);
        self.min_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            factor: 2,
        }
    }
}

/// Settings shared by every operation a [`crate::Dynaflow`] issues.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Base deadline for single item operations.
    pub short_latency: Duration,
    /// Base deadline for everything else.
    pub long_latency: Duration,
    /// Multiplier applied to every deadline. Must be positive.
    pub patience_ratio: f64,
    /// Attempt count and backoff schedule.
    pub retry: RetryPolicy,
    /// Segments used for unconditioned scans.
    pub scan_segments: u32,
}

impl ExecutorConfig {
    /// Create configuration from environment variables.
    ///
    /// Unset variables keep their defaults; malformed ones are logged and
    /// ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let retry = RetryPolicy {
            max_attempts: env_parse("DYNAFLOW_MAX_ATTEMPTS", defaults.retry.max_attempts),
            min_delay: env_millis("DYNAFLOW_RETRY_MIN_DELAY_MS", defaults.retry.min_delay),
            max_delay: env_millis("DYNAFLOW_RETRY_MAX_DELAY_MS", defaults.retry.max_delay),
            ..defaults.retry
        };
        Self {
            short_latency: env_millis("DYNAFLOW_SHORT_LATENCY_MS", defaults.short_latency),
            long_latency: env_millis("DYNAFLOW_LONG_LATENCY_MS", defaults.long_latency),
            patience_ratio: env_parse("DYNAFLOW_PATIENCE_RATIO", defaults.patience_ratio),
            retry,
            scan_segments: env_parse("DYNAFLOW_SCAN_SEGMENTS", defaults.scan_segments),
        }
    }

    /// Replace the patience ratio, rejecting non-positive values.
    pub fn with_patience_ratio(mut self, ratio: f64) -> DynaflowResult<Self> {
        check_patience_ratio(ratio)?;
        self.patience_ratio = ratio;
        Ok(self)
    }

    /// Check invariants that `from_env` or direct construction may violate.
    pub fn validate(&self) -> DynaflowResult<()> {
        check_patience_ratio(self.patience_ratio)?;
        if self.retry.max_attempts == 0 {
            return Err(DynaflowError::validation(
                "At least one attempt must be allowed",
            ));
        }
        Ok(())
    }

    /// Base deadline for one attempt of `operation`, before scaling.
    #[must_use]
    pub fn latency_budget(&self, operation: DynamoDBOperation) -> Duration {
        if operation.is_single_item() {
            self.short_latency
        } else {
            self.long_latency
        }
    }

    /// Deadline for attempt `attempt` (1-based) of `operation`.
    ///
    /// Saturates at [`Duration::MAX`] when the scaled budget is not
    /// representable.
    #[must_use]
    pub fn attempt_deadline(&self, operation: DynamoDBOperation, attempt: u32) -> Duration {
        let scaled = self.latency_budget(operation).as_secs_f64()
            * f64::from(attempt)
            * self.patience_ratio;
        Duration::try_from_secs_f64(scaled).unwrap_or(Duration::MAX)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            short_latency: SHORT_LATENCY_BUDGET,
            long_latency: LONG_LATENCY_BUDGET,
            patience_ratio: 1.0,
            retry: RetryPolicy::default(),
            scan_segments: DEFAULT_SCAN_SEGMENTS,
        }
    }
}

/// Where the HTTP transport sends requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpClientConfig {
    /// Base URL of a DynamoDB compatible endpoint.
    pub endpoint: String,
    /// Transport level timeout, a backstop above the per-attempt deadlines.
    pub request_timeout: Duration,
}

impl HttpClientConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: env::var("DYNAFLOW_ENDPOINT_URL").unwrap_or(defaults.endpoint),
            request_timeout: env_millis("DYNAFLOW_REQUEST_TIMEOUT_MS", defaults.request_timeout),
        }
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000".to_owned(),
            request_timeout: LONG_LATENCY_BUDGET + Duration::from_secs(1),
        }
    }
}

fn check_patience_ratio(ratio: f64) -> DynaflowResult<()> {
    if ratio.is_finite() && ratio > 0.0 {
        Ok(())
    } else {
        Err(DynaflowError::validation("The ratio must be positive"))
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparsable configuration value");
            default
        }),
        Err(_) => default,
    }
}

fn env_millis(key: &str, default: Duration) -> Duration {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(env_parse(key, default_ms))
}
