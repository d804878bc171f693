//! Single-call execution with per-attempt deadlines and bounded retries.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::ExecutorConfig;
use crate::error::{DynaflowError, DynaflowResult};
use crate::transport::{Command, DynamoDBClient};

/// Sends one command, racing every attempt against a deadline.
///
/// Attempt `n` gets `budget * n * patience_ratio`, where the budget is the
/// short one for single item operations and the long one otherwise. A
/// timed-out attempt is abandoned by dropping its future: whatever bytes
/// already reached the store stay there, so retried writes must be
/// idempotent. Timeouts and transient transport failures are retried after
/// the policy's backoff delay; every other failure is returned at once.
#[derive(Debug, Clone)]
pub struct RetryableExecutor {
    client: Arc<dyn DynamoDBClient>,
    config: ExecutorConfig,
}

impl RetryableExecutor {
    #[must_use]
    pub fn new(client: Arc<dyn DynamoDBClient>, config: ExecutorConfig) -> Self {
        Self { client, config }
    }

    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Send `command`, retrying until it succeeds, fails fatally or runs out
    /// of attempts. The last error is returned when attempts are exhausted.
    pub async fn send<C: Command>(&self, command: &C) -> DynaflowResult<C::Output> {
        let operation = C::OPERATION;
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let deadline = self.config.attempt_deadline(operation, attempt);
            debug!(operation = %operation, attempt, ?deadline, "dispatching request");

            let call = command.clone().send(self.client.as_ref());
            let err = match tokio::time::timeout(deadline, call).await {
                Ok(Ok(output)) => return Ok(output),
                Ok(Err(err)) => DynaflowError::from_transport(err),
                Err(_) => DynaflowError::Timeout { after: deadline },
            };

            if !err.is_retryable() {
                debug!(operation = %operation, attempt, error = %err, "request failed");
                return Err(err);
            }
            if attempt >= max_attempts {
                warn!(operation = %operation, attempt, error = %err, "giving up after last attempt");
                return Err(err);
            }

            let delay = self.config.retry.delay_for(attempt);
            warn!(operation = %operation, attempt, ?delay, error = %err, "retrying request");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
