//! Remote mutation client with a fixed retry schedule.

use backoff::Error as BackoffError;
use backoff::backoff::Backoff;
use backoff::future::retry_notify;
use serde_json::{Value, json};
use stackconf_core::inventory::Inventory;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult};

/// Delays between attempts of one mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl RetryPolicy {
    /// 5s, 15s, then thirty 60s waits: 33 attempts in total.
    pub fn standard() -> Self {
        let mut delays = vec![Duration::from_secs(5), Duration::from_secs(15)];
        delays.extend(std::iter::repeat_n(Duration::from_secs(60), 30));
        Self { delays }
    }

    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }

    pub fn schedule(&self) -> Schedule<'_> {
        Schedule {
            delays: &self.delays,
            next: 0,
        }
    }
}

/// Walks a [`RetryPolicy`]'s delays in order, then stops.
#[derive(Debug, Clone)]
pub struct Schedule<'a> {
    delays: &'a [Duration],
    next: usize,
}

impl Backoff for Schedule<'_> {
    fn reset(&mut self) {
        self.next = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        let delay = self.delays.get(self.next).copied();
        self.next += 1;
        delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    Create,
    Delete,
    Update,
}

impl fmt::Display for MutationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MutationOp::Create => "create",
            MutationOp::Delete => "delete",
            MutationOp::Update => "update",
        })
    }
}

/// Issues create/update/delete calls against the inventory, retrying failures.
#[derive(Clone)]
pub struct MutationClient {
    inventory: Arc<dyn Inventory>,
    policy: RetryPolicy,
    noop: bool,
}

impl MutationClient {
    pub fn new(inventory: Arc<dyn Inventory>, policy: RetryPolicy, noop: bool) -> Self {
        Self {
            inventory,
            policy,
            noop,
        }
    }

    /// Run one mutation.
    ///
    /// `collection` is the collection for creates (`hosts`) and the record
    /// path for updates and deletes (`hosts/12`). In dry-run mode nothing is
    /// sent and a synthetic `{"id": 0}` record is returned.
    pub async fn mutate(
        &self,
        op: MutationOp,
        collection: &str,
        payload: &Value,
    ) -> PipelineResult<Value> {
        if collection.trim().is_empty() {
            return Err(stackconf_core::Error::InvalidInput(format!(
                "{} called with an empty collection",
                op
            ))
            .into());
        }

        if self.noop {
            info!(noop = true, op = %op, collection = %collection, "would {} {}", op, collection);
            return Ok(json!({ "id": 0 }));
        }

        let max_attempts = self.policy.max_attempts();
        let attempts = AtomicUsize::new(0);
        let attempts_ref = &attempts;
        let inventory = &self.inventory;

        let attempt_mutation = move || async move {
            let attempt = attempts_ref.fetch_add(1, Ordering::Relaxed) + 1;
            let result = match op {
                MutationOp::Create => inventory.post(collection, payload).await,
                MutationOp::Delete => inventory.delete(collection).await,
                MutationOp::Update => inventory.put(collection, payload).await,
            };
            if result.is_ok() {
                debug!(op = %op, collection = %collection, attempt, "Mutation succeeded");
            }
            result.map_err(BackoffError::transient)
        };
        let log_failure = |error: stackconf_core::Error, delay: Duration| {
            warn!(
                op = %op,
                collection = %collection,
                attempt = attempts_ref.load(Ordering::Relaxed),
                max_attempts,
                retry_in_secs = delay.as_secs(),
                error = %error,
                "Mutation failed"
            );
        };

        retry_notify(self.policy.schedule(), attempt_mutation, log_failure)
            .await
            .map_err(|error| {
                let attempts = attempts.load(Ordering::Relaxed);
                warn!(
                    op = %op,
                    collection = %collection,
                    attempt = attempts,
                    max_attempts,
                    error = %error,
                    "Mutation failed, giving up"
                );
                PipelineError::MutationExhausted {
                    op: op.to_string(),
                    collection: collection.to_string(),
                    attempts,
                    last_error: error.to_string(),
                }
            })
    }
}
