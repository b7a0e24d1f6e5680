//! Status reconciliation polling
//!
//! Callbacks can be delayed or never arrive at all (the provider cannot
//! reach every deployment target), so settlement is also reconciled by
//! polling. The loop reads cheaply while the webhook still has a chance of
//! arriving and escalates at two checkpoints: first a cache-bypassed read,
//! then a forced check straight against the provider. Exhausting the budget
//! is not a failure; the payment is simply still processing.
//!
//! The poller is a plain `async fn`: dropping the future (closed dialog,
//! aborted request) cancels the loop and its timers with it.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::SettlementResult;
use crate::payment::{PaymentStatus, StatusSource, TransitionOutcome};
use crate::SettlementService;

/// How deep a single status check reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckDepth {
    /// Cache, then store.
    Cached,
    /// Store, skipping the cache.
    Fresh,
    /// Straight to the provider, skipping every local layer.
    Forced,
}

/// Polling budget and cadence.
#[derive(Debug, Clone)]
pub struct PollPlan {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPlan {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 15,
        }
    }
}

impl PollPlan {
    /// First escalation: re-read with the cache bypassed.
    pub fn fresh_checkpoint(&self) -> u32 {
        self.max_attempts / 3
    }

    /// Second escalation: forced check against the provider.
    pub fn forced_checkpoint(&self) -> u32 {
        self.max_attempts * 2 / 3
    }

    fn depth_for_attempt(&self, attempt: u32) -> CheckDepth {
        if attempt == self.forced_checkpoint() {
            CheckDepth::Forced
        } else if attempt == self.fresh_checkpoint() {
            CheckDepth::Fresh
        } else {
            CheckDepth::Cached
        }
    }
}

/// Outcome of a polling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Settled(PaymentStatus),
    /// The attempt budget ran out with the payment still `CREATED`. Not an
    /// error: the caller decides whether to keep waiting or surface a
    /// manual-check option.
    StillProcessing,
}

/// Source of status observations for the polling loop.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn check(&self, reference: &str, depth: CheckDepth) -> SettlementResult<PaymentStatus>;
}

/// Poll until the payment settles or the budget is exhausted.
pub async fn poll_until_settled(
    probe: &dyn StatusProbe,
    reference: &str,
    plan: &PollPlan,
) -> SettlementResult<PollOutcome> {
    for attempt in 1..=plan.max_attempts {
        let depth = plan.depth_for_attempt(attempt);
        match probe.check(reference, depth).await {
            Ok(status) if status.is_terminal() => {
                tracing::info!(
                    reference = %reference,
                    status = %status,
                    attempt = attempt,
                    "Polling observed settlement"
                );
                return Ok(PollOutcome::Settled(status));
            }
            Ok(_) => {}
            // A single failed check does not abort the session; the next
            // attempt or the final forced check may still succeed.
            Err(e) => {
                tracing::warn!(
                    reference = %reference,
                    attempt = attempt,
                    error = %e,
                    "Status check failed during polling"
                );
            }
        }

        if attempt < plan.max_attempts {
            tokio::time::sleep(plan.interval).await;
        }
    }

    // One last forced check before reporting "still processing": the webhook
    // may have silently failed while the provider long since settled.
    match probe.check(reference, CheckDepth::Forced).await {
        Ok(status) if status.is_terminal() => Ok(PollOutcome::Settled(status)),
        Ok(_) => Ok(PollOutcome::StillProcessing),
        Err(e) => {
            tracing::warn!(
                reference = %reference,
                error = %e,
                "Final forced check failed; reporting still-processing"
            );
            Ok(PollOutcome::StillProcessing)
        }
    }
}

#[async_trait]
impl StatusProbe for SettlementService {
    async fn check(&self, reference: &str, depth: CheckDepth) -> SettlementResult<PaymentStatus> {
        self.status_snapshot(reference, depth).await
    }
}

impl SettlementService {
    /// Poll a payment to settlement and run the post-settlement sequence if
    /// it ends up paid. Cancellation-safe: drop the future to stop polling.
    pub async fn reconcile(
        &self,
        reference: &str,
        plan: &PollPlan,
    ) -> SettlementResult<PollOutcome> {
        let outcome = poll_until_settled(self, reference, plan).await?;
        if let PollOutcome::Settled(PaymentStatus::Paid) = outcome {
            self.fulfill(reference).await?;
        }
        Ok(outcome)
    }

    /// Observe the current status at the requested depth, applying any
    /// terminal provider result through the state machine.
    pub async fn status_snapshot(
        &self,
        reference: &str,
        depth: CheckDepth,
    ) -> SettlementResult<PaymentStatus> {
        if depth == CheckDepth::Cached {
            if let Some(status) = self.cache.get(reference).await {
                return Ok(status);
            }
        }

        if depth == CheckDepth::Forced {
            return self.forced_check(reference).await;
        }

        let record = self.store.find_by_reference(reference).await?.ok_or_else(|| {
            crate::error::SettlementError::NotFound(format!("payment '{reference}' not found"))
        })?;
        self.cache.put(reference, record.status).await;
        Ok(record.status)
    }

    /// Forced direct check: query the provider and reconcile the answer into
    /// the local record, bypassing cache and stored status entirely.
    pub async fn forced_check(&self, reference: &str) -> SettlementResult<PaymentStatus> {
        let record = self.store.find_by_reference(reference).await?.ok_or_else(|| {
            crate::error::SettlementError::NotFound(format!("payment '{reference}' not found"))
        })?;

        if record.status.is_terminal() {
            self.cache.put(reference, record.status).await;
            return Ok(record.status);
        }

        // Nothing to ask the provider about until the request was accepted.
        let Some(provider_payment_id) = record.provider_payment_id.as_deref() else {
            return Ok(record.status);
        };

        let doc = self.provider.fetch_payment(provider_payment_id).await?;
        let status = if doc.status.is_terminal() {
            let outcome = self
                .store
                .transition(reference, doc.status, StatusSource::ForcedCheck)
                .await?;
            self.fulfill(reference).await?;
            match outcome {
                TransitionOutcome::Conflict { stored, .. } => stored,
                _ => doc.status,
            }
        } else {
            record.status
        };

        self.cache.put(reference, status).await;
        Ok(status)
    }
}
