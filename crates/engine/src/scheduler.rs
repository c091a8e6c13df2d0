//! Execution scheduler — runs a compiled plan against the device layer.
//!
//! Ready steps (dependencies all succeeded) are dispatched to worker
//! tasks behind a semaphore that bounds fleet concurrency. Each worker
//! owns its step's full retry loop: per-attempt timeout, exponential
//! backoff on transient failures, immediate failure on permanent ones.
//! The coordinator applies completions, cascades skips across the
//! dependency graph when a step fails, and cuts off dispatch when the
//! plan's wall-clock deadline elapses — steps already in flight drain,
//! everything still pending is skipped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use weaver_domain::error::DeviceError;
use weaver_domain::execution::ExecutionResult;
use weaver_domain::id::StepId;
use weaver_domain::pattern::PatternRecord;
use weaver_domain::plan::{Plan, StepStatus};
use weaver_domain::snapshot::EntitySnapshot;

use crate::ports::{DeviceGateway, PatternStore};

/// Scheduler tuning knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Steps allowed in flight simultaneously.
    pub concurrency: usize,
    /// Per-attempt device invocation timeout.
    pub step_timeout: Duration,
    /// First backoff delay; doubles on each further attempt.
    pub backoff_base: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            step_timeout: Duration::from_secs(5),
            backoff_base: Duration::from_millis(250),
        }
    }
}

/// What a worker reports back to the coordinator.
struct StepCompletion {
    step_id: StepId,
    outcome: Result<EntitySnapshot, DeviceError>,
    attempts: u32,
    duration: Duration,
}

/// Drives a compiled plan to a terminal status.
#[derive(Debug, Clone, Default)]
pub struct ExecutionScheduler {
    config: SchedulerConfig,
}

impl ExecutionScheduler {
    /// Create a scheduler with the given tuning.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Execute `plan` until every step is terminal or the deadline cuts
    /// dispatch off, then stamp the plan's terminal status.
    ///
    /// Results come back in plan step order, one per step. A plan whose
    /// deadline is zero (never gated) runs without a wall-clock bound.
    /// When `patterns` is given, each successful step appends one state
    /// observation; store failures are logged and never fail the step.
    pub async fn run<G, P>(
        &self,
        plan: &mut Plan,
        gateway: Arc<G>,
        patterns: Option<Arc<P>>,
    ) -> Vec<ExecutionResult>
    where
        G: DeviceGateway + 'static,
        P: PatternStore + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let (tx, mut rx) = mpsc::unbounded_channel::<StepCompletion>();
        let deadline_at = (!plan.deadline.is_zero()).then(|| Instant::now() + plan.deadline);

        let mut results: HashMap<StepId, ExecutionResult> = HashMap::new();
        let mut in_flight = 0usize;
        let mut deadline_hit = false;

        info!(
            plan = %plan.id,
            steps = plan.len(),
            deadline_ms = plan.deadline.as_millis() as u64,
            "starting plan execution"
        );

        loop {
            if !deadline_hit {
                for step_id in plan.ready_steps() {
                    // A step only starts once a pool permit is in hand;
                    // without one it stays pending and remains skippable
                    // should the deadline fire first.
                    let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
                        break;
                    };
                    let Some(step) = plan.step_mut(step_id) else {
                        continue;
                    };
                    if step.transition(StepStatus::Running).is_err() {
                        continue;
                    }
                    in_flight += 1;
                    self.spawn_worker(
                        step_id,
                        step.operation.entity_id.clone(),
                        step.operation.action.clone(),
                        step.operation.params.clone(),
                        step.retries_remaining,
                        Arc::clone(&gateway),
                        patterns.clone(),
                        permit,
                        tx.clone(),
                    );
                }
            }

            if in_flight == 0 {
                // Nothing running and nothing ready: remaining pending
                // steps are unreachable (failed dependencies or deadline).
                break;
            }

            tokio::select! {
                completion = rx.recv() => {
                    if let Some(completion) = completion {
                        in_flight -= 1;
                        apply_completion(plan, completion, &mut results);
                    }
                }
                () = sleep_until_deadline(deadline_at), if !deadline_hit => {
                    deadline_hit = true;
                    warn!(
                        plan = %plan.id,
                        in_flight,
                        "plan deadline elapsed, cutting off dispatch"
                    );
                }
            }
        }

        skip_remaining(plan, &mut results);
        plan.status = plan.derive_status();
        info!(
            plan = %plan.id,
            status = %plan.status,
            succeeded = plan.count_status(StepStatus::Succeeded),
            failed = plan.count_status(StepStatus::Failed),
            skipped = plan.count_status(StepStatus::Skipped),
            "plan execution finished"
        );

        plan.steps()
            .iter()
            .filter_map(|step| results.remove(&step.id))
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_worker<G, P>(
        &self,
        step_id: StepId,
        entity_id: weaver_domain::id::EntityId,
        action: String,
        params: HashMap<String, weaver_domain::snapshot::AttributeValue>,
        retries_remaining: u32,
        gateway: Arc<G>,
        patterns: Option<Arc<P>>,
        permit: OwnedSemaphorePermit,
        tx: mpsc::UnboundedSender<StepCompletion>,
    ) where
        G: DeviceGateway + 'static,
        P: PatternStore + 'static,
    {
        let step_timeout = self.config.step_timeout;
        let backoff_base = self.config.backoff_base;

        tokio::spawn(async move {
            let started = Instant::now();
            let max_attempts = retries_remaining.max(1);
            let mut attempt = 0u32;

            let outcome = loop {
                attempt += 1;
                let invocation =
                    gateway.invoke_action(&entity_id, &action, &params, step_timeout);
                let result = match tokio::time::timeout(step_timeout, invocation).await {
                    Ok(result) => result,
                    Err(_) => Err(DeviceError::Timeout {
                        waited_ms: u64::try_from(step_timeout.as_millis())
                            .unwrap_or(u64::MAX),
                    }),
                };

                match result {
                    Ok(snapshot) => break Ok(snapshot),
                    Err(err) if err.is_retryable() && attempt < max_attempts => {
                        let delay = backoff_base
                            .saturating_mul(2u32.saturating_pow(attempt - 1));
                        debug!(
                            entity = %entity_id,
                            action = %action,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "transient failure, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(err) => break Err(err),
                }
            };
            drop(permit);

            if let (Ok(snapshot), Some(store)) = (&outcome, &patterns) {
                let record = PatternRecord::observed(
                    entity_id.clone(),
                    snapshot.state.clone(),
                    weaver_domain::time::now(),
                );
                if let Err(err) = store.record(record).await {
                    warn!(entity = %entity_id, error = %err, "pattern write failed");
                }
            }

            // Receiver gone means the coordinator already returned; the
            // result has nowhere to go.
            let _ = tx.send(StepCompletion {
                step_id,
                outcome,
                attempts: attempt,
                duration: started.elapsed(),
            });
        });
    }
}

fn apply_completion(
    plan: &mut Plan,
    completion: StepCompletion,
    results: &mut HashMap<StepId, ExecutionResult>,
) {
    let StepCompletion {
        step_id,
        outcome,
        attempts,
        duration,
    } = completion;
    let Some(step) = plan.step_mut(step_id) else {
        return;
    };
    let entity_id = step.operation.entity_id.clone();
    let action = step.operation.action.clone();

    match outcome {
        Ok(_) => {
            if step.transition(StepStatus::Succeeded).is_err() {
                return;
            }
            debug!(entity = %entity_id, action = %action, attempts, "step succeeded");
            results.insert(
                step_id,
                ExecutionResult {
                    step_id,
                    entity_id,
                    action,
                    status: StepStatus::Succeeded,
                    attempts,
                    duration,
                    error: None,
                },
            );
        }
        Err(err) => {
            if step.transition(StepStatus::Failed).is_err() {
                return;
            }
            warn!(
                entity = %entity_id,
                action = %action,
                attempts,
                error = %err,
                "step failed"
            );
            results.insert(
                step_id,
                ExecutionResult {
                    step_id,
                    entity_id,
                    action,
                    status: StepStatus::Failed,
                    attempts,
                    duration,
                    error: Some(err.to_string()),
                },
            );
            // Everything downstream of the failure can never become
            // ready; mark it skipped now so the caller sees why.
            for dependent in plan.dependents_of(step_id) {
                skip_step(plan, dependent, results);
            }
        }
    }
}

fn skip_remaining(plan: &mut Plan, results: &mut HashMap<StepId, ExecutionResult>) {
    let pending: Vec<StepId> = plan
        .steps()
        .iter()
        .filter(|s| s.status() == StepStatus::Pending)
        .map(|s| s.id)
        .collect();
    for step_id in pending {
        skip_step(plan, step_id, results);
    }
}

fn skip_step(plan: &mut Plan, step_id: StepId, results: &mut HashMap<StepId, ExecutionResult>) {
    let Some(step) = plan.step_mut(step_id) else {
        return;
    };
    if step.status() != StepStatus::Pending || step.transition(StepStatus::Skipped).is_err() {
        return;
    }
    let entity_id = step.operation.entity_id.clone();
    let action = step.operation.action.clone();
    debug!(entity = %entity_id, action = %action, "step skipped");
    results.insert(step_id, ExecutionResult::skipped(step_id, entity_id, action));
}

async fn sleep_until_deadline(deadline_at: Option<Instant>) {
    match deadline_at {
        Some(instant) => tokio::time::sleep_until(instant).await,
        None => std::future::pending().await,
    }
}
