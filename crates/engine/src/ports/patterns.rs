//! Pattern-store port — append-only observation and outcome history.
//!
//! Only the read/write contract is fixed here; the durability technology
//! behind it is an adapter concern. The engine never mutates or deletes
//! entries, and treats every write as best-effort: a store failure is
//! logged, never escalated into a step or plan failure.

use std::future::Future;

use weaver_domain::execution::PlanOutcome;
use weaver_domain::id::EntityId;
use weaver_domain::pattern::{ContextQuery, FrequencyTable, NumericProfile, PatternRecord};

/// Failure reported by a pattern-store backend.
#[derive(Debug, Clone, thiserror::Error)]
#[error("pattern store failure: {0}")]
pub struct PatternStoreError(pub String);

/// Append-only history of entity observations and plan outcomes.
pub trait PatternStore: Send + Sync {
    /// Append an immutable observation.
    fn record(
        &self,
        record: PatternRecord,
    ) -> impl Future<Output = Result<(), PatternStoreError>> + Send;

    /// Append a compact plan outcome summary.
    fn record_outcome(
        &self,
        outcome: PlanOutcome,
    ) -> impl Future<Output = Result<(), PatternStoreError>> + Send;

    /// Historical distribution of observed states for `entity_id` in the
    /// given context.
    fn query(
        &self,
        entity_id: &EntityId,
        context: ContextQuery,
    ) -> impl Future<Output = Result<FrequencyTable, PatternStoreError>> + Send;

    /// Mean/spread summary over numeric observations, `None` when the
    /// entity has no numeric history in that context.
    fn numeric_profile(
        &self,
        entity_id: &EntityId,
        context: ContextQuery,
    ) -> impl Future<Output = Result<Option<NumericProfile>, PatternStoreError>> + Send;

    /// Convenience: the state this entity most commonly holds in the
    /// given context, for predictive automation.
    fn most_likely_state(
        &self,
        entity_id: &EntityId,
        context: ContextQuery,
    ) -> impl Future<Output = Result<Option<String>, PatternStoreError>> + Send
    where
        Self: Sized,
    {
        async move {
            Ok(self
                .query(entity_id, context)
                .await?
                .most_likely()
                .map(|(state, _)| state.to_string()))
        }
    }

    /// Convenience: whether `value` is an outlier against the entity's
    /// per-context history. Informational only — callers must never use
    /// this to block execution. Returns `false` when there is no usable
    /// numeric history.
    fn flag_anomaly(
        &self,
        entity_id: &EntityId,
        context: ContextQuery,
        value: f64,
        sigma: f64,
    ) -> impl Future<Output = Result<bool, PatternStoreError>> + Send
    where
        Self: Sized,
    {
        async move {
            Ok(self
                .numeric_profile(entity_id, context)
                .await?
                .is_some_and(|profile| profile.is_anomalous(value, sigma)))
        }
    }
}
