//! In-memory pattern store — the default [`PatternStore`] backend.
//!
//! Append-only vectors behind mutexes. Good enough for a single-process
//! engine and for tests; a durable backend would live in an adapter
//! crate behind the same port.

use std::sync::Mutex;

use weaver_domain::execution::PlanOutcome;
use weaver_domain::id::EntityId;
use weaver_domain::pattern::{ContextQuery, FrequencyTable, NumericProfile, PatternRecord};

use crate::ports::{PatternStore, PatternStoreError};

/// Process-local append-only pattern history.
#[derive(Debug, Default)]
pub struct InMemoryPatternStore {
    records: Mutex<Vec<PatternRecord>>,
    outcomes: Mutex<Vec<PlanOutcome>>,
}

impl InMemoryPatternStore {
    /// Number of observations recorded so far.
    pub fn record_count(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// All plan outcomes recorded so far, oldest first.
    pub fn outcomes(&self) -> Vec<PlanOutcome> {
        self.outcomes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl PatternStore for InMemoryPatternStore {
    async fn record(&self, record: PatternRecord) -> Result<(), PatternStoreError> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(record);
        Ok(())
    }

    async fn record_outcome(&self, outcome: PlanOutcome) -> Result<(), PatternStoreError> {
        self.outcomes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(outcome);
        Ok(())
    }

    async fn query(
        &self,
        entity_id: &EntityId,
        context: ContextQuery,
    ) -> Result<FrequencyTable, PatternStoreError> {
        let records = self
            .records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut table = FrequencyTable::default();
        for record in records
            .iter()
            .filter(|r| &r.entity_id == entity_id && context.matches(r.context))
        {
            table.add(record.state.clone());
        }
        Ok(table)
    }

    async fn numeric_profile(
        &self,
        entity_id: &EntityId,
        context: ContextQuery,
    ) -> Result<Option<NumericProfile>, PatternStoreError> {
        let records = self
            .records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let values: Vec<f64> = records
            .iter()
            .filter(|r| &r.entity_id == entity_id && context.matches(r.context))
            .filter_map(|r| r.state.parse::<f64>().ok())
            .collect();
        Ok(NumericProfile::from_values(&values))
    }
}
