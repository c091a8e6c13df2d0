//! Plan compiler — ranked candidate list to executable dependency graph.
//!
//! Same-entity operations are chained with dependency edges (higher rank
//! executes first), which enforces mutual exclusion on an entity without
//! any lock at execution time. Declared `after` constraints are merged
//! in, and the whole graph is validated acyclic with a topological sort
//! before the plan leaves the compiler.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use weaver_domain::error::PlanCompilationError;
use weaver_domain::id::{EntityId, OperationId, StepId};
use weaver_domain::operation::{CandidateOperation, Reversibility};
use weaver_domain::plan::{Plan, Step};

use crate::zones::ZoneCoordinator;

/// Static per-action-type reversibility classification.
///
/// Unknown actions fall back to the operation's declared hint, then to
/// `Irreversible` — the conservative default. The table is a policy
/// object: construct it, extend it, or replace entries from
/// configuration.
#[derive(Debug, Clone)]
pub struct ReversibilityTable {
    entries: HashMap<String, Reversibility>,
}

impl Default for ReversibilityTable {
    fn default() -> Self {
        let mut entries = HashMap::new();
        for action in [
            "turn_on",
            "turn_off",
            "toggle",
            "dim",
            "set_brightness",
            "set_temperature",
            "set_hvac_mode",
            "set_fan_mode",
            "lock",
            "close",
            "close_cover",
            "arm_home",
            "arm_away",
            "activate_scene",
            "media_play",
            "media_pause",
            "volume_set",
        ] {
            entries.insert(action.to_string(), Reversibility::Reversible);
        }
        for action in ["unlock", "disarm", "open", "open_cover", "trigger_alarm", "notify"] {
            entries.insert(action.to_string(), Reversibility::Irreversible);
        }
        Self { entries }
    }
}

impl ReversibilityTable {
    /// An empty table (every action falls back to hint/default).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Classification for an action, when the table knows it.
    #[must_use]
    pub fn classify(&self, action: &str) -> Option<Reversibility> {
        self.entries.get(action).copied()
    }

    /// Add or override an entry.
    pub fn insert(&mut self, action: impl Into<String>, classification: Reversibility) {
        self.entries.insert(action.into(), classification);
    }

    /// Chainable form of [`insert`](Self::insert).
    #[must_use]
    pub fn with_entry(mut self, action: impl Into<String>, classification: Reversibility) -> Self {
        self.insert(action, classification);
        self
    }
}

/// Compiler limits and defaults.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Largest candidate set accepted for a single plan.
    pub max_steps: usize,
    /// Device invocation attempts granted to each step.
    pub retry_budget: u32,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_steps: 20,
            retry_budget: 3,
        }
    }
}

/// Converts a ranked candidate list into a compiled [`Plan`].
#[derive(Debug, Clone, Default)]
pub struct PlanCompiler {
    table: ReversibilityTable,
    config: CompilerConfig,
}

impl PlanCompiler {
    /// Create a compiler with the given classification table and limits.
    #[must_use]
    pub fn new(table: ReversibilityTable, config: CompilerConfig) -> Self {
        Self { table, config }
    }

    /// The configured default step limit.
    #[must_use]
    pub fn max_steps(&self) -> usize {
        self.config.max_steps
    }

    /// Compile `candidates` (highest rank first) into a plan.
    ///
    /// `max_steps` overrides the configured limit for this request.
    ///
    /// # Errors
    ///
    /// Returns [`PlanCompilationError`] for an empty candidate set, a set
    /// over the step limit, an `after` reference to an operation that was
    /// never submitted, or a cyclic dependency graph. No device is
    /// contacted on any path through this function.
    pub fn compile(
        &self,
        goal: impl Into<String>,
        safety_mode: bool,
        candidates: Vec<CandidateOperation>,
        coordinator: &ZoneCoordinator,
        max_steps: Option<usize>,
    ) -> Result<Plan, PlanCompilationError> {
        if candidates.is_empty() {
            return Err(PlanCompilationError::EmptyCandidateSet);
        }
        let limit = max_steps.unwrap_or(self.config.max_steps);
        if candidates.len() > limit {
            return Err(PlanCompilationError::TooManySteps {
                count: candidates.len(),
                max: limit,
            });
        }

        let resolution = coordinator.resolve_conflicts(candidates);
        let discarded_ids: HashSet<OperationId> = resolution
            .discarded
            .iter()
            .map(|d| d.operation.id)
            .collect();

        let mut steps: Vec<Step> = Vec::with_capacity(resolution.kept.len());
        let mut step_of_operation: HashMap<OperationId, StepId> = HashMap::new();
        let mut last_step_for_entity: HashMap<EntityId, StepId> = HashMap::new();

        for operation in resolution.kept {
            let classification = self.classify(&operation);
            let mut step = Step::new(operation, classification, self.config.retry_budget);

            // Serialize operations on a shared entity: higher rank first.
            if let Some(previous) = last_step_for_entity.get(&step.operation.entity_id) {
                step.depends_on.push(*previous);
            }
            last_step_for_entity.insert(step.operation.entity_id.clone(), step.id);
            step_of_operation.insert(step.operation.id, step.id);
            steps.push(step);
        }

        // Merge declared ordering constraints. Constraints on discarded
        // operations dissolve with them (the discard itself is recorded
        // in the plan metadata); constraints on operations that were
        // never submitted are an error.
        for step in &mut steps {
            let declared = step.operation.after.clone();
            for after in &declared {
                match step_of_operation.get(after) {
                    Some(dep) if !step.depends_on.contains(dep) => step.depends_on.push(*dep),
                    Some(_) => {}
                    None if discarded_ids.contains(after) => {}
                    None => {
                        return Err(PlanCompilationError::UnknownDependency {
                            operation: step.operation.id,
                            missing: *after,
                        });
                    }
                }
            }
        }

        validate_acyclic(&steps)?;

        debug!(
            steps = steps.len(),
            discarded = resolution.discarded.len(),
            "plan compiled"
        );
        Ok(Plan::new(goal, safety_mode, steps, resolution.discarded))
    }

    fn classify(&self, operation: &CandidateOperation) -> Reversibility {
        self.table.classify(&operation.action).unwrap_or_else(|| {
            operation
                .reversibility_hint
                .unwrap_or(Reversibility::Irreversible)
        })
    }
}

/// Kahn's algorithm over the step graph. Steps left unordered after the
/// sort identify a cycle.
fn validate_acyclic(steps: &[Step]) -> Result<(), PlanCompilationError> {
    let mut in_degree: HashMap<StepId, usize> =
        steps.iter().map(|s| (s.id, s.depends_on.len())).collect();
    let mut dependents: HashMap<StepId, Vec<StepId>> = HashMap::new();
    for step in steps {
        for dep in &step.depends_on {
            dependents.entry(*dep).or_default().push(step.id);
        }
    }

    let mut queue: VecDeque<StepId> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut ordered = 0usize;

    while let Some(id) = queue.pop_front() {
        ordered += 1;
        for dependent in dependents.get(&id).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*dependent);
                }
            }
        }
    }

    if ordered == steps.len() {
        Ok(())
    } else {
        let unordered = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(id, _)| id)
            .collect();
        Err(PlanCompilationError::CyclicDependency(unordered))
    }
}
