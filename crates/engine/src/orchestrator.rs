//! Orchestrator — the end-to-end pipeline behind one goal request.
//!
//! Snapshot the fleet, resolve the goal into candidates, compile them
//! into a plan, gate it, execute it, and learn from the outcome. Every
//! stage before the scheduler is device-write-free: a request that fails
//! compilation or the safety gate never touches an actuator.

use std::sync::Arc;

use tracing::{info, warn};

use weaver_domain::error::{EngineError, ValidationError};
use weaver_domain::execution::{ExecutionResult, PlanOutcome};
use weaver_domain::id::{PlanId, StepId};
use weaver_domain::operation::CandidateOperation;
use weaver_domain::plan::{DiscardedOperation, PlanStatus, StepStatus};
use weaver_domain::snapshot::EntitySnapshot;

use crate::compiler::{CompilerConfig, PlanCompiler, ReversibilityTable};
use crate::ports::{DeviceGateway, EntityFilter, IntentResolver, PatternStore, StateEvent};
use crate::safety::{SafetyGate, SafetyGateConfig};
use crate::scheduler::{ExecutionScheduler, SchedulerConfig};
use crate::snapshot_cache::SnapshotCache;
use crate::zones::ZoneCoordinator;

/// Combined tuning for every pipeline stage.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub compiler: CompilerConfig,
    pub reversibility: ReversibilityTable,
    pub safety: SafetyGateConfig,
    pub scheduler: SchedulerConfig,
}

/// One goal-driven orchestration request.
#[derive(Debug, Clone)]
pub struct OrchestrationRequest {
    /// Free-form goal text.
    pub goal: String,
    /// Per-request override of the compiled step limit.
    pub max_steps: Option<usize>,
    /// Whether the safety gate holds irreversible steps for confirmation.
    pub safety_mode: bool,
    /// Confirmation accompanying a plan expected to carry irreversible
    /// steps. Any non-empty token counts.
    pub confirmation: Option<String>,
    /// Restrict the request to entities belonging to these zones.
    pub zones: Vec<String>,
    /// Whether successful steps feed the pattern store.
    pub learn: bool,
}

impl OrchestrationRequest {
    /// A request with safety mode on and learning enabled.
    #[must_use]
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            max_steps: None,
            safety_mode: true,
            confirmation: None,
            zones: Vec::new(),
            learn: true,
        }
    }

    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    #[must_use]
    pub fn with_safety_mode(mut self, safety_mode: bool) -> Self {
        self.safety_mode = safety_mode;
        self
    }

    #[must_use]
    pub fn with_confirmation(mut self, token: impl Into<String>) -> Self {
        self.confirmation = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zones.push(zone.into());
        self
    }

    #[must_use]
    pub fn with_learning(mut self, learn: bool) -> Self {
        self.learn = learn;
        self
    }
}

/// What the caller gets back for an executed plan.
#[derive(Debug, Clone)]
pub struct OrchestrationResponse {
    pub plan_id: PlanId,
    pub goal: String,
    pub status: PlanStatus,
    /// Per-step results in plan rank order.
    pub results: Vec<ExecutionResult>,
    /// Irreversible steps the gate let through.
    pub flagged_irreversible: Vec<StepId>,
    /// Operations dropped by cross-zone conflict resolution.
    pub discarded: Vec<DiscardedOperation>,
}

impl OrchestrationResponse {
    /// Count of results in `status`.
    #[must_use]
    pub fn count(&self, status: StepStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Ids of steps that never reached the device.
    #[must_use]
    pub fn skipped(&self) -> Vec<StepId> {
        self.results
            .iter()
            .filter(|r| r.status == StepStatus::Skipped)
            .map(|r| r.step_id)
            .collect()
    }
}

/// Goal-to-outcome pipeline over pluggable device, intent, and pattern
/// backends.
pub struct Orchestrator<G, I, P> {
    gateway: Arc<G>,
    intent: I,
    patterns: Arc<P>,
    coordinator: ZoneCoordinator,
    cache: SnapshotCache,
    compiler: PlanCompiler,
    gate: SafetyGate,
    scheduler: ExecutionScheduler,
}

impl<G, I, P> Orchestrator<G, I, P>
where
    G: DeviceGateway + 'static,
    I: IntentResolver,
    P: PatternStore + 'static,
{
    /// Wire an orchestrator over its backends.
    pub fn new(
        gateway: Arc<G>,
        intent: I,
        patterns: Arc<P>,
        coordinator: ZoneCoordinator,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            gateway,
            intent,
            patterns,
            coordinator,
            cache: SnapshotCache::default(),
            compiler: PlanCompiler::new(config.reversibility, config.compiler),
            gate: SafetyGate::new(config.safety),
            scheduler: ExecutionScheduler::new(config.scheduler),
        }
    }

    /// Fold a pushed state change into the cached fleet view.
    ///
    /// Callers that consume [`DeviceGateway::subscribe_events`] feed the
    /// stream through here to keep snapshots current between refreshes.
    pub fn apply_event(&self, event: StateEvent) {
        self.cache.apply_event(event);
    }

    /// The pattern store backing this orchestrator.
    pub fn patterns(&self) -> &Arc<P> {
        &self.patterns
    }

    /// The zone layout this orchestrator coordinates.
    pub fn coordinator(&self) -> &ZoneCoordinator {
        &self.coordinator
    }

    /// Run one goal through the full pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the goal is empty, the fleet cannot
    /// be snapshotted, intent resolution fails, the candidate set does
    /// not compile, or the safety gate rejects the plan. All of these
    /// surface before any device action is invoked.
    pub async fn orchestrate(
        &self,
        request: OrchestrationRequest,
    ) -> Result<OrchestrationResponse, EngineError> {
        let goal = request.goal.trim();
        if goal.is_empty() {
            return Err(ValidationError::EmptyGoal.into());
        }
        info!(goal, zones = request.zones.len(), "orchestrating goal");

        let snapshots = self.snapshot_fleet(&request).await?;
        let candidates = self.intent.resolve_goal(goal, &snapshots).await?;
        let candidates = self.scope_to_zones(candidates, &request.zones);
        info!(candidates = candidates.len(), "goal resolved");

        let mut plan = self.compiler.compile(
            goal,
            request.safety_mode,
            candidates,
            &self.coordinator,
            request.max_steps,
        )?;

        let outcome = match self.gate.gate(&mut plan, request.confirmation.as_deref()) {
            Ok(outcome) => outcome,
            Err(rejection) => {
                plan.status = PlanStatus::Rejected;
                self.record_outcome(&PlanOutcome::from_plan(&plan)).await;
                return Err(rejection.into());
            }
        };

        let learning = request.learn.then(|| Arc::clone(&self.patterns));
        let results = self
            .scheduler
            .run(&mut plan, Arc::clone(&self.gateway), learning)
            .await;

        self.record_outcome(&PlanOutcome::from_plan(&plan)).await;

        Ok(OrchestrationResponse {
            plan_id: plan.id,
            goal: plan.goal.clone(),
            status: plan.status,
            results,
            flagged_irreversible: outcome.flagged,
            discarded: plan.discarded,
        })
    }

    async fn snapshot_fleet(
        &self,
        request: &OrchestrationRequest,
    ) -> Result<Vec<EntitySnapshot>, EngineError> {
        self.cache
            .refresh(self.gateway.as_ref(), &EntityFilter::all())
            .await?;
        let mut snapshots = self.cache.all();
        snapshots.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        if !request.zones.is_empty() {
            snapshots.retain(|s| self.coordinator.in_zones(&s.entity_id, &request.zones));
        }
        Ok(snapshots)
    }

    fn scope_to_zones(
        &self,
        mut candidates: Vec<CandidateOperation>,
        zones: &[String],
    ) -> Vec<CandidateOperation> {
        if zones.is_empty() {
            return candidates;
        }
        candidates.retain(|op| self.coordinator.in_zones(&op.entity_id, zones));
        candidates
    }

    async fn record_outcome(&self, outcome: &PlanOutcome) {
        if let Err(err) = self.patterns.record_outcome(outcome.clone()).await {
            warn!(plan = %outcome.plan_id, error = %err, "plan outcome write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio_stream::Stream;

    use weaver_domain::error::DeviceError;
    use weaver_domain::id::EntityId;
    use weaver_domain::snapshot::AttributeValue;
    use weaver_domain::zone::Zone;

    use crate::pattern_memory::InMemoryPatternStore;
    use crate::ports::StateEvent;

    struct CountingGateway {
        snapshots: Vec<EntitySnapshot>,
        invocations: AtomicUsize,
    }

    impl CountingGateway {
        fn new(entities: &[&str]) -> Self {
            Self {
                snapshots: entities
                    .iter()
                    .map(|e| {
                        EntitySnapshot::builder()
                            .entity_id(*e)
                            .state("off")
                            .build()
                            .unwrap()
                    })
                    .collect(),
                invocations: AtomicUsize::new(0),
            }
        }

        fn invocations(&self) -> usize {
            self.invocations.load(Ordering::SeqCst)
        }
    }

    impl DeviceGateway for CountingGateway {
        async fn query_entities(
            &self,
            filter: &EntityFilter,
        ) -> Result<Vec<EntitySnapshot>, DeviceError> {
            Ok(self
                .snapshots
                .iter()
                .filter(|s| filter.matches(&s.entity_id))
                .cloned()
                .collect())
        }

        async fn invoke_action(
            &self,
            entity_id: &EntityId,
            _action: &str,
            _params: &HashMap<String, AttributeValue>,
            _timeout: Duration,
        ) -> Result<EntitySnapshot, DeviceError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            Ok(EntitySnapshot::builder()
                .entity_id(entity_id.clone())
                .state("on")
                .build()
                .unwrap())
        }

        fn subscribe_events(&self) -> impl Stream<Item = StateEvent> + Send + Unpin {
            tokio_stream::iter(vec![])
        }
    }

    /// Resolver that replays a fixed candidate script.
    struct FixedResolver {
        candidates: Vec<CandidateOperation>,
    }

    impl FixedResolver {
        fn new(candidates: Vec<CandidateOperation>) -> Self {
            Self { candidates }
        }
    }

    impl IntentResolver for FixedResolver {
        async fn resolve_goal(
            &self,
            _goal: &str,
            _snapshots: &[EntitySnapshot],
        ) -> Result<Vec<CandidateOperation>, EngineError> {
            Ok(self.candidates.clone())
        }
    }

    fn op(entity: &str, action: &str) -> CandidateOperation {
        CandidateOperation::builder()
            .entity_id(entity)
            .action(action)
            .build()
            .unwrap()
    }

    fn orchestrator(
        gateway: Arc<CountingGateway>,
        candidates: Vec<CandidateOperation>,
        zones: Vec<Zone>,
    ) -> Orchestrator<CountingGateway, FixedResolver, InMemoryPatternStore> {
        Orchestrator::new(
            gateway,
            FixedResolver::new(candidates),
            Arc::new(InMemoryPatternStore::default()),
            ZoneCoordinator::new(zones),
            OrchestratorConfig {
                scheduler: SchedulerConfig {
                    concurrency: 4,
                    step_timeout: Duration::from_millis(200),
                    backoff_base: Duration::from_millis(1),
                },
                ..OrchestratorConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn should_reject_empty_goal_before_any_stage() {
        let gateway = Arc::new(CountingGateway::new(&["light.a"]));
        let orch = orchestrator(gateway.clone(), vec![], vec![]);

        let result = orch.orchestrate(OrchestrationRequest::new("   ")).await;

        assert!(matches!(
            result,
            Err(EngineError::Validation(ValidationError::EmptyGoal))
        ));
        assert_eq!(gateway.invocations(), 0);
    }

    #[tokio::test]
    async fn should_execute_resolved_goal_end_to_end() {
        let gateway = Arc::new(CountingGateway::new(&["light.a", "light.b"]));
        let orch = orchestrator(
            gateway.clone(),
            vec![op("light.a", "turn_on"), op("light.b", "turn_on")],
            vec![],
        );

        let response = orch
            .orchestrate(OrchestrationRequest::new("lights on"))
            .await
            .unwrap();

        assert_eq!(response.status, PlanStatus::Succeeded);
        assert_eq!(response.count(StepStatus::Succeeded), 2);
        assert_eq!(gateway.invocations(), 2);
        assert!(response.flagged_irreversible.is_empty());
    }

    #[tokio::test]
    async fn should_reject_unconfirmed_irreversible_plan_without_device_contact() {
        let gateway = Arc::new(CountingGateway::new(&["light.a", "lock.front"]));
        let orch = orchestrator(
            gateway.clone(),
            vec![op("light.a", "turn_on"), op("lock.front", "unlock")],
            vec![],
        );

        let result = orch
            .orchestrate(OrchestrationRequest::new("leave home"))
            .await;

        assert!(matches!(result, Err(EngineError::Safety(_))));
        assert_eq!(gateway.invocations(), 0);

        // The rejection is still learned as an outcome.
        let outcomes = orch.patterns().outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, PlanStatus::Rejected);
    }

    #[tokio::test]
    async fn should_execute_confirmed_irreversible_plan() {
        let gateway = Arc::new(CountingGateway::new(&["lock.front"]));
        let orch = orchestrator(gateway.clone(), vec![op("lock.front", "unlock")], vec![]);

        let response = orch
            .orchestrate(OrchestrationRequest::new("open up").with_confirmation("token-1"))
            .await
            .unwrap();

        assert_eq!(response.status, PlanStatus::Succeeded);
        assert_eq!(response.flagged_irreversible.len(), 1);
        assert_eq!(gateway.invocations(), 1);
    }

    #[tokio::test]
    async fn should_scope_candidates_to_requested_zones() {
        let gateway = Arc::new(CountingGateway::new(&["light.living", "light.bedroom"]));
        let zones = vec![
            Zone::builder()
                .name("living_room")
                .priority(10)
                .entity("light.living")
                .build()
                .unwrap(),
            Zone::builder()
                .name("bedroom")
                .priority(10)
                .entity("light.bedroom")
                .build()
                .unwrap(),
        ];
        let orch = orchestrator(
            gateway.clone(),
            vec![op("light.living", "turn_on"), op("light.bedroom", "turn_on")],
            zones,
        );

        let response = orch
            .orchestrate(OrchestrationRequest::new("lights on").with_zone("living_room"))
            .await
            .unwrap();

        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].entity_id.as_str(), "light.living");
        assert_eq!(gateway.invocations(), 1);
    }

    #[tokio::test]
    async fn should_surface_empty_candidate_set_as_compilation_error() {
        let gateway = Arc::new(CountingGateway::new(&["light.a"]));
        let orch = orchestrator(gateway.clone(), vec![], vec![]);

        let result = orch
            .orchestrate(OrchestrationRequest::new("do nothing"))
            .await;

        assert!(matches!(result, Err(EngineError::Compilation(_))));
        assert_eq!(gateway.invocations(), 0);
    }

    #[tokio::test]
    async fn should_record_plan_outcome_after_execution() {
        let gateway = Arc::new(CountingGateway::new(&["light.a"]));
        let orch = orchestrator(gateway, vec![op("light.a", "turn_on")], vec![]);

        orch.orchestrate(OrchestrationRequest::new("light on"))
            .await
            .unwrap();

        let outcomes = orch.patterns().outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, PlanStatus::Succeeded);
        assert_eq!(outcomes[0].succeeded, 1);
        // The successful step also fed an observation.
        assert_eq!(orch.patterns().record_count(), 1);
    }

    #[tokio::test]
    async fn should_not_learn_when_learning_disabled() {
        let gateway = Arc::new(CountingGateway::new(&["light.a"]));
        let orch = orchestrator(gateway, vec![op("light.a", "turn_on")], vec![]);

        orch.orchestrate(OrchestrationRequest::new("light on").with_learning(false))
            .await
            .unwrap();

        assert_eq!(orch.patterns().record_count(), 0);
        // The outcome summary is still kept.
        assert_eq!(orch.patterns().outcomes().len(), 1);
    }

    #[tokio::test]
    async fn should_keep_cached_fleet_view_current() {
        let gateway = Arc::new(CountingGateway::new(&["light.a"]));
        let orch = orchestrator(gateway, vec![op("light.a", "turn_on")], vec![]);

        orch.orchestrate(OrchestrationRequest::new("light on"))
            .await
            .unwrap();
        assert_eq!(orch.cache.len(), 1);

        // A pushed state change replaces the cached snapshot.
        orch.apply_event(StateEvent {
            entity_id: EntityId::from("light.a"),
            snapshot: EntitySnapshot::builder()
                .entity_id("light.a")
                .state("off")
                .build()
                .unwrap(),
            occurred_at: weaver_domain::time::now(),
        });
        let cached = orch.cache.get(&EntityId::from("light.a")).unwrap();
        assert_eq!(cached.state, "off");
    }

    #[tokio::test]
    async fn should_honor_per_request_step_limit() {
        let gateway = Arc::new(CountingGateway::new(&["light.a", "light.b"]));
        let orch = orchestrator(
            gateway.clone(),
            vec![op("light.a", "turn_on"), op("light.b", "turn_on")],
            vec![],
        );

        let result = orch
            .orchestrate(OrchestrationRequest::new("lights on").with_max_steps(1))
            .await;

        assert!(matches!(result, Err(EngineError::Compilation(_))));
        assert_eq!(gateway.invocations(), 0);
    }
}
