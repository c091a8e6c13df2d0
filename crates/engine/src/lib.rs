//! # weaver-engine
//!
//! Application layer — the orchestration pipeline and **port
//! definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (outbound ports):
//!   - [`ports::DeviceGateway`] — query entities, invoke actions, subscribe
//!     to state-change events
//!   - [`ports::IntentResolver`] — turn goal text into ranked candidate
//!     operations
//!   - [`ports::PatternStore`] — append-only observation and outcome history
//! - Provide the pipeline stages:
//!   - [`zones::ZoneCoordinator`] — cross-zone conflict resolution
//!   - [`compiler::PlanCompiler`] — candidate list → dependency graph
//!   - [`safety::SafetyGate`] — irreversible-action gating and deadlines
//!   - [`scheduler::ExecutionScheduler`] — bounded-concurrency execution
//! - Provide **in-process infrastructure** that doesn't need IO
//!   ([`snapshot_cache::SnapshotCache`],
//!   [`pattern_memory::InMemoryPatternStore`])
//! - Tie it together behind [`orchestrator::Orchestrator`]
//!
//! ## Dependency rule
//! Depends on `weaver-domain` only (plus `tokio::sync`/`tokio::time` for
//! concurrency). Never imports adapter crates. Adapters depend on *this*
//! crate, not the reverse.

pub mod compiler;
pub mod orchestrator;
pub mod pattern_memory;
pub mod ports;
pub mod safety;
pub mod scheduler;
pub mod snapshot_cache;
pub mod zones;
