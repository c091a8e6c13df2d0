//! # weaver-domain
//!
//! Pure domain model for the weaver orchestration engine.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **EntitySnapshots** (cached observations of device-layer state)
//! - Define **CandidateOperations** (externally proposed device actions)
//! - Define **Plans** and **Steps** (the compiled dependency graph)
//! - Define **PatternRecords** (immutable historical observations)
//! - Define **Zones** (named entity groupings with a priority rank)
//! - Contain all invariant enforcement and domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `engine`, adapters, or external IO
//! crates. All IO boundaries are expressed as traits in the `engine`
//! crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod execution;
pub mod operation;
pub mod pattern;
pub mod plan;
pub mod snapshot;
pub mod zone;
