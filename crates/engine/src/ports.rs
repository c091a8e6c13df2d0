//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the orchestration core and the
//! outside world. They are defined here (in `engine`) so that both the
//! pipeline stages and the adapter layer can depend on them without
//! creating circular dependencies.

pub mod device;
pub mod intent;
pub mod patterns;

pub use device::{DeviceGateway, EntityFilter, StateEvent};
pub use intent::IntentResolver;
pub use patterns::{PatternStore, PatternStoreError};
