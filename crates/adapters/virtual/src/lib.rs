//! # weaver-adapter-virtual
//!
//! Simulated device fleet implementing the engine's device port, plus a
//! keyword-based intent resolver. Used for demonstration and for
//! exercising the engine against an unreliable fleet without hardware.
//!
//! ## Provided devices
//!
//! [`VirtualFleet::demo`] seeds a small home: lights, a switch, a front
//! door lock, and a thermostat. Faults are scriptable per entity:
//! transient failures (succeed after N retries), unavailability, and
//! invocation latency.
//!
//! ## Dependency rule
//!
//! Depends on `weaver-engine` (port traits) and `weaver-domain` only.

mod devices;
mod intent;

pub use devices::{VirtualDevice, VirtualLight, VirtualLock, VirtualSwitch, VirtualThermostat};
pub use intent::KeywordIntentResolver;

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

use weaver_domain::error::DeviceError;
use weaver_domain::id::EntityId;
use weaver_domain::snapshot::{AttributeValue, EntitySnapshot};
use weaver_domain::time::now;
use weaver_engine::ports::{DeviceGateway, EntityFilter, StateEvent};

/// Per-entity fault script.
#[derive(Debug, Default)]
struct Fault {
    /// Invocations that fail with a retryable error before one succeeds.
    transient_remaining: u32,
    /// While set, every invocation reports the entity unavailable.
    unavailable: bool,
    /// Added to every invocation against this entity.
    latency: Option<Duration>,
}

/// A simulated fleet behind the device port.
pub struct VirtualFleet {
    devices: Mutex<HashMap<EntityId, VirtualDevice>>,
    faults: Mutex<HashMap<EntityId, Fault>>,
    events: broadcast::Sender<StateEvent>,
}

impl Default for VirtualFleet {
    fn default() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            devices: Mutex::new(HashMap::new()),
            faults: Mutex::new(HashMap::new()),
            events,
        }
    }
}

impl VirtualFleet {
    /// An empty fleet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A small demo home: three lights, a fan switch, a front door lock,
    /// and a thermostat.
    #[must_use]
    pub fn demo() -> Self {
        let fleet = Self::new();
        fleet.add(VirtualDevice::Light(VirtualLight::new("light.living_room")));
        fleet.add(VirtualDevice::Light(VirtualLight::new("light.kitchen")));
        fleet.add(VirtualDevice::Light(VirtualLight::new("light.bedroom")));
        fleet.add(VirtualDevice::Switch(VirtualSwitch::new("switch.fan")));
        fleet.add(VirtualDevice::Lock(VirtualLock::new("lock.front_door")));
        fleet.add(VirtualDevice::Thermostat(VirtualThermostat::new(
            "climate.thermostat",
        )));
        fleet
    }

    /// Add a device to the fleet.
    pub fn add(&self, device: VirtualDevice) {
        self.lock_devices()
            .insert(device.entity_id().clone(), device);
    }

    /// Script the next `count` invocations against `entity_id` to fail
    /// with a retryable error.
    pub fn fail_transiently(&self, entity_id: &EntityId, count: u32) {
        self.lock_faults()
            .entry(entity_id.clone())
            .or_default()
            .transient_remaining = count;
    }

    /// Mark `entity_id` unreachable (or reachable again).
    pub fn set_unavailable(&self, entity_id: &EntityId, unavailable: bool) {
        self.lock_faults()
            .entry(entity_id.clone())
            .or_default()
            .unavailable = unavailable;
    }

    /// Add fixed latency to every invocation against `entity_id`.
    pub fn set_latency(&self, entity_id: &EntityId, latency: Duration) {
        self.lock_faults()
            .entry(entity_id.clone())
            .or_default()
            .latency = Some(latency);
    }

    /// Current snapshot of one device, if it exists.
    #[must_use]
    pub fn snapshot_of(&self, entity_id: &EntityId) -> Option<EntitySnapshot> {
        self.lock_devices().get(entity_id).map(VirtualDevice::snapshot)
    }

    fn lock_devices(&self) -> std::sync::MutexGuard<'_, HashMap<EntityId, VirtualDevice>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_faults(&self) -> std::sync::MutexGuard<'_, HashMap<EntityId, Fault>> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consult the fault script for one invocation. Returns the latency
    /// to apply, or the scripted failure.
    fn check_faults(&self, entity_id: &EntityId) -> Result<Option<Duration>, DeviceError> {
        let mut faults = self.lock_faults();
        let Some(fault) = faults.get_mut(entity_id) else {
            return Ok(None);
        };
        if fault.unavailable {
            return Err(DeviceError::Unavailable(entity_id.clone()));
        }
        if fault.transient_remaining > 0 {
            fault.transient_remaining -= 1;
            return Err(DeviceError::Retryable(format!(
                "injected transient fault on {entity_id}"
            )));
        }
        Ok(fault.latency)
    }
}

impl DeviceGateway for VirtualFleet {
    async fn query_entities(
        &self,
        filter: &EntityFilter,
    ) -> Result<Vec<EntitySnapshot>, DeviceError> {
        let mut snapshots: Vec<EntitySnapshot> = self
            .lock_devices()
            .values()
            .filter(|d| filter.matches(d.entity_id()))
            .map(VirtualDevice::snapshot)
            .collect();
        snapshots.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        Ok(snapshots)
    }

    async fn invoke_action(
        &self,
        entity_id: &EntityId,
        action: &str,
        params: &HashMap<String, AttributeValue>,
        _timeout: Duration,
    ) -> Result<EntitySnapshot, DeviceError> {
        let latency = self.check_faults(entity_id)?;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let snapshot = {
            let mut devices = self.lock_devices();
            let device = devices
                .get_mut(entity_id)
                .ok_or_else(|| DeviceError::UnknownEntity(entity_id.clone()))?;
            device.apply(action, params)?
        };
        debug!(entity = %entity_id, action, state = %snapshot.state, "virtual action applied");

        // No receivers is fine; events are fire-and-forget.
        let _ = self.events.send(StateEvent {
            entity_id: entity_id.clone(),
            snapshot: snapshot.clone(),
            occurred_at: now(),
        });
        Ok(snapshot)
    }

    fn subscribe_events(&self) -> impl Stream<Item = StateEvent> + Send + Unpin {
        BroadcastStream::new(self.events.subscribe()).filter_map(Result::ok)
    }
}
