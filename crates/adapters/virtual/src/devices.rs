//! Simulated device models.
//!
//! Each device holds its own state and answers actions synchronously;
//! the fleet wrapper adds faults, latency, and event fan-out on top.

use std::collections::HashMap;

use weaver_domain::error::DeviceError;
use weaver_domain::id::EntityId;
use weaver_domain::snapshot::{AttributeValue, EntitySnapshot};
use weaver_domain::time::now;

/// A simulated device of any supported kind.
pub enum VirtualDevice {
    Light(VirtualLight),
    Switch(VirtualSwitch),
    Lock(VirtualLock),
    Thermostat(VirtualThermostat),
}

impl VirtualDevice {
    /// The device's entity id.
    #[must_use]
    pub fn entity_id(&self) -> &EntityId {
        match self {
            Self::Light(d) => &d.entity_id,
            Self::Switch(d) => &d.entity_id,
            Self::Lock(d) => &d.entity_id,
            Self::Thermostat(d) => &d.entity_id,
        }
    }

    /// Current state as a snapshot.
    #[must_use]
    pub fn snapshot(&self) -> EntitySnapshot {
        match self {
            Self::Light(d) => d.snapshot(),
            Self::Switch(d) => d.snapshot(),
            Self::Lock(d) => d.snapshot(),
            Self::Thermostat(d) => d.snapshot(),
        }
    }

    /// Apply an action and return the post-action snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidAction`] for actions or parameters
    /// the device kind does not support.
    pub fn apply(
        &mut self,
        action: &str,
        params: &HashMap<String, AttributeValue>,
    ) -> Result<EntitySnapshot, DeviceError> {
        match self {
            Self::Light(d) => d.apply(action, params),
            Self::Switch(d) => d.apply(action),
            Self::Lock(d) => d.apply(action),
            Self::Thermostat(d) => d.apply(action, params),
        }
    }
}

/// A dimmable light.
pub struct VirtualLight {
    entity_id: EntityId,
    on: bool,
    /// Brightness percentage, `0..=100`. Kept across off/on.
    brightness: i64,
}

impl VirtualLight {
    #[must_use]
    pub fn new(entity_id: impl Into<EntityId>) -> Self {
        Self {
            entity_id: entity_id.into(),
            on: false,
            brightness: 100,
        }
    }

    fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            entity_id: self.entity_id.clone(),
            state: if self.on { "on" } else { "off" }.to_string(),
            attributes: HashMap::from([(
                "brightness".to_string(),
                AttributeValue::Int(self.brightness),
            )]),
            last_updated: now(),
        }
    }

    fn apply(
        &mut self,
        action: &str,
        params: &HashMap<String, AttributeValue>,
    ) -> Result<EntitySnapshot, DeviceError> {
        match action {
            "turn_on" => self.on = true,
            "turn_off" => self.on = false,
            "toggle" => self.on = !self.on,
            "set_brightness" => {
                let value = params
                    .get("brightness")
                    .and_then(AttributeValue::as_f64)
                    .ok_or_else(|| {
                        DeviceError::InvalidAction(
                            "set_brightness requires a numeric 'brightness'".to_string(),
                        )
                    })?;
                self.brightness = (value.clamp(0.0, 100.0)) as i64;
                self.on = self.brightness > 0;
            }
            other => {
                return Err(DeviceError::InvalidAction(format!(
                    "light does not support '{other}'"
                )));
            }
        }
        Ok(self.snapshot())
    }
}

/// An on/off switch.
pub struct VirtualSwitch {
    entity_id: EntityId,
    on: bool,
}

impl VirtualSwitch {
    #[must_use]
    pub fn new(entity_id: impl Into<EntityId>) -> Self {
        Self {
            entity_id: entity_id.into(),
            on: false,
        }
    }

    fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            entity_id: self.entity_id.clone(),
            state: if self.on { "on" } else { "off" }.to_string(),
            attributes: HashMap::new(),
            last_updated: now(),
        }
    }

    fn apply(&mut self, action: &str) -> Result<EntitySnapshot, DeviceError> {
        match action {
            "turn_on" => self.on = true,
            "turn_off" => self.on = false,
            "toggle" => self.on = !self.on,
            other => {
                return Err(DeviceError::InvalidAction(format!(
                    "switch does not support '{other}'"
                )));
            }
        }
        Ok(self.snapshot())
    }
}

/// A door lock.
pub struct VirtualLock {
    entity_id: EntityId,
    locked: bool,
}

impl VirtualLock {
    #[must_use]
    pub fn new(entity_id: impl Into<EntityId>) -> Self {
        Self {
            entity_id: entity_id.into(),
            locked: true,
        }
    }

    fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            entity_id: self.entity_id.clone(),
            state: if self.locked { "locked" } else { "unlocked" }.to_string(),
            attributes: HashMap::new(),
            last_updated: now(),
        }
    }

    fn apply(&mut self, action: &str) -> Result<EntitySnapshot, DeviceError> {
        match action {
            "lock" => self.locked = true,
            "unlock" => self.locked = false,
            other => {
                return Err(DeviceError::InvalidAction(format!(
                    "lock does not support '{other}'"
                )));
            }
        }
        Ok(self.snapshot())
    }
}

/// A thermostat with a target temperature and HVAC mode.
pub struct VirtualThermostat {
    entity_id: EntityId,
    target: f64,
    mode: String,
}

impl VirtualThermostat {
    #[must_use]
    pub fn new(entity_id: impl Into<EntityId>) -> Self {
        Self {
            entity_id: entity_id.into(),
            target: 20.0,
            mode: "heat".to_string(),
        }
    }

    fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            entity_id: self.entity_id.clone(),
            state: self.mode.clone(),
            attributes: HashMap::from([(
                "temperature".to_string(),
                AttributeValue::Float(self.target),
            )]),
            last_updated: now(),
        }
    }

    fn apply(
        &mut self,
        action: &str,
        params: &HashMap<String, AttributeValue>,
    ) -> Result<EntitySnapshot, DeviceError> {
        match action {
            "set_temperature" => {
                let value = params
                    .get("temperature")
                    .and_then(AttributeValue::as_f64)
                    .ok_or_else(|| {
                        DeviceError::InvalidAction(
                            "set_temperature requires a numeric 'temperature'".to_string(),
                        )
                    })?;
                self.target = value.clamp(5.0, 35.0);
            }
            "set_hvac_mode" => {
                let mode = params.get("mode").and_then(|v| match v {
                    AttributeValue::String(s) => Some(s.as_str()),
                    _ => None,
                });
                match mode {
                    Some(m @ ("heat" | "cool" | "auto" | "off")) => self.mode = m.to_string(),
                    _ => {
                        return Err(DeviceError::InvalidAction(
                            "set_hvac_mode requires 'mode' of heat/cool/auto/off".to_string(),
                        ));
                    }
                }
            }
            other => {
                return Err(DeviceError::InvalidAction(format!(
                    "thermostat does not support '{other}'"
                )));
            }
        }
        Ok(self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_default_light_to_off_at_full_brightness() {
        let light = VirtualLight::new("light.test");
        let snapshot = light.snapshot();
        assert_eq!(snapshot.state, "off");
        assert_eq!(
            snapshot.get_attribute("brightness"),
            Some(&AttributeValue::Int(100))
        );
    }

    #[test]
    fn should_set_brightness_and_turn_on() {
        let mut light = VirtualLight::new("light.test");
        let params = HashMap::from([("brightness".to_string(), AttributeValue::Int(30))]);
        let snapshot = light.apply("set_brightness", &params).unwrap();
        assert_eq!(snapshot.state, "on");
        assert_eq!(
            snapshot.get_attribute("brightness"),
            Some(&AttributeValue::Int(30))
        );
    }

    #[test]
    fn should_reject_brightness_without_parameter() {
        let mut light = VirtualLight::new("light.test");
        let result = light.apply("set_brightness", &HashMap::new());
        assert!(matches!(result, Err(DeviceError::InvalidAction(_))));
    }

    #[test]
    fn should_toggle_switch() {
        let mut switch = VirtualSwitch::new("switch.test");
        assert_eq!(switch.apply("toggle").unwrap().state, "on");
        assert_eq!(switch.apply("toggle").unwrap().state, "off");
    }

    #[test]
    fn should_default_lock_to_locked() {
        let mut lock = VirtualLock::new("lock.test");
        assert_eq!(lock.snapshot().state, "locked");
        assert_eq!(lock.apply("unlock").unwrap().state, "unlocked");
        assert_eq!(lock.apply("lock").unwrap().state, "locked");
    }

    #[test]
    fn should_reject_unsupported_action_per_kind() {
        let mut lock = VirtualLock::new("lock.test");
        assert!(matches!(
            lock.apply("turn_on"),
            Err(DeviceError::InvalidAction(_))
        ));
    }

    #[test]
    fn should_clamp_thermostat_target() {
        let mut thermostat = VirtualThermostat::new("climate.test");
        let params =
            HashMap::from([("temperature".to_string(), AttributeValue::Float(99.0))]);
        let snapshot = thermostat.apply("set_temperature", &params).unwrap();
        assert_eq!(
            snapshot.get_attribute("temperature"),
            Some(&AttributeValue::Float(35.0))
        );
    }

    #[test]
    fn should_switch_hvac_mode() {
        let mut thermostat = VirtualThermostat::new("climate.test");
        let params = HashMap::from([(
            "mode".to_string(),
            AttributeValue::String("cool".to_string()),
        )]);
        let snapshot = thermostat.apply("set_hvac_mode", &params).unwrap();
        assert_eq!(snapshot.state, "cool");
    }

    #[test]
    fn should_reject_unknown_hvac_mode() {
        let mut thermostat = VirtualThermostat::new("climate.test");
        let params = HashMap::from([(
            "mode".to_string(),
            AttributeValue::String("tropical".to_string()),
        )]);
        assert!(matches!(
            thermostat.apply("set_hvac_mode", &params),
            Err(DeviceError::InvalidAction(_))
        ));
    }
}
