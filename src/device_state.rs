//! Device state published by other subsystems (recording agents, playout
//! servers), kept verbatim per device type

use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct DeviceStateStore {
    states: DashMap<String, Value>,
}

impl DeviceStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the state of `device_type`; returns the previous state
    pub fn publish(&self, device_type: &str, state: Value) -> Option<Value> {
        debug!("Device state '{}' updated", device_type);
        self.states.insert(device_type.to_string(), state)
    }

    pub fn get(&self, device_type: &str) -> Option<Value> {
        self.states.get(device_type).map(|v| v.value().clone())
    }

    pub fn remove(&self, device_type: &str) -> Option<Value> {
        self.states.remove(device_type).map(|(_, v)| v)
    }

    /// Everything, ordered by device type
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.states
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}
