//! Telemetry: named counters accumulated while stepping (transition counts, person-time, deaths).

use std::collections::BTreeMap;

use bevy_ecs::prelude::Resource;

#[derive(Debug, Default, Clone, Resource)]
pub struct SimTelemetry {
    counters: BTreeMap<String, f64>,
    pub steps_completed: u64,
}

impl SimTelemetry {
    pub fn increment(&mut self, key: impl Into<String>, by: f64) {
        *self.counters.entry(key.into()).or_insert(0.0) += by;
    }

    pub fn get(&self, key: &str) -> f64 {
        self.counters.get(key).copied().unwrap_or(0.0)
    }

    pub fn counters(&self) -> &BTreeMap<String, f64> {
        &self.counters
    }
}
