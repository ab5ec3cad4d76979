#![allow(dead_code)]

use bevy_ecs::prelude::World;
use cohort_sim::data::{DataStore, DrawTable};
use cohort_sim::runner::initialize_simulation;
use cohort_sim::scenario::{build_model, DiseaseKind, ModelParams, Scenario};
use cohort_sim::test_helpers::synthetic_store;

/// Helper that wires a model against a data store for integration tests.
///
/// Defaults to a small cohort over the synthetic store with a fixed seed so every test is
/// reproducible.
#[derive(Debug, Clone)]
pub struct TestWorldBuilder {
    params: ModelParams,
    store: DataStore,
}

impl Default for TestWorldBuilder {
    fn default() -> Self {
        Self {
            params: ModelParams::default()
                .with_seed(42)
                .with_population_size(1_000)
                .with_duration_days(30),
            store: synthetic_store(),
        }
    }
}

impl TestWorldBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.params.seed = seed;
        self
    }

    pub fn with_population_size(mut self, size: usize) -> Self {
        self.params.population_size = size;
        self
    }

    pub fn with_duration_days(mut self, days: u64) -> Self {
        self.params.duration_days = days;
        self
    }

    pub fn with_step_days(mut self, days: u64) -> Self {
        self.params.step_days = days;
        self
    }

    pub fn with_scenario(mut self, scenario: Scenario) -> Self {
        self.params.scenario = scenario;
        self
    }

    pub fn with_disease(mut self, cause: &str, model: DiseaseKind) -> Self {
        self.params = self.params.with_disease(cause, model);
        self
    }

    /// Adjust any parameter the shortcuts above do not cover.
    pub fn with_params(mut self, f: impl FnOnce(ModelParams) -> ModelParams) -> Self {
        self.params = f(self.params);
        self
    }

    /// Replace the data store entirely.
    pub fn with_store(mut self, store: DataStore) -> Self {
        self.store = store;
        self
    }

    /// Replace a single table in the current store.
    pub fn with_table(mut self, key: &str, table: DrawTable) -> Self {
        self.store.insert_table(key, table);
        self
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// Wire the model and schedule `SimulationStarted`.
    pub fn build(self) -> World {
        let mut world = World::new();
        build_model(&mut world, &self.params, &self.store).expect("model should wire");
        initialize_simulation(&mut world);
        world
    }
}
