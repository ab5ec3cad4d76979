//! Read-only access to a wired world for observers, exports and tests.
//!
//! Nothing here mutates the population; values are computed with the clock's current step time.

use std::collections::BTreeMap;

use bevy_ecs::prelude::World;

use crate::clock::SimulationClock;
use crate::error::{PopulationError, SimError, WiringError};
use crate::population::{ColumnValues, PopulationTable, SimulantId};
use crate::scenario::METRICS;
use crate::telemetry::SimTelemetry;
use crate::values::{PipelineContext, Signal, ValueRegistry};

fn evaluate(
    world: &World,
    name: &str,
    index: &[SimulantId],
    post_process: bool,
) -> Result<Signal, SimError> {
    let registry = world.resource::<ValueRegistry>();
    let handle = registry
        .handle(name)
        .ok_or_else(|| WiringError::MissingProducer {
            name: name.to_string(),
        })?;
    let ctx = PipelineContext::new(
        world.resource::<PopulationTable>(),
        registry,
        world.resource::<SimulationClock>().sim_time(),
        world.resource::<SimTelemetry>(),
    );
    let signal = if post_process {
        registry.call(handle, &ctx, index)?
    } else {
        registry.call_raw(handle, &ctx, index)?
    };
    Ok(signal)
}

/// Evaluates the pipeline `name` for `index`.
pub fn pipeline_value(world: &World, name: &str, index: &[SimulantId]) -> Result<Signal, SimError> {
    evaluate(world, name, index, true)
}

/// Evaluates the pipeline `name` for `index` without its post-processor.
pub fn pipeline_value_raw(
    world: &World,
    name: &str,
    index: &[SimulantId],
) -> Result<Signal, SimError> {
    evaluate(world, name, index, false)
}

/// Run-level measures: telemetry counters plus whatever components add to the `metrics` pipeline.
pub fn collect_metrics(world: &World) -> Result<BTreeMap<String, f64>, SimError> {
    let metrics = pipeline_value(world, METRICS, &[])?.into_metrics(METRICS)?;
    Ok(metrics)
}

/// Every simulant's value in `column`, indexed by simulant id.
pub fn column_values(world: &World, column: &str) -> Result<ColumnValues, SimError> {
    world
        .resource::<PopulationTable>()
        .snapshot()
        .into_iter()
        .find_map(|(name, values)| (name == column).then_some(values))
        .ok_or_else(|| {
            PopulationError::UnknownColumn {
                column: column.to_string(),
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{initialize_simulation, run_until_empty, simulation_schedule};
    use crate::scenario::{build_model, ModelParams};
    use crate::test_helpers::synthetic_store;

    fn run_world(days: u64) -> World {
        let params = ModelParams::default()
            .with_population_size(100)
            .with_duration_days(days);
        let mut world = World::new();
        build_model(&mut world, &params, &synthetic_store()).expect("model");
        initialize_simulation(&mut world);
        let mut schedule = simulation_schedule();
        run_until_empty(&mut world, &mut schedule, 10_000).expect("run");
        world
    }

    #[test]
    fn metrics_include_population_counts() {
        let world = run_world(10);
        let metrics = collect_metrics(&world).expect("metrics");
        assert_eq!(metrics["population.total"], 100.0);
        assert_eq!(
            metrics["population.living"] + metrics["population.dead"],
            100.0
        );
    }

    #[test]
    fn unknown_pipeline_is_a_wiring_error() {
        let world = run_world(1);
        let err = pipeline_value(&world, "no_such_value", &[0]).unwrap_err();
        assert!(matches!(err, SimError::Wiring(WiringError::MissingProducer { .. })));
    }

    #[test]
    fn column_values_cover_every_simulant() {
        let world = run_world(1);
        let ages = column_values(&world, "age").expect("age");
        assert_eq!(ages.len(), 100);
        assert!(column_values(&world, "no_such_column").is_err());
    }
}
