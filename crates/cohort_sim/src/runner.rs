//! Simulation runner: advances the clock and routes events into the ECS.
//!
//! Clock progression and event routing happen here, outside systems. Each step pops the next
//! event from [SimulationClock], inserts it as [CurrentEvent], then runs the schedule. Systems
//! within a phase are chained in a fixed order because later ones read what earlier ones wrote.

use bevy_ecs::prelude::{IntoSystem, Schedule, World};
use bevy_ecs::schedule::IntoSystemConfigs;

use crate::clock::{CurrentEvent, EventKind, SimulationClock};
use crate::error::SimError;
use crate::systems::{
    cleanup::aging_system,
    collect_metrics::step_completed_system,
    initialize::{
        create_cohort_system, initialize_correlated_risks_system, initialize_disability_system,
        initialize_diseases_system, initialize_lbwsg_system, initialize_maternal_nutrition_system,
        initialize_mortality_system, initialize_risk_attributable_system,
        initialize_supplementation_system, schedule_first_step_system,
    },
    is_collect_metrics, is_simulation_started, is_time_step, is_time_step_cleanup,
    is_time_step_prepare, no_fault,
    prepare::{disability_system, disease_prepare_system},
    record_fault,
    time_step::{disease_transition_system, mortality_system, risk_attributable_system},
    SimulationFault,
};

/// Runs one simulation step: pops the next event, inserts it as [CurrentEvent], then runs the
/// schedule. Returns `Ok(true)` if an event was processed and `Ok(false)` once the clock is empty.
/// A system failure during the event is returned as the error and leaves the world as the failing
/// system found it.
pub fn run_next_event(world: &mut World, schedule: &mut Schedule) -> Result<bool, SimError> {
    let event = match world.resource_mut::<SimulationClock>().pop_next() {
        Some(e) => e,
        None => return Ok(false),
    };
    world.insert_resource(CurrentEvent(event));
    schedule.run(world);

    if let Some(err) = world
        .get_resource_mut::<SimulationFault>()
        .and_then(|mut fault| fault.take())
    {
        return Err(err);
    }
    Ok(true)
}

/// Runs simulation steps until the event queue is empty or `max_events` is reached.
/// Returns the number of events processed.
pub fn run_until_empty(
    world: &mut World,
    schedule: &mut Schedule,
    max_events: usize,
) -> Result<usize, SimError> {
    let mut events = 0;
    while events < max_events && run_next_event(world, schedule)? {
        events += 1;
    }
    Ok(events)
}

/// Builds the simulation schedule: one chain of systems per phase, each gated on the current
/// event kind and skipped once a fault has been recorded.
pub fn simulation_schedule() -> Schedule {
    let mut schedule = Schedule::default();

    schedule.add_systems(
        (
            create_cohort_system.pipe(record_fault),
            initialize_lbwsg_system.pipe(record_fault),
            initialize_maternal_nutrition_system.pipe(record_fault),
            initialize_supplementation_system.pipe(record_fault),
            initialize_correlated_risks_system.pipe(record_fault),
            initialize_diseases_system.pipe(record_fault),
            initialize_risk_attributable_system.pipe(record_fault),
            initialize_mortality_system.pipe(record_fault),
            initialize_disability_system.pipe(record_fault),
            schedule_first_step_system.pipe(record_fault),
        )
            .chain()
            .distributive_run_if(is_simulation_started)
            .distributive_run_if(no_fault),
    );

    schedule.add_systems(
        (
            disability_system.pipe(record_fault),
            disease_prepare_system.pipe(record_fault),
        )
            .chain()
            .distributive_run_if(is_time_step_prepare)
            .distributive_run_if(no_fault),
    );

    schedule.add_systems(
        (
            mortality_system.pipe(record_fault),
            disease_transition_system.pipe(record_fault),
            risk_attributable_system.pipe(record_fault),
        )
            .chain()
            .distributive_run_if(is_time_step)
            .distributive_run_if(no_fault),
    );

    schedule.add_systems(
        aging_system
            .pipe(record_fault)
            .run_if(is_time_step_cleanup)
            .run_if(no_fault),
    );

    schedule.add_systems(
        step_completed_system
            .pipe(record_fault)
            .run_if(is_collect_metrics)
            .run_if(no_fault),
    );

    schedule
}

/// Initializes the simulation by scheduling the SimulationStarted event at time 0.
/// Call this after [crate::scenario::build_model] and before running events.
pub fn initialize_simulation(world: &mut World) {
    let mut clock = world.resource_mut::<SimulationClock>();
    clock.schedule_at(0, EventKind::SimulationStarted);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::PopulationTable;
    use crate::scenario::{build_model, ModelParams};
    use crate::telemetry::SimTelemetry;
    use crate::test_helpers::synthetic_store;

    #[test]
    fn runs_every_phase_of_every_step() {
        let params = ModelParams::default()
            .with_population_size(50)
            .with_step_days(7)
            .with_duration_days(28);
        let mut world = World::new();
        build_model(&mut world, &params, &synthetic_store()).expect("model");
        initialize_simulation(&mut world);

        let mut schedule = simulation_schedule();
        let events = run_until_empty(&mut world, &mut schedule, 1_000).expect("run");

        assert_eq!(events, 1 + 4 * 4);
        assert_eq!(world.resource::<SimTelemetry>().steps_completed, 4);
        assert_eq!(world.resource::<SimulationClock>().now(), 21);
        assert_eq!(world.resource::<PopulationTable>().size(), 50);
    }

    #[test]
    fn max_events_bounds_the_run() {
        let params = ModelParams::default()
            .with_population_size(5)
            .with_duration_days(365);
        let mut world = World::new();
        build_model(&mut world, &params, &synthetic_store()).expect("model");
        initialize_simulation(&mut world);

        let mut schedule = simulation_schedule();
        let events = run_until_empty(&mut world, &mut schedule, 9).expect("run");
        assert_eq!(events, 9);
        assert_eq!(world.resource::<SimTelemetry>().steps_completed, 2);
    }
}
