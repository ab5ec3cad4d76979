//! `SimulationStarted`: create the birth cohort and let every component fill its columns.

use bevy_ecs::prelude::{Res, ResMut, Resource};
use tracing::info;

use crate::clock::SimulationClock;
use crate::error::SimError;
use crate::population::{PopulationTable, SimulantId};
use crate::scenario::{ModelComponents, ModelParams};
use crate::telemetry::SimTelemetry;
use crate::values::ValueRegistry;

/// Rows created by the current `SimulationStarted` event.
#[derive(Debug, Default, Resource)]
pub struct NewCohort {
    pub index: Vec<SimulantId>,
}

pub fn create_cohort_system(
    mut population: ResMut<PopulationTable>,
    mut cohort: ResMut<NewCohort>,
    components: Res<ModelComponents>,
    params: Res<ModelParams>,
    clock: Res<SimulationClock>,
) -> Result<(), SimError> {
    let index: Vec<SimulantId> = population.create(params.population_size).collect();
    components
        .population
        .initialize(&mut population, clock.sim_time(), &index)?;
    info!(simulants = index.len(), "birth cohort created");
    cohort.index = index;
    Ok(())
}

pub fn initialize_lbwsg_system(
    mut population: ResMut<PopulationTable>,
    values: Res<ValueRegistry>,
    telemetry: Res<SimTelemetry>,
    components: Res<ModelComponents>,
    cohort: Res<NewCohort>,
    clock: Res<SimulationClock>,
) -> Result<(), SimError> {
    components.lbwsg.initialize(
        &mut population,
        &values,
        &telemetry,
        clock.sim_time(),
        &cohort.index,
    )
}

pub fn initialize_maternal_nutrition_system(
    mut population: ResMut<PopulationTable>,
    components: Res<ModelComponents>,
    cohort: Res<NewCohort>,
) -> Result<(), SimError> {
    components
        .maternal_malnutrition
        .initialize(&mut population, &cohort.index)
}

pub fn initialize_supplementation_system(
    mut population: ResMut<PopulationTable>,
    components: Res<ModelComponents>,
    cohort: Res<NewCohort>,
) -> Result<(), SimError> {
    components
        .supplementation
        .initialize(&mut population, &cohort.index)
}

pub fn initialize_correlated_risks_system(
    mut population: ResMut<PopulationTable>,
    components: Res<ModelComponents>,
    cohort: Res<NewCohort>,
) -> Result<(), SimError> {
    for risk in &components.correlated_risks {
        risk.initialize(&mut population, &cohort.index)?;
    }
    Ok(())
}

pub fn initialize_diseases_system(
    mut population: ResMut<PopulationTable>,
    values: Res<ValueRegistry>,
    telemetry: Res<SimTelemetry>,
    components: Res<ModelComponents>,
    cohort: Res<NewCohort>,
    clock: Res<SimulationClock>,
) -> Result<(), SimError> {
    let time = clock.sim_time();
    for disease in &components.diseases {
        disease.initialize(&mut population, &values, &telemetry, time, &cohort.index)?;
    }
    Ok(())
}

pub fn initialize_risk_attributable_system(
    mut population: ResMut<PopulationTable>,
    values: Res<ValueRegistry>,
    telemetry: Res<SimTelemetry>,
    components: Res<ModelComponents>,
    cohort: Res<NewCohort>,
    clock: Res<SimulationClock>,
) -> Result<(), SimError> {
    let time = clock.sim_time();
    for disease in &components.risk_attributable {
        disease.initialize(&mut population, &values, &telemetry, time, &cohort.index)?;
    }
    Ok(())
}

pub fn initialize_mortality_system(
    mut population: ResMut<PopulationTable>,
    components: Res<ModelComponents>,
    cohort: Res<NewCohort>,
) -> Result<(), SimError> {
    components.mortality.initialize(&mut population, &cohort.index)
}

pub fn initialize_disability_system(
    mut population: ResMut<PopulationTable>,
    components: Res<ModelComponents>,
    cohort: Res<NewCohort>,
) -> Result<(), SimError> {
    components.disability.initialize(&mut population, &cohort.index)
}

pub fn schedule_first_step_system(
    mut clock: ResMut<SimulationClock>,
) -> Result<(), SimError> {
    if clock.end_day() > clock.now() {
        let now = clock.now();
        clock.schedule_step(now);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_ecs::prelude::World;
    use bevy_ecs::system::RunSystemOnce;

    use crate::clock::EventKind;

    #[test]
    fn first_step_is_not_scheduled_for_an_empty_run() {
        let mut world = World::new();
        world.insert_resource(SimulationClock::new(2020, 1, 0));
        world
            .run_system_once(schedule_first_step_system)
            .expect("scheduled");
        assert!(world.resource::<SimulationClock>().is_empty());

        world.insert_resource(SimulationClock::new(2020, 1, 3));
        world
            .run_system_once(schedule_first_step_system)
            .expect("scheduled");
        let mut clock = world.resource_mut::<SimulationClock>();
        assert_eq!(clock.pop_next().map(|e| e.kind), Some(EventKind::TimeStepPrepare));
    }
}
