//! `TimeStep`: deaths first, then disease transitions among the survivors.

use bevy_ecs::prelude::{Res, ResMut};

use crate::clock::SimulationClock;
use crate::error::SimError;
use crate::population::PopulationTable;
use crate::scenario::ModelComponents;
use crate::telemetry::SimTelemetry;
use crate::values::ValueRegistry;

pub fn mortality_system(
    mut population: ResMut<PopulationTable>,
    values: Res<ValueRegistry>,
    mut telemetry: ResMut<SimTelemetry>,
    components: Res<ModelComponents>,
    clock: Res<SimulationClock>,
) -> Result<(), SimError> {
    components
        .mortality
        .step(&mut population, &values, &mut telemetry, clock.sim_time())
}

pub fn disease_transition_system(
    mut population: ResMut<PopulationTable>,
    values: Res<ValueRegistry>,
    mut telemetry: ResMut<SimTelemetry>,
    components: Res<ModelComponents>,
    clock: Res<SimulationClock>,
) -> Result<(), SimError> {
    let time = clock.sim_time();
    for disease in &components.diseases {
        disease.step(&mut population, &values, &mut telemetry, time)?;
    }
    Ok(())
}

pub fn risk_attributable_system(
    mut population: ResMut<PopulationTable>,
    values: Res<ValueRegistry>,
    telemetry: Res<SimTelemetry>,
    components: Res<ModelComponents>,
    clock: Res<SimulationClock>,
) -> Result<(), SimError> {
    let time = clock.sim_time();
    for disease in &components.risk_attributable {
        disease.refresh(&mut population, &values, &telemetry, time)?;
    }
    Ok(())
}
