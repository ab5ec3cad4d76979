//! `TimeStepPrepare`: accrue step-start person-time before anything changes state.

use bevy_ecs::prelude::{Res, ResMut};

use crate::clock::SimulationClock;
use crate::error::SimError;
use crate::population::PopulationTable;
use crate::scenario::ModelComponents;
use crate::telemetry::SimTelemetry;
use crate::values::ValueRegistry;

pub fn disability_system(
    mut population: ResMut<PopulationTable>,
    values: Res<ValueRegistry>,
    mut telemetry: ResMut<SimTelemetry>,
    components: Res<ModelComponents>,
    clock: Res<SimulationClock>,
) -> Result<(), SimError> {
    components
        .disability
        .accrue(&mut population, &values, &mut telemetry, clock.sim_time())
}

/// Snapshots every disease state into its `previous_<cause>` column.
pub fn disease_prepare_system(
    mut population: ResMut<PopulationTable>,
    mut telemetry: ResMut<SimTelemetry>,
    components: Res<ModelComponents>,
    clock: Res<SimulationClock>,
) -> Result<(), SimError> {
    let time = clock.sim_time();
    for disease in &components.diseases {
        disease.prepare(&mut population, &mut telemetry, time)?;
    }
    Ok(())
}
