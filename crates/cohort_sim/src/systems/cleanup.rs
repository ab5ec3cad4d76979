use bevy_ecs::prelude::{Res, ResMut};

use crate::clock::SimulationClock;
use crate::error::SimError;
use crate::population::PopulationTable;
use crate::scenario::ModelComponents;

/// Aging runs last so every rate read during the step saw the step-start age.
pub fn aging_system(
    mut population: ResMut<PopulationTable>,
    components: Res<ModelComponents>,
    clock: Res<SimulationClock>,
) -> Result<(), SimError> {
    components.population.age(&mut population, clock.sim_time())
}
