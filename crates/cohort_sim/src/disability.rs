//! Years lived with disability, accrued from the combined `disability_weight` pipeline.

use crate::clock::SimTime;
use crate::error::SimError;
use crate::population::{
    ColumnKind, PopulationTable, PopulationUpdate, PopulationView, SimulantId, ALIVE,
};
use crate::scenario::ModelBuilder;
use crate::telemetry::SimTelemetry;
use crate::values::{PipelineContext, ValueHandle, ValueProducer, ValueRegistry};

pub const YEARS_LIVED_WITH_DISABILITY: &str = "years_lived_with_disability";
pub const DISABILITY_WEIGHT: &str = "disability_weight";

pub struct Disability {
    view: PopulationView,
    weight: ValueHandle,
}

impl Disability {
    pub fn setup(builder: &mut ModelBuilder<'_>) -> Result<Self, SimError> {
        let view = builder.declare_view(
            "disability",
            &[(YEARS_LIVED_WITH_DISABILITY, ColumnKind::Float)],
            &[ALIVE],
        )?;
        let weight = builder
            .values()
            .register_value_producer(DISABILITY_WEIGHT, ValueProducer::union_of_contributions())?;
        Ok(Self { view, weight })
    }

    pub fn initialize(
        &self,
        population: &mut PopulationTable,
        index: &[SimulantId],
    ) -> Result<(), SimError> {
        population.update(
            &self.view,
            PopulationUpdate::new(index.to_vec()).fill_float(YEARS_LIVED_WITH_DISABILITY, 0.0),
        )?;
        Ok(())
    }

    /// Adds one step of weighted person-time for every living simulant.
    pub fn accrue(
        &self,
        population: &mut PopulationTable,
        values: &ValueRegistry,
        telemetry: &mut SimTelemetry,
        time: SimTime,
    ) -> Result<(), SimError> {
        let alive = population.alive_index(&self.view)?;
        if alive.is_empty() {
            return Ok(());
        }
        let ctx = PipelineContext::new(population, values, time, telemetry);
        let weights = values
            .call(self.weight, &ctx, &alive)?
            .into_scalar(DISABILITY_WEIGHT)?;
        let current = population.floats(&self.view, YEARS_LIVED_WITH_DISABILITY)?;
        let accrued: Vec<f64> = alive
            .iter()
            .zip(&weights)
            .map(|(&i, dw)| current[i] + dw * time.step_years)
            .collect();
        let total: f64 = weights.iter().sum::<f64>() * time.step_years;
        telemetry.increment(YEARS_LIVED_WITH_DISABILITY, total);
        population.update(
            &self.view,
            PopulationUpdate::new(alive).floats(YEARS_LIVED_WITH_DISABILITY, accrued),
        )?;
        Ok(())
    }
}
