//! Base population: the newborn cohort's demographic columns and aging.

use tracing::debug;

use crate::clock::SimTime;
use crate::error::SimError;
use crate::lookup::LookupTable;
use crate::population::{
    AliveStatus, ColumnKind, PopulationTable, PopulationUpdate, PopulationView, Sex, SimulantId,
    AGE, ALIVE, ENTRANCE_TIME, SEX,
};
use crate::randomness::RandomStream;
use crate::scenario::{ModelBuilder, METRICS};
use crate::values::Signal;

const STRUCTURE_KEY: &str = "population.structure";

pub struct BasePopulation {
    view: PopulationView,
    sex_stream: RandomStream,
    structure: Option<LookupTable>,
    male_fraction: f64,
}

impl BasePopulation {
    pub fn setup(builder: &mut ModelBuilder<'_>) -> Result<Self, SimError> {
        let view = builder.declare_view(
            "population",
            &[
                (AGE, ColumnKind::Float),
                (SEX, ColumnKind::Category),
                (ENTRANCE_TIME, ColumnKind::Float),
            ],
            &[ALIVE],
        )?;
        let sex_stream = builder.stream("population_sex")?;
        let structure = builder.optional_lookup(STRUCTURE_KEY)?;

        let metrics_view = view.clone();
        builder
            .values()
            .register_value_modifier(METRICS, move |ctx, _, value| {
                let mut metrics = value.into_metrics(METRICS)?;
                let size = ctx.population.size();
                if size == 0 {
                    return Ok(Signal::Metrics(metrics));
                }
                let status = ctx.population.categories(&metrics_view, ALIVE)?;
                let count = |level: AliveStatus| {
                    (0..size).filter(|&i| status.get(i) == level.as_str()).count() as f64
                };
                metrics.insert("population.total".to_string(), size as f64);
                metrics.insert("population.living".to_string(), count(AliveStatus::Alive));
                metrics.insert("population.dead".to_string(), count(AliveStatus::Dead));
                Ok(Signal::Metrics(metrics))
            });

        Ok(Self {
            view,
            sex_stream,
            structure,
            male_fraction: builder.params().male_fraction,
        })
    }

    /// Sex weights (male, female) for newborns in `year`.
    fn sex_weights(&self, year: f64) -> [f64; 2] {
        match &self.structure {
            Some(structure) => [
                structure.value(Sex::Male, 0.0, year),
                structure.value(Sex::Female, 0.0, year),
            ],
            None => [self.male_fraction, 1.0 - self.male_fraction],
        }
    }

    /// Fills age, sex and entrance time for freshly created rows.
    pub fn initialize(
        &self,
        population: &mut PopulationTable,
        time: SimTime,
        index: &[SimulantId],
    ) -> Result<(), SimError> {
        let sexes = self
            .sex_stream
            .choice(index, &Sex::ALL, &self.sex_weights(time.year), None)?;
        population.update(
            &self.view,
            PopulationUpdate::new(index.to_vec())
                .fill_float(AGE, 0.0)
                .categories(SEX, sexes.iter().map(|s| s.as_str()).collect())
                .fill_float(ENTRANCE_TIME, time.now),
        )?;
        Ok(())
    }

    /// Ages every living simulant by one step.
    pub fn age(&self, population: &mut PopulationTable, time: SimTime) -> Result<(), SimError> {
        let alive = population.alive_index(&self.view)?;
        let ages = population.floats(&self.view, AGE)?;
        let aged: Vec<f64> = alive.iter().map(|&i| ages[i] + time.step_years).collect();
        debug!(alive = alive.len(), "aging");
        population.update(&self.view, PopulationUpdate::new(alive).floats(AGE, aged))?;
        Ok(())
    }
}
