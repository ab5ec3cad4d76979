use tracing::debug;

use crate::clock::SimTime;
use crate::disease::register_cause_effects;
use crate::disease::state::{state_name, StateKind};
use crate::error::SimError;
use crate::lbwsg::{EXPOSURE, GESTATION_TIME};
use crate::population::{
    ColumnKind, PopulationTable, PopulationUpdate, PopulationView, SimulantId, AGE, ALIVE, SEX,
};
use crate::scenario::{ModelBuilder, RiskAttributableSpec};
use crate::telemetry::SimTelemetry;
use crate::values::{PipelineContext, ValueHandle, ValueRegistry};

/// A condition fully determined by the newborn's gestational age, such as preterm birth.
///
/// The gestation is read from the LBWSG exposure before categorization, so interventions that
/// shift it also move simulants in or out of the condition.
pub struct RiskAttributableDisease {
    cause: String,
    view: PopulationView,
    exposure: ValueHandle,
    max_gestation_weeks: f64,
    with_condition: String,
    susceptible: String,
}

impl RiskAttributableDisease {
    pub fn setup(
        builder: &mut ModelBuilder<'_>,
        spec: &RiskAttributableSpec,
    ) -> Result<Self, SimError> {
        let cause = spec.cause.clone();
        let view = builder.declare_view(
            &format!("risk_attributable.{cause}"),
            &[(cause.as_str(), ColumnKind::Category)],
            &[ALIVE, AGE, SEX],
        )?;
        let exposure = builder.values().get_value(EXPOSURE);
        let with_condition = state_name(&cause, StateKind::WithCondition);
        register_cause_effects(builder, &cause, &view, &cause, &with_condition)?;
        Ok(Self {
            susceptible: state_name(&cause, StateKind::Susceptible),
            cause,
            view,
            exposure,
            max_gestation_weeks: spec.max_gestation_weeks,
            with_condition,
        })
    }

    pub fn cause(&self) -> &str {
        &self.cause
    }

    pub fn initialize(
        &self,
        population: &mut PopulationTable,
        values: &ValueRegistry,
        telemetry: &SimTelemetry,
        time: SimTime,
        index: &[SimulantId],
    ) -> Result<(), SimError> {
        self.assign(population, values, telemetry, time, index.to_vec())
    }

    /// Re-derives the state of every living simulant from the current exposure.
    pub fn refresh(
        &self,
        population: &mut PopulationTable,
        values: &ValueRegistry,
        telemetry: &SimTelemetry,
        time: SimTime,
    ) -> Result<(), SimError> {
        let alive = population.alive_index(&self.view)?;
        if alive.is_empty() {
            return Ok(());
        }
        self.assign(population, values, telemetry, time, alive)
    }

    fn assign(
        &self,
        population: &mut PopulationTable,
        values: &ValueRegistry,
        telemetry: &SimTelemetry,
        time: SimTime,
        index: Vec<SimulantId>,
    ) -> Result<(), SimError> {
        let ctx = PipelineContext::new(population, values, time, telemetry);
        let exposure = values
            .call_raw(self.exposure, &ctx, &index)?
            .into_frame(EXPOSURE)?;
        let states: Vec<&str> = exposure
            .column(GESTATION_TIME)?
            .iter()
            .map(|&weeks| {
                if weeks <= self.max_gestation_weeks {
                    self.with_condition.as_str()
                } else {
                    self.susceptible.as_str()
                }
            })
            .collect();
        let affected = states.iter().filter(|s| **s == self.with_condition).count();
        debug!(cause = %self.cause, affected, total = index.len(), "risk attributable states");
        population.update(
            &self.view,
            PopulationUpdate::new(index).categories(&self.cause, states),
        )?;
        Ok(())
    }
}
