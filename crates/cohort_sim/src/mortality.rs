//! Competing-risk mortality.
//!
//! Disease models contribute their cause-specific mortality to
//! [CAUSE_SPECIFIC_MORTALITY_RATE] and their excess mortality as extra columns of
//! [MORTALITY_RATE]. What is left of the all-cause rate after removing the modeled causes is
//! `other_causes`:
//!
//! ```text
//! other_causes = acmr - modeled_csmr - unmodeled_raw + unmodeled_adjusted
//! ```
//!
//! where the last two terms swap the raw rate of risk-affected but unmodeled causes for the same
//! rate net of its attributable fraction. The hazard is the row sum of [MORTALITY_RATE] scaled by
//! `1 - paf`. Simulants that die have their cause drawn in proportion to each cause's share of
//! that hazard.

use std::sync::Arc;

use tracing::debug;

use crate::clock::SimTime;
use crate::error::{PipelineError, SimError};
use crate::lookup::LookupTable;
use crate::population::{
    AliveStatus, ColumnKind, PopulationTable, PopulationUpdate, PopulationView, SimulantId, AGE,
    ALIVE, EXIT_TIME, SEX,
};
use crate::randomness::RandomStream;
use crate::scenario::ModelBuilder;
use crate::telemetry::SimTelemetry;
use crate::values::{
    PipelineContext, Signal, ValueFrame, ValueHandle, ValueProducer, ValueRegistry,
};

pub const CAUSE_OF_DEATH: &str = "cause_of_death";
pub const YEARS_OF_LIFE_LOST: &str = "years_of_life_lost";
pub const NOT_DEAD: &str = "not_dead";
pub const OTHER_CAUSES: &str = "other_causes";

pub const CAUSE_SPECIFIC_MORTALITY_RATE: &str = "cause_specific_mortality_rate";
pub const MORTALITY_RATE: &str = "mortality_rate";
pub const MORTALITY_HAZARD: &str = "all_causes.mortality_hazard";
pub const MORTALITY_HAZARD_PAF: &str =
    "all_causes.mortality_hazard.population_attributable_fraction";
pub const AFFECTED_UNMODELED_CSMR: &str = "affected_unmodeled.csmr";
pub const AFFECTED_UNMODELED_CSMR_PAF: &str =
    "affected_unmodeled.csmr.population_attributable_fraction";

const ALL_CAUSE_MORTALITY_KEY: &str = "cause.all_causes.cause_specific_mortality_rate";
const LIFE_EXPECTANCY_KEY: &str = "population.theoretical_minimum_risk_life_expectancy";

pub struct Mortality {
    view: PopulationView,
    stream: RandomStream,
    life_expectancy: LookupTable,
    mortality_rate: ValueHandle,
    hazard: ValueHandle,
    hazard_paf: ValueHandle,
}

impl Mortality {
    pub fn setup(builder: &mut ModelBuilder<'_>) -> Result<Self, SimError> {
        let view = builder.declare_view(
            "mortality",
            &[
                (ALIVE, ColumnKind::Category),
                (EXIT_TIME, ColumnKind::Time),
                (CAUSE_OF_DEATH, ColumnKind::Category),
                (YEARS_OF_LIFE_LOST, ColumnKind::Float),
            ],
            &[AGE, SEX],
        )?;
        let stream = builder.stream("mortality_handler")?;
        let acmr = builder.lookup(ALL_CAUSE_MORTALITY_KEY)?;
        let life_expectancy = builder.lookup(LIFE_EXPECTANCY_KEY)?;
        let unmodeled = Arc::new(
            builder
                .params()
                .unmodeled_affected_causes
                .iter()
                .map(|cause| builder.lookup(&format!("cause.{cause}.cause_specific_mortality_rate")))
                .collect::<Result<Vec<_>, _>>()?,
        );

        let unmodeled_view = view.clone();
        let unmodeled_tables = Arc::clone(&unmodeled);
        let rate_view = view.clone();

        let values = builder.values();
        let csmr = values.register_value_producer(CAUSE_SPECIFIC_MORTALITY_RATE, ValueProducer::zeros())?;
        let unmodeled_paf = values.register_value_producer(
            AFFECTED_UNMODELED_CSMR_PAF,
            ValueProducer::union_of_contributions(),
        )?;
        let unmodeled_csmr = values.register_value_producer(
            AFFECTED_UNMODELED_CSMR,
            ValueProducer::new(move |ctx, index| {
                let raw = raw_unmodeled_csmr(&unmodeled_tables, ctx, &unmodeled_view, index)?;
                let paf = ctx
                    .values
                    .call(unmodeled_paf, ctx, index)?
                    .into_scalar(AFFECTED_UNMODELED_CSMR_PAF)?;
                Ok(Signal::Scalar(
                    raw.iter().zip(paf).map(|(r, p)| r * (1.0 - p)).collect(),
                ))
            }),
        )?;
        let mortality_rate = values.register_value_producer(
            MORTALITY_RATE,
            ValueProducer::new(move |ctx, index| {
                let all_causes = acmr.evaluate(ctx, &rate_view, index)?;
                let modeled = ctx
                    .values
                    .call(csmr, ctx, index)?
                    .into_scalar(CAUSE_SPECIFIC_MORTALITY_RATE)?;
                let raw = raw_unmodeled_csmr(&unmodeled, ctx, &rate_view, index)?;
                let adjusted = ctx
                    .values
                    .call(unmodeled_csmr, ctx, index)?
                    .into_scalar(AFFECTED_UNMODELED_CSMR)?;
                let other_causes = (0..index.len())
                    .map(|i| all_causes[i] - modeled[i] - raw[i] + adjusted[i])
                    .collect();
                Ok(Signal::Frame(
                    ValueFrame::new().with_column(OTHER_CAUSES, other_causes),
                ))
            }),
        )?;
        let hazard_paf =
            values.register_value_producer(MORTALITY_HAZARD_PAF, ValueProducer::union_of_contributions())?;
        let hazard = values.register_value_producer(
            MORTALITY_HAZARD,
            ValueProducer::new(move |ctx, index| {
                let rates = ctx
                    .values
                    .call(mortality_rate, ctx, index)?
                    .into_frame(MORTALITY_RATE)?;
                let paf = ctx
                    .values
                    .call(hazard_paf, ctx, index)?
                    .into_scalar(MORTALITY_HAZARD_PAF)?;
                Ok(Signal::Scalar(
                    rates
                        .row_sums()
                        .into_iter()
                        .zip(paf)
                        .map(|(rate, p)| rate * (1.0 - p))
                        .collect(),
                ))
            }),
        )?;

        Ok(Self {
            view,
            stream,
            life_expectancy,
            mortality_rate,
            hazard,
            hazard_paf,
        })
    }

    pub fn initialize(
        &self,
        population: &mut PopulationTable,
        index: &[SimulantId],
    ) -> Result<(), SimError> {
        population.update(
            &self.view,
            PopulationUpdate::new(index.to_vec())
                .fill_category(ALIVE, AliveStatus::Alive.as_str())
                .fill_time(EXIT_TIME, None)
                .fill_category(CAUSE_OF_DEATH, NOT_DEAD)
                .fill_float(YEARS_OF_LIFE_LOST, 0.0),
        )?;
        Ok(())
    }

    /// Draws deaths among the living and attributes a cause to each.
    pub fn step(
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
        let hazard = values
            .call(self.hazard, &ctx, &alive)?
            .into_scalar(MORTALITY_HAZARD)?;
        let stream = self.stream.at(&time);
        let dying = stream
            .filter_for_rate(&alive, &hazard, time.step_years, Some("death"));
        if dying.is_empty() {
            return Ok(());
        }

        let rates = values
            .call(self.mortality_rate, &ctx, &dying)?
            .into_frame(MORTALITY_RATE)?;
        let paf = values
            .call(self.hazard_paf, &ctx, &dying)?
            .into_scalar(MORTALITY_HAZARD_PAF)?;
        let weights = attribution_weights(&rates, &paf);
        let picks = stream.choice_rows(
            &dying,
            rates.names().len(),
            &weights,
            Some("cause_of_death"),
        )?;
        let causes: Vec<String> = picks.iter().map(|&k| rates.names()[k].clone()).collect();
        let years_lost = self.life_expectancy.evaluate(&ctx, &self.view, &dying)?;

        debug!(deaths = dying.len(), alive = alive.len(), "mortality");
        for (cause, yll) in causes.iter().zip(&years_lost) {
            telemetry.increment(format!("death_due_to_{cause}"), 1.0);
            telemetry.increment(YEARS_OF_LIFE_LOST, *yll);
        }
        population.update(
            &self.view,
            PopulationUpdate::new(dying)
                .fill_category(ALIVE, AliveStatus::Dead.as_str())
                .fill_time(EXIT_TIME, Some(time.event_time))
                .categories(CAUSE_OF_DEATH, causes)
                .floats(YEARS_OF_LIFE_LOST, years_lost),
        )?;
        Ok(())
    }
}

/// Each cause's share of the hazard, `rate * (1 - paf) / hazard`, one row per simulant.
pub fn attribution_weights(rates: &ValueFrame, hazard_paf: &[f64]) -> Vec<Vec<f64>> {
    (0..rates.len())
        .map(|i| {
            let row: Vec<f64> = rates
                .row(i)
                .into_iter()
                .map(|rate| rate * (1.0 - hazard_paf[i]))
                .collect();
            let hazard: f64 = row.iter().sum();
            row.into_iter().map(|w| w / hazard).collect()
        })
        .collect()
}

fn raw_unmodeled_csmr(
    tables: &[LookupTable],
    ctx: &PipelineContext<'_>,
    view: &PopulationView,
    index: &[SimulantId],
) -> Result<Vec<f64>, PipelineError> {
    let mut total = vec![0.0; index.len()];
    for table in tables {
        for (t, v) in total.iter_mut().zip(table.evaluate(ctx, view, index)?) {
            *t += v;
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribution_weights_are_hazard_shares() {
        let rates = ValueFrame::new()
            .with_column(OTHER_CAUSES, vec![1.0, 0.0])
            .with_column("measles", vec![3.0, 2.0]);
        let weights = attribution_weights(&rates, &[0.5, 0.0]);
        assert_eq!(weights[0], vec![0.25, 0.75]);
        assert_eq!(weights[1], vec![0.0, 1.0]);
        for row in weights {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
    }
}
