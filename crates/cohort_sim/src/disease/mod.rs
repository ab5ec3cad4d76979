//! Disease state machines and the mortality and disability they contribute.

mod model;
mod risk_attributable;
mod state;

pub use model::DiseaseModel;
pub use risk_attributable::RiskAttributableDisease;
pub use state::{
    disease_definition, si, sir, sir_fixed_duration, sis, sis_fixed_duration, state_name,
    DiseaseDefinition, DiseaseState, StateKind, Transition, Trigger, INCIDENCE_RATE,
    REMISSION_RATE,
};

use crate::disability::DISABILITY_WEIGHT;
use crate::error::SimError;
use crate::lookup::LookupTable;
use crate::mortality::{CAUSE_SPECIFIC_MORTALITY_RATE, MORTALITY_RATE};
use crate::population::PopulationView;
use crate::scenario::ModelBuilder;
use crate::values::{Signal, ValueHandle, ValueProducer};

/// Registers `name` as `table * (1 - paf)`, where the attributable fraction is the union of
/// whatever risk effects contribute to `<name>.population_attributable_fraction`.
fn register_rate(
    builder: &mut ModelBuilder<'_>,
    name: &str,
    table: LookupTable,
    view: &PopulationView,
) -> Result<ValueHandle, SimError> {
    let paf_name = format!("{name}.population_attributable_fraction");
    let paf = builder
        .values()
        .register_value_producer(&paf_name, ValueProducer::union_of_contributions())?;
    let view = view.clone();
    let handle = builder.values().register_value_producer(
        name,
        ValueProducer::new(move |ctx, index| {
            let rate = table.evaluate(ctx, &view, index)?;
            let paf = ctx.values.call(paf, ctx, index)?.into_scalar(&paf_name)?;
            Ok(Signal::Scalar(
                rate.iter().zip(paf).map(|(r, p)| r * (1.0 - p)).collect(),
            ))
        }),
    )?;
    Ok(handle)
}

/// Wires the optional cause-specific mortality, excess mortality and disability weight of
/// `cause`. The last two apply only to simulants whose `state_column` is `with_condition`.
fn register_cause_effects(
    builder: &mut ModelBuilder<'_>,
    cause: &str,
    view: &PopulationView,
    state_column: &str,
    with_condition: &str,
) -> Result<(), SimError> {
    if let Some(csmr) = builder.optional_lookup(&format!("cause.{cause}.cause_specific_mortality_rate"))? {
        let csmr_view = view.clone();
        builder
            .values()
            .register_value_modifier(CAUSE_SPECIFIC_MORTALITY_RATE, move |ctx, index, value| {
                let total = value.into_scalar(CAUSE_SPECIFIC_MORTALITY_RATE)?;
                let own = csmr.evaluate(ctx, &csmr_view, index)?;
                Ok(Signal::Scalar(total.iter().zip(own).map(|(t, c)| t + c).collect()))
            });
    }

    if let Some(emr) = builder.optional_lookup(&format!("cause.{cause}.excess_mortality_rate"))? {
        let emr_name = format!("{cause}.excess_mortality_rate");
        let emr = register_rate(builder, &emr_name, emr, view)?;
        let emr_view = view.clone();
        let column = state_column.to_string();
        let condition = with_condition.to_string();
        let rate_column = cause.to_string();
        builder
            .values()
            .register_value_modifier(MORTALITY_RATE, move |ctx, index, value| {
                let mut frame = value.into_frame(MORTALITY_RATE)?;
                let rates = ctx.values.call(emr, ctx, index)?.into_scalar(&emr_name)?;
                let states = ctx.population.categories(&emr_view, &column)?;
                frame.push(
                    &rate_column,
                    index
                        .iter()
                        .zip(rates)
                        .map(|(&i, r)| if states.get(i) == condition { r } else { 0.0 })
                        .collect(),
                );
                Ok(Signal::Frame(frame))
            });
    }

    if let Some(weight) = builder.optional_lookup(&format!("cause.{cause}.disability_weight"))? {
        let weight_view = view.clone();
        let column = state_column.to_string();
        let condition = with_condition.to_string();
        builder
            .values()
            .register_value_modifier(DISABILITY_WEIGHT, move |ctx, index, _| {
                let weights = weight.evaluate(ctx, &weight_view, index)?;
                let states = ctx.population.categories(&weight_view, &column)?;
                Ok(Signal::Scalar(
                    index
                        .iter()
                        .zip(weights)
                        .map(|(&i, w)| if states.get(i) == condition { w } else { 0.0 })
                        .collect(),
                ))
            });
    }
    Ok(())
}
