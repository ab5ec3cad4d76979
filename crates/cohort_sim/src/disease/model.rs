use std::collections::BTreeMap;

use tracing::debug;

use crate::clock::SimTime;
use crate::disease::state::{DiseaseDefinition, StateKind, Trigger};
use crate::disease::{register_cause_effects, register_rate};
use crate::error::SimError;
use crate::lookup::LookupTable;
use crate::population::{
    ColumnKind, PopulationTable, PopulationUpdate, PopulationView, SimulantId, AGE, ALIVE, SEX,
};
use crate::randomness::{rate_to_probability, RandomStream};
use crate::scenario::ModelBuilder;
use crate::telemetry::SimTelemetry;
use crate::values::{PipelineContext, ValueHandle, ValueRegistry};

/// One cause's state machine over the population table.
///
/// Transitions are drawn from the state recorded in `previous_<cause>` at the start of the step,
/// so a simulant makes at most one move per step.
pub struct DiseaseModel {
    definition: DiseaseDefinition,
    view: PopulationView,
    stream: RandomStream,
    state_column: String,
    previous_column: String,
    birth_prevalence: Option<LookupTable>,
    rates: BTreeMap<String, ValueHandle>,
}

impl DiseaseModel {
    pub fn setup(
        builder: &mut ModelBuilder<'_>,
        definition: DiseaseDefinition,
    ) -> Result<Self, SimError> {
        let cause = definition.cause.clone();
        let state_column = cause.clone();
        let previous_column = format!("previous_{cause}");
        let event_time_columns: Vec<String> = definition
            .states
            .iter()
            .map(|s| s.event_time_column())
            .collect();
        let mut creates = vec![
            (state_column.as_str(), ColumnKind::Category),
            (previous_column.as_str(), ColumnKind::Category),
        ];
        creates.extend(event_time_columns.iter().map(|c| (c.as_str(), ColumnKind::Time)));
        let view = builder.declare_view(&format!("disease_model.{cause}"), &creates, &[ALIVE, AGE, SEX])?;
        let stream = builder.stream(&cause)?;

        let mut rates = BTreeMap::new();
        for measure in definition.rate_measures() {
            let table = builder.lookup(&format!("cause.{cause}.{measure}"))?;
            let handle = register_rate(builder, &format!("{cause}.{measure}"), table, &view)?;
            rates.insert(measure, handle);
        }
        let birth_prevalence = builder.optional_lookup(&format!("cause.{cause}.birth_prevalence"))?;
        let with_condition = definition
            .state(StateKind::WithCondition)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| cause.clone());
        register_cause_effects(builder, &cause, &view, &state_column, &with_condition)?;

        Ok(Self {
            definition,
            view,
            stream,
            state_column,
            previous_column,
            birth_prevalence,
            rates,
        })
    }

    pub fn cause(&self) -> &str {
        &self.definition.cause
    }

    pub fn definition(&self) -> &DiseaseDefinition {
        &self.definition
    }

    /// Newborns start susceptible unless drawn into the condition by the birth prevalence.
    pub fn initialize(
        &self,
        population: &mut PopulationTable,
        values: &ValueRegistry,
        telemetry: &SimTelemetry,
        time: SimTime,
        index: &[SimulantId],
    ) -> Result<(), SimError> {
        let susceptible = self.definition.susceptible();
        let mut init = PopulationUpdate::new(index.to_vec());
        for state in &self.definition.states {
            init = init.fill_time(&state.event_time_column(), None);
        }
        population.update(
            &self.view,
            init.fill_category(&self.state_column, &susceptible.name)
                .fill_category(&self.previous_column, &susceptible.name),
        )?;

        let mut prevalent_count = 0;
        if let (Some(prevalence), Some(condition)) = (
            &self.birth_prevalence,
            self.definition.state(StateKind::WithCondition),
        ) {
            let ctx = PipelineContext::new(population, values, time, telemetry);
            let p = prevalence.evaluate(&ctx, &self.view, index)?;
            let prevalent = self
                .stream
                .filter_for_probability(index, &p, Some("initial_state"));
            prevalent_count = prevalent.len();
            if !prevalent.is_empty() {
                population.update(
                    &self.view,
                    PopulationUpdate::new(prevalent)
                        .fill_category(&self.state_column, &condition.name)
                        .fill_category(&self.previous_column, &condition.name)
                        .fill_time(&condition.event_time_column(), Some(time.now)),
                )?;
            }
        }
        debug!(
            cause = %self.cause(),
            simulants = index.len(),
            prevalent = prevalent_count,
            "disease states initialized"
        );
        Ok(())
    }

    /// Records the step-start state and accrues person-time in it.
    pub fn prepare(
        &self,
        population: &mut PopulationTable,
        telemetry: &mut SimTelemetry,
        time: SimTime,
    ) -> Result<(), SimError> {
        let alive = population.alive_index(&self.view)?;
        if alive.is_empty() {
            return Ok(());
        }
        let states = population.categories(&self.view, &self.state_column)?;
        let current: Vec<String> = alive.iter().map(|&i| states.get(i).to_string()).collect();
        for state in &self.definition.states {
            let count = current.iter().filter(|s| **s == state.name).count();
            telemetry.increment(
                format!("{}.{}.person_time", self.cause(), state.name),
                count as f64 * time.step_years,
            );
        }
        population.update(
            &self.view,
            PopulationUpdate::new(alive).categories(&self.previous_column, current),
        )?;
        Ok(())
    }

    /// Draws at most one transition per living simulant out of its step-start state.
    pub fn step(
        &self,
        population: &mut PopulationTable,
        values: &ValueRegistry,
        telemetry: &mut SimTelemetry,
        time: SimTime,
    ) -> Result<(), SimError> {
        let alive = population.alive_index(&self.view)?;
        let previous = population.categories(&self.view, &self.previous_column)?;
        let members: Vec<Vec<SimulantId>> = self
            .definition
            .states
            .iter()
            .map(|state| {
                alive
                    .iter()
                    .copied()
                    .filter(|&i| previous.get(i) == state.name)
                    .collect()
            })
            .collect();

        let stream = self.stream.at(&time);
        let mut moves: Vec<(usize, usize, Vec<SimulantId>)> = Vec::new();
        {
            let ctx = PipelineContext::new(population, values, time, telemetry);
            for (from, (state, index)) in self.definition.states.iter().zip(&members).enumerate() {
                if state.transitions.is_empty() || index.is_empty() {
                    continue;
                }
                let mut probabilities = Vec::with_capacity(state.transitions.len());
                for transition in &state.transitions {
                    probabilities.push(self.transition_probability(
                        &ctx,
                        &transition.trigger,
                        &state.event_time_column(),
                        index,
                    )?);
                }
                let weights: Vec<Vec<f64>> = (0..index.len())
                    .map(|i| {
                        let mut row: Vec<f64> = probabilities.iter().map(|p| p[i]).collect();
                        let total: f64 = row.iter().sum();
                        if total > 1.0 {
                            row.iter_mut().for_each(|p| *p /= total);
                        }
                        let stay = (1.0 - row.iter().sum::<f64>()).max(0.0);
                        row.insert(0, stay);
                        row
                    })
                    .collect();
                let picks = stream.choice_rows(
                    index,
                    state.transitions.len() + 1,
                    &weights,
                    Some(&state.name),
                )?;
                for (k, transition) in state.transitions.iter().enumerate() {
                    let movers: Vec<SimulantId> = index
                        .iter()
                        .zip(&picks)
                        .filter(|(_, pick)| **pick == k + 1)
                        .map(|(&id, _)| id)
                        .collect();
                    if !movers.is_empty() {
                        moves.push((from, transition.to, movers));
                    }
                }
            }
        }

        for (from, to, movers) in moves {
            let from = &self.definition.states[from];
            let to = &self.definition.states[to];
            debug!(cause = %self.cause(), from = %from.name, to = %to.name, count = movers.len(), "transition");
            telemetry.increment(
                format!("{}.{}_to_{}.event_count", self.cause(), from.name, to.name),
                movers.len() as f64,
            );
            population.update(
                &self.view,
                PopulationUpdate::new(movers)
                    .fill_category(&self.state_column, &to.name)
                    .fill_time(&to.event_time_column(), Some(time.event_time)),
            )?;
        }
        Ok(())
    }

    fn transition_probability(
        &self,
        ctx: &PipelineContext<'_>,
        trigger: &Trigger,
        entered_column: &str,
        index: &[SimulantId],
    ) -> Result<Vec<f64>, SimError> {
        match trigger {
            Trigger::Rate { measure } => {
                let name = format!("{}.{measure}", self.cause());
                let handle = self.rates[measure];
                let rates = ctx.values.call(handle, ctx, index)?.into_scalar(&name)?;
                Ok(rates
                    .into_iter()
                    .map(|r| rate_to_probability(r, ctx.time.step_years))
                    .collect())
            }
            Trigger::Dwell { duration_days } => {
                let entered = ctx.population.times(&self.view, entered_column)?;
                Ok(index
                    .iter()
                    .map(|&i| match entered[i] {
                        Some(t) if ctx.time.event_time - t >= *duration_days => 1.0,
                        _ => 0.0,
                    })
                    .collect())
            }
        }
    }

    pub fn view(&self) -> &PopulationView {
        &self.view
    }
}
