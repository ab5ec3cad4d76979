use std::collections::BTreeSet;

use bevy_ecs::prelude::{Resource, World};
use tracing::info;

use crate::clock::SimulationClock;
use crate::cohort::BasePopulation;
use crate::correlated_risk::CorrelatedRisk;
use crate::data::DataStore;
use crate::disability::Disability;
use crate::disease::{disease_definition, DiseaseModel, RiskAttributableDisease};
use crate::error::{DataError, SimError, WiringError};
use crate::lbwsg::{LbwsgRisk, LbwsgRiskEffect};
use crate::lookup::LookupTable;
use crate::mortality::Mortality;
use crate::nutrition::{MaternalMalnutrition, Supplementation};
use crate::population::{ColumnKind, PopulationSchema, PopulationTable, PopulationView};
use crate::randomness::{RandomStream, RandomnessService};
use crate::scenario::params::ModelParams;
use crate::systems::{NewCohort, SimulationFault};
use crate::telemetry::SimTelemetry;
use crate::values::{Signal, ValueProducer, ValueRegistry, ValuesBuilder};

/// Name of the pipeline observers read run-level measures from.
pub const METRICS: &str = "metrics";

/// Wiring-time state shared by every component while the model is assembled.
pub struct ModelBuilder<'a> {
    params: &'a ModelParams,
    data: &'a DataStore,
    schema: PopulationSchema,
    values: ValuesBuilder,
    randomness: RandomnessService,
    streams: BTreeSet<String>,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(params: &'a ModelParams, data: &'a DataStore) -> Self {
        Self {
            params,
            data,
            schema: PopulationSchema::new(),
            values: ValuesBuilder::new(),
            randomness: RandomnessService::new(params.seed, params.input_draw),
            streams: BTreeSet::new(),
        }
    }

    pub fn params(&self) -> &'a ModelParams {
        self.params
    }

    pub fn data(&self) -> &'a DataStore {
        self.data
    }

    pub fn input_draw(&self) -> u32 {
        self.params.input_draw
    }

    pub fn randomness(&self) -> &RandomnessService {
        &self.randomness
    }

    pub fn declare_view(
        &mut self,
        component: &str,
        creates: &[(&str, ColumnKind)],
        reads: &[&str],
    ) -> Result<PopulationView, WiringError> {
        self.schema.declare_view(component, creates, reads)
    }

    pub fn values(&mut self) -> &mut ValuesBuilder {
        &mut self.values
    }

    /// Registers a randomness stream. Each name may be claimed by one component only.
    pub fn stream(&mut self, name: &str) -> Result<RandomStream, WiringError> {
        if !self.streams.insert(name.to_string()) {
            return Err(WiringError::DuplicateStream {
                name: name.to_string(),
            });
        }
        Ok(self.randomness.stream(name))
    }

    /// Builds the lookup table stored under `key` for the configured draw.
    pub fn lookup(&self, key: &str) -> Result<LookupTable, DataError> {
        LookupTable::build(key, self.data.table(key)?, self.params.input_draw)
    }

    /// Like [Self::lookup], but a key absent from the store is `None` rather than an error.
    pub fn optional_lookup(&self, key: &str) -> Result<Option<LookupTable>, DataError> {
        if self.data.has_table(key) {
            self.lookup(key).map(Some)
        } else {
            Ok(None)
        }
    }

    fn finish(self) -> Result<(PopulationTable, ValueRegistry, RandomnessService), WiringError> {
        let table = self.schema.finalize()?;
        let registry = self.values.finalize()?;
        Ok((table, registry, self.randomness))
    }
}

/// Every wired component, in the order their initializers run.
#[derive(Resource)]
pub struct ModelComponents {
    pub population: BasePopulation,
    pub mortality: Mortality,
    pub lbwsg: LbwsgRisk,
    pub lbwsg_effects: Vec<LbwsgRiskEffect>,
    pub maternal_malnutrition: MaternalMalnutrition,
    pub supplementation: Supplementation,
    pub correlated_risks: Vec<CorrelatedRisk>,
    pub diseases: Vec<DiseaseModel>,
    pub risk_attributable: Vec<RiskAttributableDisease>,
    pub disability: Disability,
}

/// Wires every component for `params` against `data` and inserts the resulting resources into
/// `world`. Call [crate::runner::initialize_simulation] afterwards to schedule the run.
pub fn build_model(world: &mut World, params: &ModelParams, data: &DataStore) -> Result<(), SimError> {
    params.validate()?;
    let mut builder = ModelBuilder::new(params, data);

    let population = BasePopulation::setup(&mut builder)?;
    let mortality = Mortality::setup(&mut builder)?;
    let lbwsg = LbwsgRisk::setup(&mut builder)?;
    let maternal_malnutrition = MaternalMalnutrition::setup(&mut builder, &lbwsg)?;
    let supplementation = Supplementation::setup(&mut builder)?;
    let correlated_risks = params
        .correlated_risks
        .iter()
        .map(|risk| CorrelatedRisk::setup(&mut builder, risk))
        .collect::<Result<Vec<_>, _>>()?;
    let diseases = params
        .diseases
        .iter()
        .map(|spec| DiseaseModel::setup(&mut builder, disease_definition(spec)?))
        .collect::<Result<Vec<_>, _>>()?;
    let risk_attributable = params
        .risk_attributable_diseases
        .iter()
        .map(|spec| RiskAttributableDisease::setup(&mut builder, spec))
        .collect::<Result<Vec<_>, _>>()?;
    let lbwsg_effects = params
        .lbwsg
        .affected_targets
        .iter()
        .map(|target| LbwsgRiskEffect::setup(&mut builder, &lbwsg, target))
        .collect::<Result<Vec<_>, _>>()?;
    let disability = Disability::setup(&mut builder)?;
    builder.values().register_value_producer(
        METRICS,
        ValueProducer::new(|ctx, _| Ok(Signal::Metrics(ctx.telemetry.counters().clone()))),
    )?;

    let (table, registry, randomness) = builder.finish()?;
    info!(
        population_size = params.population_size,
        seed = params.seed,
        input_draw = params.input_draw,
        scenario = %params.scenario,
        diseases = diseases.len(),
        columns = table.column_names().count(),
        pipelines = registry.names().count(),
        "model wired"
    );

    world.insert_resource(SimulationClock::new(
        params.start_year,
        params.step_days,
        params.duration_days,
    ));
    world.insert_resource(table);
    world.insert_resource(registry);
    world.insert_resource(randomness);
    world.insert_resource(ModelComponents {
        population,
        mortality,
        lbwsg,
        lbwsg_effects,
        maternal_malnutrition,
        supplementation,
        correlated_risks,
        diseases,
        risk_attributable,
        disability,
    });
    world.insert_resource(params.clone());
    world.insert_resource(SimTelemetry::default());
    world.insert_resource(SimulationFault::default());
    world.insert_resource(NewCohort::default());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{DiseaseKind, Scenario};
    use crate::test_helpers::synthetic_store;

    #[test]
    fn builder_rejects_duplicate_streams() {
        let params = ModelParams::default();
        let store = DataStore::new();
        let mut builder = ModelBuilder::new(&params, &store);
        builder.stream("mortality_handler").expect("first");
        assert_eq!(
            builder.stream("mortality_handler").unwrap_err(),
            WiringError::DuplicateStream {
                name: "mortality_handler".to_string()
            }
        );
    }

    #[test]
    fn build_model_inserts_every_resource() {
        let params = ModelParams::default()
            .with_population_size(10)
            .with_scenario(Scenario::Mmn)
            .with_disease("measles", DiseaseKind::Sis);
        let mut world = World::new();
        build_model(&mut world, &params, &synthetic_store()).expect("model");

        assert_eq!(world.resource::<PopulationTable>().size(), 0);
        assert!(world.contains_resource::<ValueRegistry>());
        assert!(world.contains_resource::<ModelComponents>());
        assert_eq!(world.resource::<ModelParams>().scenario, Scenario::Mmn);
        let registry = world.resource::<ValueRegistry>();
        for name in [
            "mortality_rate",
            "all_causes.mortality_hazard",
            "low_birth_weight_and_short_gestation.exposure",
            "measles.incidence_rate",
            METRICS,
        ] {
            assert!(registry.handle(name).is_some(), "missing pipeline {name}");
        }
    }

    #[test]
    fn missing_data_fails_before_any_simulant_exists() {
        let params = ModelParams::default().with_disease("measles", DiseaseKind::Sis);
        let mut store = synthetic_store();
        store.insert_table("cause.measles.incidence_rate", Default::default());
        let mut world = World::new();
        let err = build_model(&mut world, &params, &store).unwrap_err();
        assert!(
            matches!(err, SimError::Data(DataError::MissingDraw { ref key, .. }) if key == "cause.measles.incidence_rate"),
            "{err:?}"
        );
        assert!(!world.contains_resource::<PopulationTable>());
    }
}
