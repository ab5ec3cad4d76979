//! Low birth weight and short gestation (LBWSG).
//!
//! Newborns draw a category from the birth-prevalence distribution and then a continuous
//! (gestation, birth weight) point inside it. Interventions shift the continuous exposure
//! through modifiers on [EXPOSURE]; its post-processor maps the shifted point back to a category
//! so per-category relative risks keep applying.

mod distribution;
mod effect;
mod grid;

use std::sync::Arc;

use tracing::debug;

pub use distribution::LbwsgDistribution;
pub use effect::{LbwsgRiskEffect, RELATIVE_RISK_KEY, PAF_KEY};
pub use grid::{
    natural_cmp, parse_category_name, LbwsgCategory, LbwsgGrid, BOUNDARY_EPSILON,
    MISSING_CATEGORY, MISSING_CATEGORY_NAME,
};

use crate::clock::SimTime;
use crate::error::{PipelineError, SimError};
use crate::population::{
    ColumnKind, PopulationTable, PopulationUpdate, PopulationView, SimulantId, AGE, SEX,
};
use crate::randomness::RandomStream;
use crate::scenario::ModelBuilder;
use crate::stats::percentile_ranks;
use crate::telemetry::SimTelemetry;
use crate::values::{PipelineContext, Signal, ValueFrame, ValueHandle, ValueProducer, ValueRegistry};

pub const BIRTH_WEIGHT: &str = "birth_weight";
pub const GESTATION_TIME: &str = "gestation_time";
pub const BIRTH_WEIGHT_PERCENTILE: &str = "birth_weight_percentile";

pub const RAW_EXPOSURE: &str = "low_birth_weight_and_short_gestation.raw_exposure";
pub const EXPOSURE: &str = "low_birth_weight_and_short_gestation.exposure";

const CATEGORIES_KEY: &str = "risk_factor.low_birth_weight_and_short_gestation.categories";
const EXPOSURE_KEY: &str = "risk_factor.low_birth_weight_and_short_gestation.exposure";

pub struct LbwsgRisk {
    view: PopulationView,
    stream: RandomStream,
    distribution: LbwsgDistribution,
    grid: Arc<LbwsgGrid>,
    exposure: ValueHandle,
    raw_exposure: ValueHandle,
}

impl LbwsgRisk {
    pub fn setup(builder: &mut ModelBuilder<'_>) -> Result<Self, SimError> {
        let grid = Arc::new(LbwsgGrid::from_descriptions(
            builder.data().categories(CATEGORIES_KEY)?,
        )?);
        let distribution = LbwsgDistribution::new(
            EXPOSURE_KEY,
            Arc::clone(&grid),
            builder.data().table(EXPOSURE_KEY)?,
            builder.input_draw(),
        )?;
        let floor = builder
            .params()
            .lbwsg
            .birth_weight_floor
            .unwrap_or_else(|| grid.min_birth_weight());

        let view = builder.declare_view(
            "low_birth_weight_and_short_gestation",
            &[
                (BIRTH_WEIGHT, ColumnKind::Float),
                (GESTATION_TIME, ColumnKind::Float),
                (BIRTH_WEIGHT_PERCENTILE, ColumnKind::Float),
            ],
            &[AGE, SEX],
        )?;
        let stream = builder.stream("low_birth_weight_and_short_gestation.exposure")?;

        let source_view = view.clone();
        let raw_exposure = builder.values().register_value_producer(
            RAW_EXPOSURE,
            ValueProducer::new(move |ctx, index| {
                let birth_weight = ctx.population.floats(&source_view, BIRTH_WEIGHT)?;
                let gestation = ctx.population.floats(&source_view, GESTATION_TIME)?;
                Ok(Signal::Frame(
                    ValueFrame::new()
                        .with_column(BIRTH_WEIGHT, index.iter().map(|&i| birth_weight[i]).collect())
                        .with_column(GESTATION_TIME, index.iter().map(|&i| gestation[i]).collect()),
                ))
            }),
        )?;
        let categorize_grid = Arc::clone(&grid);
        let exposure = builder.values().register_value_producer(
            EXPOSURE,
            ValueProducer::new(move |ctx, index| ctx.values.call(raw_exposure, ctx, index))
                .post_processor(move |_, _, value| {
                    let frame = value.into_frame(EXPOSURE)?;
                    to_categories(&categorize_grid, &frame, floor).map(Signal::Categories)
                }),
        )?;

        Ok(Self {
            view,
            stream,
            distribution,
            grid,
            exposure,
            raw_exposure,
        })
    }

    pub fn grid(&self) -> &Arc<LbwsgGrid> {
        &self.grid
    }

    pub fn distribution(&self) -> &LbwsgDistribution {
        &self.distribution
    }

    pub fn exposure(&self) -> ValueHandle {
        self.exposure
    }

    pub fn raw_exposure(&self) -> ValueHandle {
        self.raw_exposure
    }

    /// Samples categories and continuous exposures for a new cohort, then ranks birth weights.
    pub fn initialize(
        &self,
        population: &mut PopulationTable,
        values: &ValueRegistry,
        telemetry: &SimTelemetry,
        time: SimTime,
        index: &[SimulantId],
    ) -> Result<(), SimError> {
        let ctx = PipelineContext::new(population, values, time, telemetry);
        let categories = self
            .distribution
            .sample_categories(&ctx, &self.view, index, &self.stream)?;
        let (gestation, birth_weight) =
            self.distribution
                .sample_continuous(&categories, index, &self.stream);
        let percentiles = percentile_ranks(&birth_weight);
        population.update(
            &self.view,
            PopulationUpdate::new(index.to_vec())
                .floats(BIRTH_WEIGHT, birth_weight)
                .floats(GESTATION_TIME, gestation)
                .floats(BIRTH_WEIGHT_PERCENTILE, percentiles),
        )?;
        Ok(())
    }
}

fn to_categories(
    grid: &LbwsgGrid,
    frame: &ValueFrame,
    floor: f64,
) -> Result<Vec<String>, PipelineError> {
    let gestation = frame.column(GESTATION_TIME)?;
    let birth_weight = frame.column(BIRTH_WEIGHT)?;
    let mut corrected = 0usize;
    let mut out = Vec::with_capacity(gestation.len());
    for (&gt, &bw) in gestation.iter().zip(birth_weight) {
        if grid.locate(gt, bw).is_none() {
            corrected += 1;
        }
        let position = grid.categorize(gt, bw, floor)?;
        out.push(grid.categories()[position].id.clone());
    }
    if corrected > 0 {
        debug!(corrected, total = out.len(), "moved LBWSG exposures back inside the grid");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::lbwsg_category_descriptions;

    #[test]
    fn sampled_points_round_trip_to_their_category() {
        let grid = LbwsgGrid::from_descriptions(&lbwsg_category_descriptions()).expect("grid");
        let mut gestation = Vec::new();
        let mut birth_weight = Vec::new();
        let mut expected = Vec::new();
        for category in grid.categories() {
            for u in [0.0, 0.37, 0.999] {
                gestation.push(category.gestation.start + u * category.gestation.width());
                birth_weight.push(category.birth_weight.start + u * category.birth_weight.width());
                expected.push(category.id.clone());
            }
        }
        let frame = ValueFrame::new()
            .with_column(BIRTH_WEIGHT, birth_weight)
            .with_column(GESTATION_TIME, gestation);
        let categories = to_categories(&grid, &frame, grid.min_birth_weight()).expect("categories");
        assert_eq!(categories, expected);
    }
}
