use std::sync::Arc;

use crate::data::{DrawRow, DrawTable};
use crate::error::{DataError, SimError};
use crate::lbwsg::grid::{LbwsgGrid, MISSING_CATEGORY};
use crate::lookup::LookupTable;
use crate::population::{PopulationView, SimulantId};
use crate::randomness::RandomStream;
use crate::values::PipelineContext;

const NORMALIZATION_TOLERANCE: f64 = 1e-6;

/// Categorical birth prevalence over the grid, and sampling of continuous exposures from it.
pub struct LbwsgDistribution {
    grid: Arc<LbwsgGrid>,
    exposure: LookupTable,
}

impl LbwsgDistribution {
    /// Builds the exposure lookup for `draw`. Strata without a row for the missing category get
    /// one with prevalence 0. Every stratum must sum to 1.
    pub fn new(
        key: &str,
        grid: Arc<LbwsgGrid>,
        table: &DrawTable,
        draw: u32,
    ) -> Result<Self, DataError> {
        let exposure = LookupTable::build_categorical(
            key,
            &fill_missing_category(table, draw, |_| Ok(0.0))?,
            draw,
            &grid.ids(),
        )?;
        for (stratum, row) in exposure.strata() {
            let total: f64 = row.iter().sum();
            if (total - 1.0).abs() > NORMALIZATION_TOLERANCE {
                return Err(DataError::ExposureNotNormalized {
                    key: key.to_string(),
                    stratum,
                    total,
                });
            }
        }
        Ok(Self { grid, exposure })
    }

    pub fn grid(&self) -> &LbwsgGrid {
        &self.grid
    }

    pub fn exposure(&self) -> &LookupTable {
        &self.exposure
    }

    /// Draws one category position per simulant from its stratum's prevalence vector.
    pub fn sample_categories(
        &self,
        ctx: &PipelineContext<'_>,
        view: &PopulationView,
        index: &[SimulantId],
        stream: &RandomStream,
    ) -> Result<Vec<usize>, SimError> {
        let frame = self.exposure.evaluate_frame(ctx, view, index)?;
        let weights: Vec<Vec<f64>> = (0..index.len()).map(|i| frame.row(i)).collect();
        Ok(stream.choice_rows(index, self.grid.len(), &weights, Some("category"))?)
    }

    /// Uniform (gestation, birth weight) points within each simulant's category cell.
    pub fn sample_continuous(
        &self,
        categories: &[usize],
        index: &[SimulantId],
        stream: &RandomStream,
    ) -> (Vec<f64>, Vec<f64>) {
        let birth_weight_draws = stream.draw(index, Some("birth_weight"));
        let gestation_draws = stream.draw(index, Some("gestation_time"));
        categories
            .iter()
            .zip(birth_weight_draws.iter().zip(&gestation_draws))
            .map(|(&position, (u_bw, u_gt))| {
                let category = &self.grid.categories()[position];
                (
                    category.gestation.start + u_gt * category.gestation.width(),
                    category.birth_weight.start + u_bw * category.birth_weight.width(),
                )
            })
            .unzip()
    }
}

/// Copies the rows for `draw`, adding a missing-category row to every stratum that lacks one.
/// `fill` computes the value from the stratum's existing rows.
pub(super) fn fill_missing_category<F>(
    table: &DrawTable,
    draw: u32,
    fill: F,
) -> Result<DrawTable, DataError>
where
    F: Fn(&[&DrawRow]) -> Result<f64, DataError>,
{
    let rows = table.for_draw(draw);
    let mut out = DrawTable::from_rows(rows.iter().map(|r| (*r).clone()).collect());
    let mut strata: Vec<Vec<&DrawRow>> = Vec::new();
    for row in &rows {
        match strata.iter_mut().find(|s| {
            s[0].sex == row.sex && s[0].age == row.age && s[0].year == row.year
        }) {
            Some(stratum) => stratum.push(row),
            None => strata.push(vec![row]),
        }
    }
    for stratum in strata {
        if stratum
            .iter()
            .any(|r| r.category.as_deref() == Some(MISSING_CATEGORY))
        {
            continue;
        }
        let first = stratum[0];
        out.push(DrawRow {
            sex: first.sex,
            age: first.age,
            year: first.year,
            draw: first.draw,
            category: Some(MISSING_CATEGORY.to_string()),
            value: fill(&stratum)?,
        });
    }
    Ok(out)
}
