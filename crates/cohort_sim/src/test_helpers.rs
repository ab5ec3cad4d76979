//! Test helpers for common test setup and utilities.
//!
//! The synthetic data store is small but complete: every key the default model and the `measles`
//! and `neonatal_preterm_birth` causes read is present, so tests only override what they exercise.

use bevy_ecs::prelude::World;

use crate::data::{DataStore, DrawRow, DrawTable};
use crate::population::Sex;
use crate::runner::initialize_simulation;
use crate::scenario::{build_model, ModelParams};

/// End of the early neonatal age group, in years.
pub const EARLY_NEONATAL_END: f64 = 7.0 / 365.0;
/// End of the late neonatal age group, in years.
pub const LATE_NEONATAL_END: f64 = 28.0 / 365.0;

const AGE_GROUPS: [(f64, f64); 4] = [
    (0.0, EARLY_NEONATAL_END),
    (EARLY_NEONATAL_END, LATE_NEONATAL_END),
    (LATE_NEONATAL_END, 1.0),
    (1.0, 5.0),
];

/// Gestation columns (weeks) and the highest birth weight (grams) each one reaches.
const GESTATION_COLUMNS: [(u32, u32, u32); 7] = [
    (24, 28, 1000),
    (28, 32, 2500),
    (32, 36, 3500),
    (36, 37, 4500),
    (37, 38, 4500),
    (38, 40, 4500),
    (40, 42, 4500),
];

/// Highest gestation end (weeks) for the lightest birth-weight rows.
const LIGHT_ROW_CAPS: [(u32, u32); 2] = [(0, 36), (500, 38)];

pub const LBWSG_CATEGORIES_KEY: &str = "risk_factor.low_birth_weight_and_short_gestation.categories";
pub const LBWSG_EXPOSURE_KEY: &str = "risk_factor.low_birth_weight_and_short_gestation.exposure";
pub const LBWSG_PAF_TARGETS: [&str; 4] = [
    "affected_unmodeled.csmr",
    "all_causes.mortality_hazard",
    "measles.excess_mortality_rate",
    "measles.incidence_rate",
];

/// Synthetic grid cells as (gestation start, gestation end, birth weight start, birth weight end).
fn lbwsg_cells() -> Vec<(u32, u32, u32, u32)> {
    let mut cells = Vec::new();
    for (gt_start, gt_end, bw_cap) in GESTATION_COLUMNS {
        for bw_start in (0..bw_cap).step_by(500) {
            let capped = LIGHT_ROW_CAPS
                .iter()
                .any(|&(row, cap)| row == bw_start && gt_end > cap);
            // [37, 38) wks × [1000, 1500) g is the hole the missing category fills.
            let hole = gt_start == 37 && bw_start == 1000;
            if !capped && !hole {
                cells.push((gt_start, gt_end, bw_start, bw_start + 500));
            }
        }
    }
    cells
}

/// `(id, description)` pairs for the synthetic grid, numbered from `cat100` in column order so
/// `cat106` and `cat116` both exist. The missing category is not included.
pub fn lbwsg_category_descriptions() -> Vec<(String, String)> {
    lbwsg_cells()
        .into_iter()
        .enumerate()
        .map(|(i, (gt_start, gt_end, bw_start, bw_end))| {
            (
                format!("cat{}", 100 + i),
                format!("Birth prevalence - [{gt_start}, {gt_end}) wks, [{bw_start}, {bw_end}) g"),
            )
        })
        .collect()
}

/// Birth prevalence by sex, summing to one per stratum, without a missing-category row.
/// Mass grows towards long gestations and heavy birth weights.
pub fn lbwsg_exposure_table() -> DrawTable {
    let cells = lbwsg_cells();
    let weight = |&(_, gt_end, _, bw_end): &(u32, u32, u32, u32), sex: Sex| {
        let base = (gt_end as f64 - 23.0).powi(2) * (bw_end as f64 / 500.0);
        match sex {
            Sex::Male => base * (1.0 + bw_end as f64 / 9000.0),
            Sex::Female => base,
        }
    };
    let mut rows = Vec::new();
    for sex in Sex::ALL {
        let total: f64 = cells.iter().map(|c| weight(c, sex)).sum();
        for (i, cell) in cells.iter().enumerate() {
            rows.push(
                DrawRow::new(weight(cell, sex) / total)
                    .sex(sex)
                    .category(format!("cat{}", 100 + i)),
            );
        }
    }
    DrawTable::from_rows(rows)
}

/// Relative risk falls from roughly 4 in the earliest, lightest cell to 1 at the heaviest term cell.
pub fn lbwsg_relative_risk_table() -> DrawTable {
    let rows = lbwsg_cells()
        .into_iter()
        .enumerate()
        .map(|(i, (_, gt_end, _, bw_end))| {
            let rr = 1.0 + (42.0 - gt_end as f64) / 14.0 + (4500.0 - bw_end as f64) / 2000.0;
            DrawRow::new(rr).category(format!("cat{}", 100 + i))
        })
        .collect();
    DrawTable::from_rows(rows)
}

pub fn constant_table(value: f64) -> DrawTable {
    DrawTable::from_rows(vec![DrawRow::new(value)])
}

/// Sex × age-group table with one value per age group; males get `male_scale` times the value.
pub fn age_table(values: [f64; 4], male_scale: f64) -> DrawTable {
    let mut rows = Vec::new();
    for sex in Sex::ALL {
        let scale = if sex == Sex::Male { male_scale } else { 1.0 };
        for ((start, end), value) in AGE_GROUPS.iter().zip(values) {
            rows.push(DrawRow::new(value * scale).sex(sex).age(*start, *end));
        }
    }
    DrawTable::from_rows(rows)
}

fn insert_lbwsg(store: &mut DataStore) {
    store.insert_categories(LBWSG_CATEGORIES_KEY, lbwsg_category_descriptions());
    store.insert_table(LBWSG_EXPOSURE_KEY, lbwsg_exposure_table());
    store.insert_table(
        "risk_factor.low_birth_weight_and_short_gestation.relative_risk",
        lbwsg_relative_risk_table(),
    );
    store.insert_table(
        "risk_factor.low_birth_weight_and_short_gestation.population_attributable_fraction",
        DrawTable::from_rows(
            LBWSG_PAF_TARGETS
                .iter()
                .map(|target| DrawRow::new(0.1).category(*target))
                .collect(),
        ),
    );
}

fn insert_growth_failure(store: &mut DataStore) {
    for (risk, mean, sd) in [("child_wasting", -0.4, 1.1), ("child_stunting", -0.9, 1.2)] {
        store.insert_table(&format!("risk_factor.{risk}.exposure"), constant_table(mean));
        store.insert_table(
            &format!("risk_factor.{risk}.exposure_standard_deviation"),
            constant_table(sd),
        );
    }
}

/// Everything except cause-level mortality: zero all-cause mortality, life expectancy, LBWSG and
/// growth-failure exposures.
pub fn zero_mortality_store() -> DataStore {
    let mut store = DataStore::new();
    store.insert_table(
        "cause.all_causes.cause_specific_mortality_rate",
        constant_table(0.0),
    );
    store.insert_table(
        "population.theoretical_minimum_risk_life_expectancy",
        DrawTable::from_rows(
            AGE_GROUPS
                .iter()
                .map(|&(start, end)| DrawRow::new(89.0 - start).age(start, end))
                .collect(),
        ),
    );
    insert_lbwsg(&mut store);
    insert_growth_failure(&mut store);
    store
}

/// Zero mortality plus constant `measles` incidence and remission rates (per year).
pub fn sis_store(incidence: f64, remission: f64) -> DataStore {
    let mut store = zero_mortality_store();
    store.insert_table("cause.measles.incidence_rate", constant_table(incidence));
    store.insert_table("cause.measles.remission_rate", constant_table(remission));
    store
}

/// Neonatal-shaped all-cause mortality with `measles` and `neonatal_preterm_birth` data.
pub fn synthetic_store() -> DataStore {
    let mut store = sis_store(0.5, 2.0);
    store.insert_table(
        "cause.all_causes.cause_specific_mortality_rate",
        age_table([2.0, 0.5, 0.05, 0.005], 1.1),
    );
    store.insert_table(
        "cause.measles.cause_specific_mortality_rate",
        constant_table(0.001),
    );
    store.insert_table("cause.measles.excess_mortality_rate", constant_table(0.005));
    store.insert_table("cause.measles.disability_weight", constant_table(0.05));
    store.insert_table(
        "cause.neonatal_preterm_birth.cause_specific_mortality_rate",
        age_table([0.5, 0.1, 0.01, 0.0], 1.0),
    );
    store.insert_table(
        "cause.neonatal_preterm_birth.excess_mortality_rate",
        age_table([5.0, 1.0, 0.1, 0.0], 1.0),
    );
    store.insert_table(
        "cause.neonatal_preterm_birth.disability_weight",
        constant_table(0.1),
    );
    store.insert_table(
        "cause.lower_respiratory_infections.cause_specific_mortality_rate",
        age_table([0.1, 0.1, 0.02, 0.002], 1.0),
    );
    store
}

/// A world wired for `params` against `store` with the first event scheduled.
///
/// # Panics
///
/// Panics if the model cannot be wired.
pub fn create_test_world(params: &ModelParams, store: &DataStore) -> World {
    let mut world = World::new();
    build_model(&mut world, params, store).expect("model should wire against the test store");
    initialize_simulation(&mut world);
    world
}
