mod support;

use cohort_sim::clock::EventKind;
use cohort_sim::lbwsg::{
    LbwsgGrid, BIRTH_WEIGHT, BIRTH_WEIGHT_PERCENTILE, EXPOSURE, GESTATION_TIME, MISSING_CATEGORY,
    RAW_EXPOSURE,
};
use cohort_sim::observe::{pipeline_value, pipeline_value_raw};
use cohort_sim::population::SEX;
use cohort_sim::scenario::{
    CorrelatedRiskParams, Scenario, SupplementationParams, UncertainProportion,
};
use cohort_sim::test_helpers::{lbwsg_category_descriptions, lbwsg_exposure_table};

use support::columns::{categories, floats};
use support::schedule::ScheduleRunner;
use support::stats::spearman;
use support::world::TestWorldBuilder;

fn grid() -> LbwsgGrid {
    LbwsgGrid::from_descriptions(&lbwsg_category_descriptions()).expect("grid")
}

#[test]
fn sampled_exposures_fall_inside_their_category() {
    let n = 20_000;
    let mut world = TestWorldBuilder::new().with_population_size(n).build();
    ScheduleRunner::new().run_through(&mut world, EventKind::SimulationStarted);

    let grid = grid();
    let index: Vec<usize> = (0..n).collect();
    let raw = pipeline_value(&world, RAW_EXPOSURE, &index)
        .expect("raw exposure")
        .into_frame(RAW_EXPOSURE)
        .expect("frame");
    let exposure = pipeline_value(&world, EXPOSURE, &index)
        .expect("exposure")
        .into_categories(EXPOSURE)
        .expect("categories");

    let gestation = raw.column(GESTATION_TIME).expect("gestation");
    let birth_weight = raw.column(BIRTH_WEIGHT).expect("birth weight");
    for i in 0..n {
        let position = grid
            .locate(gestation[i], birth_weight[i])
            .expect("sampled point inside the grid");
        assert_eq!(grid.categories()[position].id, exposure[i]);
    }
    assert!(!exposure.iter().any(|c| c == MISSING_CATEGORY));

    // The heaviest term cell is the most prevalent one for each sex.
    let sexes = categories(&world, SEX);
    let table = lbwsg_exposure_table();
    for sex in ["Male", "Female"] {
        let members: Vec<&String> = exposure
            .iter()
            .zip(&sexes)
            .filter(|(_, s)| *s == sex)
            .map(|(c, _)| c)
            .collect();
        let tmrel = grid
            .locate(41.0, 4250.0)
            .map(|p| grid.categories()[p].id.clone())
            .expect("tmrel cell");
        let observed =
            members.iter().filter(|c| ***c == tmrel).count() as f64 / members.len() as f64;
        let expected = table
            .rows()
            .iter()
            .find(|r| {
                r.category.as_deref() == Some(tmrel.as_str())
                    && r.sex.map(|s| s.as_str()) == Some(sex)
            })
            .expect("row")
            .value;
        assert!(
            (observed - expected).abs() < 0.02,
            "{sex}: {observed} vs {expected}"
        );
    }
}

#[test]
fn birth_weight_percentiles_rank_the_cohort() {
    let n = 1_000;
    let mut world = TestWorldBuilder::new().with_population_size(n).build();
    ScheduleRunner::new().run_through(&mut world, EventKind::SimulationStarted);

    let birth_weight = floats(&world, BIRTH_WEIGHT);
    let percentiles = floats(&world, BIRTH_WEIGHT_PERCENTILE);
    assert!(percentiles.iter().all(|p| *p > 0.0 && *p <= 1.0));
    let lightest = (0..n)
        .min_by(|&a, &b| birth_weight[a].total_cmp(&birth_weight[b]))
        .expect("lightest");
    let heaviest = (0..n)
        .max_by(|&a, &b| birth_weight[a].total_cmp(&birth_weight[b]))
        .expect("heaviest");
    assert_eq!(percentiles[heaviest], 1.0);
    assert!(percentiles[lightest] <= 1.0 / n as f64 + 1e-12);
}

#[test]
fn shifted_exposures_are_pulled_back_into_the_grid() {
    let n = 5_000;
    let mut world = TestWorldBuilder::new()
        .with_population_size(n)
        .with_scenario(Scenario::Bep)
        .with_params(|p| {
            p.with_supplementation(SupplementationParams {
                anc_coverage: UncertainProportion::Fixed { proportion: 1.0 },
                scale_up_fraction: 1.0,
                bep_birth_weight_shift: 1_500.0,
                ..SupplementationParams::default()
            })
        })
        .build();
    ScheduleRunner::new().run_through(&mut world, EventKind::SimulationStarted);

    let grid = grid();
    let index: Vec<usize> = (0..n).collect();
    let shifted = pipeline_value_raw(&world, EXPOSURE, &index)
        .expect("shifted exposure")
        .into_frame(EXPOSURE)
        .expect("frame");
    let exposure = pipeline_value(&world, EXPOSURE, &index)
        .expect("exposure")
        .into_categories(EXPOSURE)
        .expect("categories");

    let gestation = shifted.column(GESTATION_TIME).expect("gestation");
    let birth_weight = shifted.column(BIRTH_WEIGHT).expect("birth weight");
    let mut corrected = 0;
    for i in 0..n {
        let position = grid.position(&exposure[i]).expect("known category");
        match grid.locate(gestation[i], birth_weight[i]) {
            Some(inside) => assert_eq!(inside, position),
            None => {
                corrected += 1;
                let cell = &grid.categories()[position];
                // Only birth weight overshoots here, so gestation is kept.
                assert!(cell.gestation.contains(gestation[i]));
                assert!(cell.birth_weight.end <= birth_weight[i]);
            }
        }
    }
    assert!(corrected > n / 10, "only {corrected} corrections");
}

#[test]
fn preterm_birth_follows_gestational_age() {
    let n = 2_000;
    let mut world = TestWorldBuilder::new()
        .with_population_size(n)
        .with_duration_days(7)
        .with_params(|p| p.with_risk_attributable_disease("neonatal_preterm_birth", 37.0))
        .build();
    let mut runner = ScheduleRunner::new();
    runner.run_through(&mut world, EventKind::SimulationStarted);

    let gestation = floats(&world, GESTATION_TIME);
    let check = |states: &[String]| {
        for (state, weeks) in states.iter().zip(&gestation) {
            let expected = if *weeks <= 37.0 {
                "neonatal_preterm_birth"
            } else {
                "susceptible_to_neonatal_preterm_birth"
            };
            assert_eq!(state, expected, "gestation {weeks}");
        }
    };
    let states = categories(&world, "neonatal_preterm_birth");
    check(&states);
    assert!(states.iter().any(|s| s == "neonatal_preterm_birth"));

    runner.run_full(&mut world);
    check(&categories(&world, "neonatal_preterm_birth"));
}

#[test]
fn wasting_propensity_tracks_birth_weight_rank() {
    let n = 100_000;
    let mut world = TestWorldBuilder::new()
        .with_population_size(n)
        .with_params(|p| {
            p.with_correlated_risk(CorrelatedRiskParams::child_wasting().with_fixed_correlation(0.308))
        })
        .build();
    ScheduleRunner::new().run_through(&mut world, EventKind::SimulationStarted);

    let index: Vec<usize> = (0..n).collect();
    let z = pipeline_value_raw(&world, "child_wasting.exposure", &index)
        .expect("wasting z-scores")
        .into_scalar("child_wasting.exposure")
        .expect("scalar");
    let birth_weight = floats(&world, BIRTH_WEIGHT);
    let rho = spearman(&birth_weight, &z);
    assert!((rho - 0.308).abs() < 0.05, "spearman {rho}");

    let wasting = pipeline_value(&world, "child_wasting.exposure", &index)
        .expect("wasting categories")
        .into_categories("child_wasting.exposure")
        .expect("categories");
    assert!(wasting
        .iter()
        .all(|c| ["cat1", "cat2", "cat3", "cat4"].contains(&c.as_str())));
}
