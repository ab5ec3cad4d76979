mod support;

use cohort_sim::clock::{EventKind, SimulationClock, DAYS_PER_YEAR};
use cohort_sim::observe::collect_metrics;
use cohort_sim::scenario::DiseaseKind;
use cohort_sim::test_helpers::sis_store;

use support::columns::{categories, times};
use support::schedule::ScheduleRunner;
use support::stats::proportion;
use support::world::TestWorldBuilder;

#[test]
fn sis_prevalence_approaches_incidence_over_total_flow() {
    let incidence = 0.5;
    let remission = 2.0;
    let mut world = TestWorldBuilder::new()
        .with_store(sis_store(incidence, remission))
        .with_population_size(10_000)
        .with_duration_days(365)
        .with_disease("measles", DiseaseKind::Sis)
        .build();
    ScheduleRunner::new().run_full(&mut world);

    let states = categories(&world, "measles");
    let prevalence = proportion(&states, "measles");

    // Everyone starts susceptible, so after one year the prevalence is still on its way to the
    // equilibrium i / (i + r).
    let equilibrium = incidence / (incidence + remission);
    let years = 365.0 / DAYS_PER_YEAR;
    let transient = equilibrium * (1.0 - (-(incidence + remission) * years).exp());
    assert!(
        (prevalence - transient).abs() < 0.015,
        "prevalence {prevalence} vs expected {transient}"
    );
    assert!((prevalence - equilibrium).abs() < 0.03);

    // Zero mortality: every simulant contributes a full year of person-time.
    let metrics = collect_metrics(&world).expect("metrics");
    let person_time = metrics["measles.measles.person_time"]
        + metrics["measles.susceptible_to_measles.person_time"];
    assert!((person_time - 10_000.0 * years).abs() < 1e-6 * person_time);
}

#[test]
fn si_never_leaves_the_condition() {
    let mut world = TestWorldBuilder::new()
        .with_store(sis_store(5.0, 2.0))
        .with_population_size(500)
        .with_duration_days(60)
        .with_disease("measles", DiseaseKind::Si)
        .build();
    let mut runner = ScheduleRunner::new();
    runner.run_through(&mut world, EventKind::SimulationStarted);

    let mut infected_before: Vec<bool> = vec![false; 500];
    while runner.run_through(&mut world, EventKind::CollectMetrics) {
        let states = categories(&world, "measles");
        for (was, now) in infected_before.iter_mut().zip(&states) {
            let is_infected = now == "measles";
            assert!(!*was || is_infected, "a simulant left an SI condition");
            *was = is_infected;
        }
    }
    assert!(infected_before.iter().any(|&b| b));
}

#[test]
fn fixed_duration_condition_lasts_exactly_its_duration() {
    let duration_days = 10.0;
    let mut world = TestWorldBuilder::new()
        .with_store(sis_store(20.0, 0.0))
        .with_population_size(2_000)
        .with_duration_days(60)
        .with_disease("measles", DiseaseKind::SirFixedDuration { duration_days })
        .build();
    let mut runner = ScheduleRunner::new();
    runner.run_through(&mut world, EventKind::SimulationStarted);

    while runner.run_through(&mut world, EventKind::CollectMetrics) {
        let step_end = world.resource::<SimulationClock>().sim_time().event_time;
        let states = categories(&world, "measles");
        let entered = times(&world, "measles_event_time");
        for (state, entered) in states.iter().zip(&entered) {
            if state == "measles" {
                let entered = entered.expect("infected simulants have an entry time");
                assert!(step_end - entered < duration_days);
            }
        }
    }

    let states = categories(&world, "measles");
    let entered = times(&world, "measles_event_time");
    let recovered = times(&world, "recovered_from_measles_event_time");
    let mut recoveries = 0;
    for ((state, entered), recovered) in states.iter().zip(&entered).zip(&recovered) {
        if state == "recovered_from_measles" {
            let dwell = recovered.expect("recovery time") - entered.expect("infection time");
            assert_eq!(dwell, duration_days);
            recoveries += 1;
        }
    }
    assert!(recoveries > 1_000, "only {recoveries} recoveries");
}

#[test]
fn transition_counts_match_final_states() {
    let mut world = TestWorldBuilder::new()
        .with_store(sis_store(3.0, 6.0))
        .with_population_size(1_000)
        .with_duration_days(30)
        .with_disease("measles", DiseaseKind::Sir)
        .build();
    ScheduleRunner::new().run_full(&mut world);

    let metrics = collect_metrics(&world).expect("metrics");
    let infections = metrics
        .get("measles.susceptible_to_measles_to_measles.event_count")
        .copied()
        .unwrap_or(0.0);
    let recoveries = metrics
        .get("measles.measles_to_recovered_from_measles.event_count")
        .copied()
        .unwrap_or(0.0);
    let states = categories(&world, "measles");
    let still_infected = states.iter().filter(|s| *s == "measles").count() as f64;
    let recovered = states
        .iter()
        .filter(|s| *s == "recovered_from_measles")
        .count() as f64;
    assert_eq!(infections, still_infected + recovered);
    assert_eq!(recoveries, recovered);
}
