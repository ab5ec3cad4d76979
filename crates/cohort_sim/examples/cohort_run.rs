//! Run a one-year neonatal cohort against the synthetic data store and print a summary.
//!
//! Run with: cargo run -p cohort_sim --example cohort_run --release
//! Params:   COHORT_PARAMS=/path/params.json cargo run -p cohort_sim --example cohort_run
//! Export:   SIM_EXPORT_DIR=/path cargo run -p cohort_sim --example cohort_run --release
//! Logging:  RUST_LOG=cohort_sim=debug cargo run -p cohort_sim --example cohort_run

use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use bevy_ecs::prelude::World;
use cohort_sim::export::{write_metrics_parquet, write_population_parquet};
use cohort_sim::observe::collect_metrics;
use cohort_sim::population::PopulationTable;
use cohort_sim::runner::{initialize_simulation, run_until_empty, simulation_schedule};
use cohort_sim::scenario::{build_model, CorrelatedRiskParams, DiseaseKind, ModelParams, Scenario};
use cohort_sim::test_helpers::synthetic_store;
use tracing_subscriber::EnvFilter;

fn default_params() -> ModelParams {
    ModelParams::default()
        .with_seed(123)
        .with_population_size(20_000)
        .with_scenario(Scenario::Bep)
        .with_disease("measles", DiseaseKind::Sis)
        .with_risk_attributable_disease("neonatal_preterm_birth", 37.0)
        .with_unmodeled_affected_cause("lower_respiratory_infections")
        .with_lbwsg_target("all_causes.mortality_hazard")
        .with_lbwsg_target("affected_unmodeled.csmr")
        .with_lbwsg_target("measles.incidence_rate")
        .with_correlated_risk(CorrelatedRiskParams::child_wasting())
        .with_correlated_risk(CorrelatedRiskParams::child_stunting())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let params = match env::var("COHORT_PARAMS") {
        Ok(path) => ModelParams::from_json(&fs::read_to_string(path)?)?,
        Err(_) => default_params(),
    };

    // --- Build phase ---
    let build_start = Instant::now();
    let mut world = World::new();
    build_model(&mut world, &params, &synthetic_store())?;
    initialize_simulation(&mut world);
    println!("Build time: {:.2}s", build_start.elapsed().as_secs_f64());

    // --- Run phase ---
    let run_start = Instant::now();
    let mut schedule = simulation_schedule();
    let events = run_until_empty(&mut world, &mut schedule, usize::MAX)?;
    let run_elapsed = run_start.elapsed();

    let metrics = collect_metrics(&world)?;
    println!(
        "\n--- Cohort run ({} newborns, scenario {}, seed {}, draw {}) ---",
        params.population_size, params.scenario, params.seed, params.input_draw
    );
    println!("Events executed:     {events}");
    println!("Wall-clock time:     {:.2}s", run_elapsed.as_secs_f64());
    println!(
        "Simulant-steps/s:    {:.0}",
        params.population_size as f64 * (events / 4) as f64 / run_elapsed.as_secs_f64()
    );

    println!("\n--- Measures ---");
    for (measure, value) in &metrics {
        println!("{measure:60} {value:>14.4}");
    }

    if let Ok(dir) = env::var("SIM_EXPORT_DIR") {
        let dir = PathBuf::from(dir);
        fs::create_dir_all(&dir)?;
        write_population_parquet(dir.join("population.parquet"), world.resource::<PopulationTable>())?;
        write_metrics_parquet(dir.join("metrics.parquet"), &metrics)?;
        println!("\nExported population and metrics to {}", dir.display());
    }
    Ok(())
}
