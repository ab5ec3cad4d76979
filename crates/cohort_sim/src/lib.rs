pub mod clock;
pub mod cohort;
pub mod correlated_risk;
pub mod data;
pub mod disability;
pub mod disease;
pub mod error;
pub mod export;
pub mod lbwsg;
pub mod lookup;
pub mod mortality;
pub mod nutrition;
pub mod observe;
pub mod population;
pub mod randomness;
pub mod runner;
pub mod scenario;
pub mod stats;
pub mod systems;
pub mod telemetry;
pub mod values;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
