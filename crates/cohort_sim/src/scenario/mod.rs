//! Model configuration and wiring.
//!
//! [ModelParams] describes one (seed, scenario, draw) replicate. [build_model] turns it and a
//! [crate::data::DataStore] into the resources the schedule runs against. Every data-shape,
//! configuration and wiring error surfaces here, before any simulant exists.

mod build;
mod params;

pub use build::{build_model, ModelBuilder, ModelComponents, METRICS};
pub use params::{
    BirthWeightShift, CorrelatedRiskParams, CorrelationSpec, DiseaseKind, DiseaseSpec,
    GammaPrior, GrowthFailureShift, LbwsgParams, MaternalMalnutritionParams, ModelParams,
    RiskAttributableSpec, Scenario, SexShift, SupplementationParams, UncertainProportion,
};
