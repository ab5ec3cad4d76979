//! Error types for wiring, data loading and stepping the simulation.
//!
//! Setup failures (bad configuration, incomplete data, inconsistent wiring) are raised from
//! [crate::scenario::build_model] before any simulant exists. Step failures are recorded by the
//! schedule and surfaced by the runner.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown scenario '{value}'; scenario must be one of [{allowed}]")]
    UnknownScenario { value: String, allowed: String },
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("failed to parse model parameters: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq)]
pub enum WiringError {
    #[error("column '{column}' is created by both '{first}' and '{second}'")]
    ColumnOwnedTwice {
        column: String,
        first: String,
        second: String,
    },
    #[error("component '{component}' reads column '{column}' that no component creates")]
    MissingColumn { component: String, column: String },
    #[error("value '{name}' is required but no producer was registered")]
    MissingProducer { name: String },
    #[error("value '{name}' already has a producer")]
    DuplicateProducer { name: String },
    #[error("randomness stream '{name}' was requested twice")]
    DuplicateStream { name: String },
    #[error("disease '{cause}' has no state '{state}'")]
    UnknownDiseaseState { cause: String, state: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum DataError {
    #[error("no data stored under key '{key}'")]
    MissingKey { key: String },
    #[error("table '{key}' has no rows for draw {draw}")]
    MissingDraw { key: String, draw: u32 },
    #[error("table '{key}' is missing stratum {stratum}")]
    MissingStratum { key: String, stratum: String },
    #[error("table '{key}' has more than one row for stratum {stratum}")]
    OverlappingStratum { key: String, stratum: String },
    #[error("table '{key}' has non-contiguous {dimension} bins")]
    NonContiguousBins { key: String, dimension: &'static str },
    #[error("table '{key}' mixes stratified and unstratified rows on {dimension}")]
    InconsistentStratification { key: String, dimension: &'static str },
    #[error("categorical exposure '{key}' sums to {total} in stratum {stratum}")]
    ExposureNotNormalized {
        key: String,
        stratum: String,
        total: f64,
    },
    #[error("table '{key}' has no column for category '{category}'")]
    MissingCategory { key: String, category: String },
    #[error("failed to read '{path}': {reason}")]
    Read { path: String, reason: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum PopulationError {
    #[error("column '{column}' does not exist")]
    UnknownColumn { column: String },
    #[error("component '{component}' did not declare a read of column '{column}'")]
    UndeclaredRead { component: String, column: String },
    #[error("component '{component}' does not own column '{column}'")]
    NotOwner { component: String, column: String },
    #[error("column '{column}' was read before its owner initialized it")]
    ColumnNotInitialized { column: String },
    #[error("column '{column}' holds {actual} values, not {expected}")]
    WrongKind {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("update for column '{column}' has {values} values for {index} simulants")]
    LengthMismatch {
        column: String,
        values: usize,
        index: usize,
    },
    #[error("simulant {id} is outside the table (size {size})")]
    IndexOutOfRange { id: usize, size: usize },
}

#[derive(Debug, Error, PartialEq)]
pub enum RandomnessError {
    #[error("stream '{stream}' got {weights} weights for {options} options")]
    WeightShape {
        stream: String,
        weights: usize,
        options: usize,
    },
    #[error("stream '{stream}' got a weight row with total {total} for simulant {id}")]
    InvalidWeights { stream: String, id: usize, total: f64 },
}

#[derive(Debug, Error, PartialEq)]
pub enum LbwsgError {
    #[error("cannot parse LBWSG category name '{0}'")]
    InvalidCategoryName(String),
    #[error("no LBWSG cell contains gestation {gestation_time} wks, birth weight {birth_weight} g and no correction applies")]
    Uncorrectable {
        gestation_time: f64,
        birth_weight: f64,
    },
    #[error("LBWSG grid has no categories")]
    EmptyGrid,
}

#[derive(Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error("value '{name}' produced {actual}, expected {expected}")]
    UnexpectedSignal {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("frame has no column '{0}'")]
    MissingFrameColumn(String),
    #[error("cannot stratify by sex: {0}")]
    InvalidSex(String),
    #[error(transparent)]
    Population(#[from] PopulationError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Lbwsg(#[from] LbwsgError),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),
    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error(transparent)]
    Population(#[from] PopulationError),
}

/// Umbrella error returned by wiring and by the runner.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Wiring(#[from] WiringError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Population(#[from] PopulationError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Randomness(#[from] RandomnessError),
    #[error(transparent)]
    Lbwsg(#[from] LbwsgError),
}
