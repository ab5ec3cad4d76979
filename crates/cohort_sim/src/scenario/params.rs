use std::fmt;
use std::str::FromStr;

use bevy_ecs::prelude::Resource;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::stats::{confidence_interval_sd, sample_beta, sample_gamma};

/// Intervention scenario. Only the supplementation component branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Scenario {
    #[default]
    Baseline,
    Ifa,
    Mmn,
    Bep,
    BepTargeted,
}

impl Scenario {
    pub const ALL: [Scenario; 5] = [
        Scenario::Baseline,
        Scenario::Ifa,
        Scenario::Mmn,
        Scenario::Bep,
        Scenario::BepTargeted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Scenario::Baseline => "baseline",
            Scenario::Ifa => "ifa",
            Scenario::Mmn => "mmn",
            Scenario::Bep => "bep",
            Scenario::BepTargeted => "bep_targeted",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownScenario {
                value: s.to_string(),
                allowed: Scenario::ALL
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

impl TryFrom<String> for Scenario {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Scenario> for String {
    fn from(value: Scenario) -> Self {
        value.as_str().to_string()
    }
}

/// Shape of a modeled disease.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiseaseKind {
    Si,
    Sis,
    Sir,
    SisFixedDuration { duration_days: f64 },
    SirFixedDuration { duration_days: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseSpec {
    pub cause: String,
    pub model: DiseaseKind,
}

/// A cause whose state is a threshold on the raw gestational age.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAttributableSpec {
    pub cause: String,
    /// Simulants born at or below this gestational age (weeks) have the condition.
    pub max_gestation_weeks: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LbwsgParams {
    /// Birth weights below this floor (grams) are clipped before categorization.
    /// Defaults to the lowest birth weight covered by the category grid.
    pub birth_weight_floor: Option<f64>,
    /// Categories whose mean relative risk stands in for the missing category.
    pub missing_category_relative_risk_sources: Vec<String>,
    /// Rate pipelines multiplied by the LBWSG relative risk.
    pub affected_targets: Vec<String>,
}

impl Default for LbwsgParams {
    fn default() -> Self {
        Self {
            birth_weight_floor: None,
            missing_category_relative_risk_sources: vec!["cat106".to_string(), "cat116".to_string()],
            affected_targets: Vec::new(),
        }
    }
}

/// Correlation between birth weight and a growth-failure risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorrelationSpec {
    Fixed {
        rho: f64,
    },
    /// Truncated normal built from a 95% confidence interval.
    Prior {
        mean: f64,
        lower: f64,
        upper: f64,
        clip_lower: f64,
        clip_upper: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedRiskParams {
    pub risk: String,
    pub correlation: CorrelationSpec,
}

impl CorrelatedRiskParams {
    pub fn child_wasting() -> Self {
        Self {
            risk: "child_wasting".to_string(),
            correlation: CorrelationSpec::Prior {
                mean: 0.308,
                lower: 0.263,
                upper: 0.351,
                clip_lower: 0.2,
                clip_upper: 0.4,
            },
        }
    }

    pub fn child_stunting() -> Self {
        Self {
            risk: "child_stunting".to_string(),
            correlation: CorrelationSpec::Prior {
                mean: 0.394,
                lower: 0.353,
                upper: 0.433,
                clip_lower: 0.3,
                clip_upper: 0.5,
            },
        }
    }

    pub fn with_fixed_correlation(mut self, rho: f64) -> Self {
        self.correlation = CorrelationSpec::Fixed { rho };
        self
    }
}

/// A run-level proportion, either fixed or drawn once per input draw from a beta distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UncertainProportion {
    Fixed { proportion: f64 },
    Beta { mean: f64, variance: f64 },
    /// Beta with the variance implied by a 95% confidence interval.
    BetaInterval { mean: f64, lower: f64, upper: f64 },
}

impl UncertainProportion {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, ConfigError> {
        match *self {
            UncertainProportion::Fixed { proportion } => Ok(proportion),
            UncertainProportion::Beta { mean, variance } => sample_beta(rng, mean, variance),
            UncertainProportion::BetaInterval { mean, lower, upper } => {
                sample_beta(rng, mean, confidence_interval_sd(lower, upper).powi(2))
            }
        }
    }

    fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        match *self {
            UncertainProportion::Fixed { proportion } if !(0.0..=1.0).contains(&proportion) => {
                Err(ConfigError::InvalidParameter {
                    name,
                    reason: format!("proportion {proportion} outside [0, 1]"),
                })
            }
            UncertainProportion::BetaInterval { lower, upper, .. } if lower >= upper => {
                Err(ConfigError::InvalidParameter {
                    name,
                    reason: format!("interval [{lower}, {upper}] is empty"),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Gamma prior given by its mean and 95% confidence interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GammaPrior {
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
}

impl GammaPrior {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, ConfigError> {
        sample_gamma(rng, self.mean, confidence_interval_sd(self.lower, self.upper))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SexShift {
    pub male: f64,
    pub female: f64,
}

/// How the birth-weight effect of maternal malnutrition is obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BirthWeightShift {
    /// `up` grams added to every birth weight, `down` grams removed for malnourished mothers.
    Fixed { up: SexShift, down: SexShift },
    /// Shifts solved per sex so the low-birth-weight prevalence falls by the attributable
    /// fraction of a relative risk drawn once per input draw.
    FromRelativeRisk {
        relative_risk: GammaPrior,
        low_birth_weight_threshold: f64,
    },
}

impl Default for BirthWeightShift {
    fn default() -> Self {
        BirthWeightShift::Fixed {
            up: SexShift::default(),
            down: SexShift::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthFailureShift {
    pub risk: String,
    /// Added to every simulant's z-score.
    pub up: f64,
    /// Subtracted from children of malnourished mothers.
    pub down: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaternalMalnutritionParams {
    /// Proportion of malnourished mothers.
    pub exposure: UncertainProportion,
    pub birth_weight_shift: BirthWeightShift,
    pub growth_failure_shifts: Vec<GrowthFailureShift>,
}

impl Default for MaternalMalnutritionParams {
    fn default() -> Self {
        Self {
            exposure: UncertainProportion::Fixed { proportion: 0.0 },
            birth_weight_shift: BirthWeightShift::default(),
            growth_failure_shifts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupplementationParams {
    /// Share of mothers attending antenatal care.
    pub anc_coverage: UncertainProportion,
    /// Share of ANC attendees receiving IFA in the baseline.
    pub ifa_coverage_among_anc: UncertainProportion,
    /// Share of ANC attendees reached when a supplement is scaled up.
    pub scale_up_fraction: f64,
    /// Mean birth weight shift in grams per supplement.
    pub ifa_birth_weight_shift: f64,
    pub mmn_birth_weight_shift: f64,
    pub bep_birth_weight_shift: f64,
}

impl Default for SupplementationParams {
    fn default() -> Self {
        Self {
            anc_coverage: UncertainProportion::Fixed { proportion: 0.8 },
            ifa_coverage_among_anc: UncertainProportion::Fixed { proportion: 0.625 },
            scale_up_fraction: 0.9,
            ifa_birth_weight_shift: 0.0,
            mmn_birth_weight_shift: 0.0,
            bep_birth_weight_shift: 0.0,
        }
    }
}

/// Everything needed to wire one (seed, scenario, draw) replicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Resource)]
#[serde(default)]
pub struct ModelParams {
    /// Number of newborns created at time 0.
    pub population_size: usize,
    /// Random seed for all simulant-level streams.
    pub seed: u64,
    /// Input data draw; also seeds run-level parameter uncertainty.
    pub input_draw: u32,
    pub start_year: i32,
    pub step_days: u64,
    pub duration_days: u64,
    /// Used for the sex draw when the data store has no population structure.
    pub male_fraction: f64,
    pub scenario: Scenario,
    pub diseases: Vec<DiseaseSpec>,
    pub risk_attributable_diseases: Vec<RiskAttributableSpec>,
    /// Causes not modeled as diseases whose mortality the LBWSG risk affects.
    pub unmodeled_affected_causes: Vec<String>,
    pub lbwsg: LbwsgParams,
    pub correlated_risks: Vec<CorrelatedRiskParams>,
    pub maternal_malnutrition: MaternalMalnutritionParams,
    pub supplementation: SupplementationParams,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            population_size: 10_000,
            seed: 0,
            input_draw: 0,
            start_year: 2022,
            step_days: 1,
            duration_days: 365,
            male_fraction: 0.5,
            scenario: Scenario::Baseline,
            diseases: Vec::new(),
            risk_attributable_diseases: Vec::new(),
            unmodeled_affected_causes: Vec::new(),
            lbwsg: LbwsgParams::default(),
            correlated_risks: Vec::new(),
            maternal_malnutrition: MaternalMalnutritionParams::default(),
            supplementation: SupplementationParams::default(),
        }
    }
}

impl ModelParams {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |name, reason: &str| {
            Err(ConfigError::InvalidParameter {
                name,
                reason: reason.to_string(),
            })
        };
        if self.population_size == 0 {
            return invalid("population_size", "must be positive");
        }
        if self.step_days == 0 {
            return invalid("step_days", "must be positive");
        }
        if !(0.0..=1.0).contains(&self.male_fraction) {
            return invalid("male_fraction", "must lie in [0, 1]");
        }
        for disease in &self.diseases {
            if let DiseaseKind::SisFixedDuration { duration_days }
            | DiseaseKind::SirFixedDuration { duration_days } = disease.model
            {
                if duration_days <= 0.0 {
                    return invalid("duration_days", "fixed durations must be positive");
                }
            }
        }
        for risk in &self.correlated_risks {
            let rho = match risk.correlation {
                CorrelationSpec::Fixed { rho } => rho,
                CorrelationSpec::Prior {
                    clip_lower,
                    clip_upper,
                    ..
                } => clip_lower.max(clip_upper.abs()),
            };
            if !(-1.0 < rho && rho < 1.0) {
                return invalid("correlation", "must lie strictly between -1 and 1");
            }
        }
        let s = &self.supplementation;
        s.anc_coverage.validate("anc_coverage")?;
        s.ifa_coverage_among_anc.validate("ifa_coverage_among_anc")?;
        if !(0.0..=1.0).contains(&s.scale_up_fraction) {
            return invalid("scale_up_fraction", "must lie in [0, 1]");
        }
        let m = &self.maternal_malnutrition;
        m.exposure.validate("maternal_malnutrition.exposure")?;
        if let BirthWeightShift::FromRelativeRisk { relative_risk, .. } = m.birth_weight_shift {
            if relative_risk.mean < 1.0 || relative_risk.lower >= relative_risk.upper {
                return invalid(
                    "maternal_malnutrition.relative_risk",
                    "needs a mean of at least 1 and a non-empty interval",
                );
            }
        }
        Ok(())
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_input_draw(mut self, draw: u32) -> Self {
        self.input_draw = draw;
        self
    }

    pub fn with_population_size(mut self, size: usize) -> Self {
        self.population_size = size;
        self
    }

    pub fn with_duration_days(mut self, days: u64) -> Self {
        self.duration_days = days;
        self
    }

    pub fn with_step_days(mut self, days: u64) -> Self {
        self.step_days = days;
        self
    }

    pub fn with_scenario(mut self, scenario: Scenario) -> Self {
        self.scenario = scenario;
        self
    }

    pub fn with_disease(mut self, cause: &str, model: DiseaseKind) -> Self {
        self.diseases.push(DiseaseSpec {
            cause: cause.to_string(),
            model,
        });
        self
    }

    pub fn with_risk_attributable_disease(mut self, cause: &str, max_gestation_weeks: f64) -> Self {
        self.risk_attributable_diseases.push(RiskAttributableSpec {
            cause: cause.to_string(),
            max_gestation_weeks,
        });
        self
    }

    pub fn with_unmodeled_affected_cause(mut self, cause: &str) -> Self {
        self.unmodeled_affected_causes.push(cause.to_string());
        self
    }

    pub fn with_lbwsg_target(mut self, target: &str) -> Self {
        self.lbwsg.affected_targets.push(target.to_string());
        self
    }

    pub fn with_correlated_risk(mut self, risk: CorrelatedRiskParams) -> Self {
        self.correlated_risks.push(risk);
        self
    }

    pub fn with_maternal_malnutrition(mut self, params: MaternalMalnutritionParams) -> Self {
        self.maternal_malnutrition = params;
        self
    }

    pub fn with_supplementation(mut self, params: SupplementationParams) -> Self {
        self.supplementation = params;
        self
    }
}
