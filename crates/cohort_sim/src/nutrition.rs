//! Maternal nutrition and antenatal supplementation.
//!
//! Both act on newborns only through modifiers: a continuous birth-weight shift on the LBWSG
//! exposure and z-score shifts on growth-failure exposures. Neither registers anything the
//! disease or mortality machinery reads directly.

use std::fmt;

use tracing::info;

use crate::error::SimError;
use crate::lbwsg::{LbwsgCategory, LbwsgRisk, BIRTH_WEIGHT, EXPOSURE};
use crate::lookup::parse_sex;
use crate::population::{
    ColumnKind, PopulationTable, PopulationUpdate, PopulationView, Sex, SimulantId, SEX,
};
use crate::randomness::RandomStream;
use crate::scenario::{BirthWeightShift, ModelBuilder, Scenario, SexShift, METRICS};
use crate::stats::solve_monotone;
use crate::values::Signal;

pub const MOTHER_NUTRITION_STATUS: &str = "mother_nutrition_status";
pub const MALNOURISHED: &str = "malnourished";
pub const NORMAL: &str = "normal";
pub const BASELINE_TREATMENT: &str = "baseline_treatment";
pub const TREATMENT: &str = "treatment";

const MALNOURISHED_PROPORTION_METRIC: &str = "maternal_malnutrition.malnourished_proportion";

fn shift_for(shift: &SexShift, sex: Sex) -> f64 {
    match sex {
        Sex::Male => shift.male,
        Sex::Female => shift.female,
    }
}

pub struct MaternalMalnutrition {
    view: PopulationView,
    stream: RandomStream,
    proportion: f64,
}

impl MaternalMalnutrition {
    pub fn setup(builder: &mut ModelBuilder<'_>, lbwsg: &LbwsgRisk) -> Result<Self, SimError> {
        let params = &builder.params().maternal_malnutrition;
        let randomness = builder.randomness();
        let proportion = params
            .exposure
            .sample(&mut randomness.parameter_rng("maternal_malnutrition.exposure"))?;
        let (up, down) = match params.birth_weight_shift {
            BirthWeightShift::Fixed { up, down } => (up, down),
            BirthWeightShift::FromRelativeRisk {
                relative_risk,
                low_birth_weight_threshold,
            } => {
                let rr = relative_risk
                    .sample(&mut randomness.parameter_rng("maternal_malnutrition.relative_risk"))?;
                let year = f64::from(builder.params().start_year);
                let exposure = lbwsg.distribution().exposure();
                let categories = lbwsg.grid().categories();
                let [male, female] = Sex::ALL.map(|sex| {
                    birth_weight_shifts(
                        exposure.row(sex, 0.0, year),
                        categories,
                        proportion,
                        rr,
                        low_birth_weight_threshold,
                    )
                });
                info!(relative_risk = rr, "maternal malnutrition relative risk");
                (
                    SexShift {
                        male: male.0,
                        female: female.0,
                    },
                    SexShift {
                        male: male.1,
                        female: female.1,
                    },
                )
            }
        };
        info!(
            proportion,
            shift_up_male = up.male,
            shift_up_female = up.female,
            shift_down_male = down.male,
            shift_down_female = down.female,
            "malnourished mothers"
        );

        let view = builder.declare_view(
            "maternal_malnutrition",
            &[(MOTHER_NUTRITION_STATUS, ColumnKind::Category)],
            &[SEX],
        )?;
        let stream = builder.stream("maternal_malnutrition")?;

        let bw_view = view.clone();
        builder
            .values()
            .register_value_modifier(EXPOSURE, move |ctx, index, value| {
                let mut frame = value.into_frame(EXPOSURE)?;
                let sexes = ctx.population.categories(&bw_view, SEX)?;
                let status = ctx.population.categories(&bw_view, MOTHER_NUTRITION_STATUS)?;
                let birth_weight = frame.column_mut(BIRTH_WEIGHT)?;
                for (bw, &i) in birth_weight.iter_mut().zip(index) {
                    let sex = parse_sex(sexes.get(i))?;
                    *bw += shift_for(&up, sex);
                    if status.get(i) == MALNOURISHED {
                        *bw -= shift_for(&down, sex);
                    }
                }
                Ok(Signal::Frame(frame))
            });

        for shift in &params.growth_failure_shifts {
            let exposure = format!("{}.exposure", shift.risk);
            let name = exposure.clone();
            let (up, down) = (shift.up, shift.down);
            let z_view = view.clone();
            builder
                .values()
                .register_value_modifier(&exposure, move |ctx, index, value| {
                    let z = value.into_scalar(&name)?;
                    let status = ctx.population.categories(&z_view, MOTHER_NUTRITION_STATUS)?;
                    Ok(Signal::Scalar(
                        z.iter()
                            .zip(index)
                            .map(|(z, &i)| {
                                if status.get(i) == MALNOURISHED {
                                    z + up - down
                                } else {
                                    z + up
                                }
                            })
                            .collect(),
                    ))
                });
        }

        builder
            .values()
            .register_value_modifier(METRICS, move |_, _, value| {
                let mut metrics = value.into_metrics(METRICS)?;
                metrics.insert(MALNOURISHED_PROPORTION_METRIC.to_string(), proportion);
                Ok(Signal::Metrics(metrics))
            });

        Ok(Self {
            view,
            stream,
            proportion,
        })
    }

    /// Run-level share of malnourished mothers.
    pub fn proportion(&self) -> f64 {
        self.proportion
    }

    pub fn initialize(
        &self,
        population: &mut PopulationTable,
        index: &[SimulantId],
    ) -> Result<(), SimError> {
        let status = self.stream.choice(
            index,
            &[MALNOURISHED, NORMAL],
            &[self.proportion, 1.0 - self.proportion],
            None,
        )?;
        population.update(
            &self.view,
            PopulationUpdate::new(index.to_vec()).categories(MOTHER_NUTRITION_STATUS, status),
        )?;
        Ok(())
    }
}

/// Share of birth weights below `threshold` after adding `shift` grams, with weights uniform
/// within each category.
fn low_birth_weight_fraction(
    prevalence: &[f64],
    categories: &[LbwsgCategory],
    threshold: f64,
    shift: f64,
) -> f64 {
    prevalence
        .iter()
        .zip(categories)
        .map(|(p, category)| {
            let cell = &category.birth_weight;
            p * ((threshold - shift - cell.start) / cell.width()).clamp(0.0, 1.0)
        })
        .sum()
}

/// `(up, down)` birth-weight shifts in grams for one sex.
///
/// `up` alone lowers the low-birth-weight prevalence `p` to `p / mean_rr`, where
/// `mean_rr = rr * proportion + 1 - proportion`, i.e. it removes the fraction attributable to
/// malnutrition. `down`, applied to the malnourished share on top of `up`, restores `p`.
pub fn birth_weight_shifts(
    prevalence: &[f64],
    categories: &[LbwsgCategory],
    proportion: f64,
    relative_risk: f64,
    threshold: f64,
) -> (f64, f64) {
    let fraction = |shift| low_birth_weight_fraction(prevalence, categories, threshold, shift);
    let lightest = categories
        .iter()
        .map(|c| c.birth_weight.start)
        .fold(f64::INFINITY, f64::min);
    let heaviest = categories
        .iter()
        .map(|c| c.birth_weight.end)
        .fold(f64::NEG_INFINITY, f64::max);
    let span = (heaviest - lightest).max(0.0);

    let observed = fraction(0.0);
    let mean_rr = relative_risk * proportion + 1.0 - proportion;
    let up = solve_monotone(fraction, observed / mean_rr, 0.0, span);
    if proportion <= 0.0 {
        return (up, 0.0);
    }
    let shifted = fraction(up);
    let down = solve_monotone(
        |d| (1.0 - proportion) * shifted + proportion * fraction(up - d),
        observed,
        0.0,
        up + span,
    );
    (up, down)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Treatment {
    None,
    Ifa,
    Mmn,
    Bep,
}

impl Treatment {
    pub fn as_str(self) -> &'static str {
        match self {
            Treatment::None => "none",
            Treatment::Ifa => "ifa",
            Treatment::Mmn => "mmn",
            Treatment::Bep => "bep",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "ifa" => Treatment::Ifa,
            "mmn" => Treatment::Mmn,
            "bep" => Treatment::Bep,
            _ => Treatment::None,
        }
    }
}

impl fmt::Display for Treatment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mean birth-weight shift in grams for each treatment.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TreatmentEffects {
    ifa: f64,
    mmn: f64,
    bep: f64,
}

impl TreatmentEffects {
    fn shift(&self, treatment: Treatment) -> f64 {
        match treatment {
            Treatment::None => 0.0,
            Treatment::Ifa => self.ifa,
            Treatment::Mmn => self.mmn,
            Treatment::Bep => self.bep,
        }
    }
}

/// Baseline and scenario supplement coverage. Both assignments compare the same per-mother
/// propensity against their coverage.
pub struct Supplementation {
    view: PopulationView,
    stream: RandomStream,
    scenario: Scenario,
    baseline_coverage: f64,
    scenario_coverage: f64,
}

impl Supplementation {
    pub fn setup(builder: &mut ModelBuilder<'_>) -> Result<Self, SimError> {
        let params = &builder.params().supplementation;
        let scenario = builder.params().scenario;
        let randomness = builder.randomness();
        let anc = params
            .anc_coverage
            .sample(&mut randomness.parameter_rng("anc_coverage_proportion"))?;
        let ifa_among_anc = params
            .ifa_coverage_among_anc
            .sample(&mut randomness.parameter_rng("maternal_ifa_proportion_among_anc"))?;
        let baseline_coverage = ifa_among_anc * anc;
        let scenario_coverage = match scenario {
            Scenario::Baseline => baseline_coverage,
            _ => params.scale_up_fraction * anc,
        };
        let effects = TreatmentEffects {
            ifa: params.ifa_birth_weight_shift,
            mmn: params.mmn_birth_weight_shift,
            bep: params.bep_birth_weight_shift,
        };

        let view = builder.declare_view(
            "maternal_supplementation",
            &[
                (BASELINE_TREATMENT, ColumnKind::Category),
                (TREATMENT, ColumnKind::Category),
            ],
            &[MOTHER_NUTRITION_STATUS],
        )?;
        let stream = builder.stream("maternal_supplementation.propensity")?;

        let bw_view = view.clone();
        builder
            .values()
            .register_value_modifier(EXPOSURE, move |ctx, index, value| {
                let mut frame = value.into_frame(EXPOSURE)?;
                let baseline = ctx.population.categories(&bw_view, BASELINE_TREATMENT)?;
                let treatment = ctx.population.categories(&bw_view, TREATMENT)?;
                let birth_weight = frame.column_mut(BIRTH_WEIGHT)?;
                for (bw, &i) in birth_weight.iter_mut().zip(index) {
                    *bw += effects.shift(Treatment::parse(treatment.get(i)))
                        - effects.shift(Treatment::parse(baseline.get(i)));
                }
                Ok(Signal::Frame(frame))
            });

        info!(
            scenario = %scenario,
            baseline_coverage,
            scenario_coverage,
            "maternal supplementation coverage"
        );
        Ok(Self {
            view,
            stream,
            scenario,
            baseline_coverage,
            scenario_coverage,
        })
    }

    /// Share of all mothers receiving IFA in the baseline.
    pub fn baseline_coverage(&self) -> f64 {
        self.baseline_coverage
    }

    /// Share of all mothers receiving the scenario's supplement.
    pub fn scenario_coverage(&self) -> f64 {
        self.scenario_coverage
    }

    pub fn initialize(
        &self,
        population: &mut PopulationTable,
        index: &[SimulantId],
    ) -> Result<(), SimError> {
        let draws = self.stream.draw(index, None);
        let status = population.categories(&self.view, MOTHER_NUTRITION_STATUS)?;
        let mut baseline = Vec::with_capacity(index.len());
        let mut treatment = Vec::with_capacity(index.len());
        for (&i, &u) in index.iter().zip(&draws) {
            baseline.push(if u < self.baseline_coverage {
                Treatment::Ifa
            } else {
                Treatment::None
            });
            treatment.push(if u < self.scenario_coverage {
                scenario_treatment(self.scenario, status.get(i) == MALNOURISHED)
            } else {
                Treatment::None
            });
        }
        population.update(
            &self.view,
            PopulationUpdate::new(index.to_vec())
                .categories(BASELINE_TREATMENT, baseline.iter().map(|t| t.as_str()).collect())
                .categories(TREATMENT, treatment.iter().map(|t| t.as_str()).collect()),
        )?;
        Ok(())
    }
}

/// Supplement given to a covered mother under `scenario`.
pub fn scenario_treatment(scenario: Scenario, malnourished: bool) -> Treatment {
    match scenario {
        Scenario::Baseline | Scenario::Ifa => Treatment::Ifa,
        Scenario::Mmn => Treatment::Mmn,
        Scenario::Bep => Treatment::Bep,
        Scenario::BepTargeted if malnourished => Treatment::Bep,
        Scenario::BepTargeted => Treatment::Mmn,
    }
}
