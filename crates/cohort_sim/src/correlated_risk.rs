//! Child growth failure (wasting, stunting) correlated with birth weight.
//!
//! Each newborn's growth-failure propensity is drawn from the standard bivariate normal
//! conditional on the probit of its birth-weight percentile:
//! `propensity = Φ(ρ·Φ⁻¹(bw_pct) + √(1 − ρ²)·Φ⁻¹(u))`. The run-level correlation ρ is either
//! fixed or drawn once per input draw from a truncated normal prior.

use rand::Rng;
use tracing::info;

use crate::error::{PipelineError, SimError};
use crate::lbwsg::BIRTH_WEIGHT_PERCENTILE;
use crate::lookup::LookupTable;
use crate::population::{
    ColumnKind, PopulationTable, PopulationUpdate, PopulationView, SimulantId, AGE, SEX,
};
use crate::randomness::RandomStream;
use crate::scenario::{CorrelatedRiskParams, CorrelationSpec, ModelBuilder};
use crate::stats::{confidence_interval_sd, normal_cdf, probit, truncated_normal_quantile};
use crate::values::{PipelineContext, Signal, ValueHandle, ValueProducer};

/// Exposure category boundaries on the z-score scale, lowest category first.
const CATEGORY_THRESHOLDS: [(f64, &str); 3] = [(-3.0, "cat1"), (-2.0, "cat2"), (-1.0, "cat3")];
const TOP_CATEGORY: &str = "cat4";

pub struct CorrelatedRisk {
    risk: String,
    view: PopulationView,
    stream: RandomStream,
    rho: f64,
    propensity_column: String,
    propensity: ValueHandle,
    exposure: ValueHandle,
}

impl CorrelatedRisk {
    pub fn setup(
        builder: &mut ModelBuilder<'_>,
        params: &CorrelatedRiskParams,
    ) -> Result<Self, SimError> {
        let risk = params.risk.clone();
        let rho = match params.correlation {
            CorrelationSpec::Fixed { rho } => rho,
            CorrelationSpec::Prior {
                mean,
                lower,
                upper,
                clip_lower,
                clip_upper,
            } => {
                let u: f64 = builder
                    .randomness()
                    .parameter_rng(&format!("{risk}.correlation"))
                    .gen();
                truncated_normal_quantile(
                    mean,
                    confidence_interval_sd(lower, upper),
                    clip_lower,
                    clip_upper,
                    u,
                )
            }
        };
        info!(risk = %risk, rho, "birth weight correlation");

        let mean = builder.lookup(&format!("risk_factor.{risk}.exposure"))?;
        let sd = builder.lookup(&format!("risk_factor.{risk}.exposure_standard_deviation"))?;

        let propensity_column = format!("{risk}_propensity");
        let view = builder.declare_view(
            &risk,
            &[(propensity_column.as_str(), ColumnKind::Float)],
            &[BIRTH_WEIGHT_PERCENTILE, AGE, SEX],
        )?;
        let stream = builder.stream(&format!("initial_{risk}_propensity"))?;

        let source_view = view.clone();
        let source_column = propensity_column.clone();
        let propensity = builder.values().register_value_producer(
            &format!("{risk}.propensity"),
            ValueProducer::new(move |ctx, index| {
                let column = ctx.population.floats(&source_view, &source_column)?;
                Ok(Signal::Scalar(index.iter().map(|&i| column[i]).collect()))
            }),
        )?;

        let exposure_view = view.clone();
        let propensity_name = format!("{risk}.propensity");
        let exposure_name = format!("{risk}.exposure");
        let post_name = exposure_name.clone();
        let exposure = builder.values().register_value_producer(
            &exposure_name,
            ValueProducer::new(move |ctx, index| {
                let p = ctx
                    .values
                    .call(propensity, ctx, index)?
                    .into_scalar(&propensity_name)?;
                z_scores(&mean, &sd, ctx, &exposure_view, index, &p).map(Signal::Scalar)
            })
            .post_processor(move |_, _, value| {
                let z = value.into_scalar(&post_name)?;
                Ok(Signal::Categories(
                    z.iter().map(|&z| exposure_category(z).to_string()).collect(),
                ))
            }),
        )?;

        Ok(Self {
            risk,
            view,
            stream,
            rho,
            propensity_column,
            propensity,
            exposure,
        })
    }

    pub fn risk(&self) -> &str {
        &self.risk
    }

    /// Run-level correlation with birth weight.
    pub fn rho(&self) -> f64 {
        self.rho
    }

    pub fn propensity(&self) -> ValueHandle {
        self.propensity
    }

    pub fn exposure(&self) -> ValueHandle {
        self.exposure
    }

    /// Draws each newborn's propensity from its birth-weight percentile.
    pub fn initialize(
        &self,
        population: &mut PopulationTable,
        index: &[SimulantId],
    ) -> Result<(), SimError> {
        let column = population.floats(&self.view, BIRTH_WEIGHT_PERCENTILE)?;
        let percentiles = open_unit_interval(&index.iter().map(|&i| column[i]).collect::<Vec<_>>());
        let draws = self.stream.draw(index, None);
        let propensity = correlated_propensity(self.rho, &percentiles, &draws);
        population.update(
            &self.view,
            PopulationUpdate::new(index.to_vec()).floats(&self.propensity_column, propensity),
        )?;
        Ok(())
    }
}

fn z_scores(
    mean: &LookupTable,
    sd: &LookupTable,
    ctx: &PipelineContext<'_>,
    view: &PopulationView,
    index: &[SimulantId],
    propensity: &[f64],
) -> Result<Vec<f64>, PipelineError> {
    let mean = mean.evaluate(ctx, view, index)?;
    let sd = sd.evaluate(ctx, view, index)?;
    Ok(propensity
        .iter()
        .zip(mean.iter().zip(&sd))
        .map(|(p, (m, s))| m + s * probit(*p))
        .collect())
}

/// Samples `Φ(ρ·Φ⁻¹(p) + √(1 − ρ²)·Φ⁻¹(u))` for each percentile and uniform draw.
pub fn correlated_propensity(rho: f64, percentiles: &[f64], draws: &[f64]) -> Vec<f64> {
    let spread = (1.0 - rho * rho).sqrt();
    percentiles
        .iter()
        .zip(draws)
        .map(|(p, u)| normal_cdf(rho * probit(*p) + spread * probit(*u)))
        .collect()
}

/// Moves values at 0 or 1 halfway toward the nearest value strictly inside (0, 1), so their
/// probit stays finite.
pub fn open_unit_interval(values: &[f64]) -> Vec<f64> {
    let inner = values.iter().copied().filter(|v| *v > 0.0 && *v < 1.0);
    let lowest = inner.clone().fold(f64::INFINITY, f64::min);
    let highest = inner.fold(f64::NEG_INFINITY, f64::max);
    let lowest = if lowest.is_finite() { lowest } else { 0.5 };
    let highest = if highest.is_finite() { highest } else { 0.5 };
    values
        .iter()
        .map(|&v| {
            if v <= 0.0 {
                lowest / 2.0
            } else if v >= 1.0 {
                (1.0 + highest) / 2.0
            } else {
                v
            }
        })
        .collect()
}

/// Growth-failure category of a z-score.
pub fn exposure_category(z: f64) -> &'static str {
    CATEGORY_THRESHOLDS
        .iter()
        .find(|(upper, _)| z < *upper)
        .map_or(TOP_CATEGORY, |&(_, category)| category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::percentile_ranks;

    #[test]
    fn categories_follow_z_score_thresholds() {
        assert_eq!(exposure_category(-3.5), "cat1");
        assert_eq!(exposure_category(-3.0), "cat2");
        assert_eq!(exposure_category(-2.01), "cat2");
        assert_eq!(exposure_category(-1.5), "cat3");
        assert_eq!(exposure_category(-1.0), "cat4");
        assert_eq!(exposure_category(f64::NEG_INFINITY), "cat1");
        assert_eq!(exposure_category(f64::INFINITY), "cat4");
    }

    #[test]
    fn edge_percentiles_are_pulled_inside_the_unit_interval() {
        let ranks = percentile_ranks(&[10.0, 20.0, 30.0, 40.0]);
        assert_eq!(ranks[3], 1.0);
        let nudged = open_unit_interval(&ranks);
        assert_eq!(nudged[..3], ranks[..3]);
        assert!((nudged[3] - 0.875).abs() < 1e-12);
        assert!(nudged.iter().all(|p| probit(*p).is_finite()));
        assert_eq!(open_unit_interval(&[1.0]), vec![0.75]);
    }

    #[test]
    fn zero_correlation_ignores_birth_weight() {
        let draws = [0.1, 0.5, 0.9];
        let a = correlated_propensity(0.0, &[0.01, 0.5, 0.99], &draws);
        let b = correlated_propensity(0.0, &[0.99, 0.2, 0.01], &draws);
        for ((x, y), u) in a.iter().zip(&b).zip(&draws) {
            assert!((x - y).abs() < 1e-9);
            assert!((x - u).abs() < 1e-6);
        }
    }

    #[test]
    fn positive_correlation_raises_propensity_with_percentile() {
        let low = correlated_propensity(0.5, &[0.1], &[0.5])[0];
        let high = correlated_propensity(0.5, &[0.9], &[0.5])[0];
        assert!(low < 0.5 && high > 0.5);
    }
}
