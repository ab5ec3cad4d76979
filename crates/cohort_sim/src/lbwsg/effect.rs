use std::sync::Arc;

use crate::data::{DrawRow, DrawTable};
use crate::error::{DataError, SimError};
use crate::lbwsg::distribution::fill_missing_category;
use crate::lbwsg::{LbwsgRisk, EXPOSURE};
use crate::lookup::LookupTable;
use crate::population::{AGE, SEX};
use crate::scenario::ModelBuilder;
use crate::values::Signal;

pub const RELATIVE_RISK_KEY: &str = "risk_factor.low_birth_weight_and_short_gestation.relative_risk";
pub const PAF_KEY: &str =
    "risk_factor.low_birth_weight_and_short_gestation.population_attributable_fraction";

/// Per-category relative risk applied to one target pipeline, with the matching attributable
/// fraction contributed to `<target>.population_attributable_fraction`.
pub struct LbwsgRiskEffect {
    target: String,
    relative_risk: Arc<LookupTable>,
    paf: Option<Arc<LookupTable>>,
}

impl LbwsgRiskEffect {
    pub fn setup(
        builder: &mut ModelBuilder<'_>,
        risk: &LbwsgRisk,
        target: &str,
    ) -> Result<Self, SimError> {
        let draw = builder.input_draw();
        let sources = builder
            .params()
            .lbwsg
            .missing_category_relative_risk_sources
            .clone();
        let rr_rows = fill_missing_category(builder.data().table(RELATIVE_RISK_KEY)?, draw, |stratum| {
            mean_of_sources(stratum, &sources)
        })?;
        let relative_risk = Arc::new(LookupTable::build_categorical(
            RELATIVE_RISK_KEY,
            &rr_rows,
            draw,
            &risk.grid().ids(),
        )?);
        let paf = if builder.data().has_table(PAF_KEY) {
            Some(Arc::new(paf_for_target(
                builder.data().table(PAF_KEY)?,
                draw,
                target,
            )?))
        } else {
            None
        };

        let view = builder.declare_view(&format!("risk_effect.lbwsg.{target}"), &[], &[AGE, SEX])?;
        let exposure = risk.exposure();
        let table = Arc::clone(&relative_risk);
        let rr_view = view.clone();
        let modified = target.to_string();
        builder
            .values()
            .register_value_modifier(target, move |ctx, index, value| {
                let rates = value.into_scalar(&modified)?;
                let categories = ctx
                    .values
                    .call(exposure, ctx, index)?
                    .into_categories(EXPOSURE)?;
                let rr = table.evaluate_frame(ctx, &rr_view, index)?;
                let mut out = Vec::with_capacity(rates.len());
                for (i, (rate, category)) in rates.iter().zip(&categories).enumerate() {
                    out.push(rate * rr.column(category)?[i]);
                }
                Ok(Signal::Scalar(out))
            });

        if let Some(paf) = &paf {
            let paf = Arc::clone(paf);
            builder.values().register_value_modifier(
                &format!("{target}.population_attributable_fraction"),
                move |ctx, index, _| Ok(Signal::Scalar(paf.evaluate(ctx, &view, index)?)),
            );
        }

        Ok(Self {
            target: target.to_string(),
            relative_risk,
            paf,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn relative_risk(&self) -> &LookupTable {
        &self.relative_risk
    }

    pub fn paf(&self) -> Option<&LookupTable> {
        self.paf.as_deref()
    }
}

/// Relative risk for the missing category: mean of the source categories in the same stratum.
fn mean_of_sources(stratum: &[&DrawRow], sources: &[String]) -> Result<f64, DataError> {
    let mut total = 0.0;
    for source in sources {
        let row = stratum
            .iter()
            .find(|r| r.category.as_deref() == Some(source.as_str()))
            .ok_or_else(|| DataError::MissingCategory {
                key: RELATIVE_RISK_KEY.to_string(),
                category: source.clone(),
            })?;
        total += row.value;
    }
    Ok(total / sources.len().max(1) as f64)
}

/// PAF rows name the affected pipeline in their category field.
fn paf_for_target(table: &DrawTable, draw: u32, target: &str) -> Result<LookupTable, DataError> {
    let rows: Vec<DrawRow> = table
        .for_draw(draw)
        .into_iter()
        .filter(|r| r.category.as_deref() == Some(target))
        .map(|r| DrawRow {
            category: None,
            ..r.clone()
        })
        .collect();
    if rows.is_empty() {
        return Err(DataError::MissingCategory {
            key: PAF_KEY.to_string(),
            category: target.to_string(),
        });
    }
    LookupTable::build(PAF_KEY, &DrawTable::from_rows(rows), draw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lbwsg::MISSING_CATEGORY;
    use crate::population::Sex;

    #[test]
    fn missing_category_risk_is_the_mean_of_its_sources() {
        let rows = vec![
            DrawRow::new(2.0).category("cat106"),
            DrawRow::new(4.0).category("cat116"),
            DrawRow::new(9.0).category("cat2"),
        ];
        let stratum: Vec<&DrawRow> = rows.iter().collect();
        let sources = vec!["cat106".to_string(), "cat116".to_string()];
        assert_eq!(mean_of_sources(&stratum, &sources), Ok(3.0));

        let err = mean_of_sources(&stratum[..1], &sources).unwrap_err();
        assert_eq!(
            err,
            DataError::MissingCategory {
                key: RELATIVE_RISK_KEY.to_string(),
                category: "cat116".to_string()
            }
        );
    }

    #[test]
    fn missing_category_rows_are_filled_per_stratum() {
        let mut rows = Vec::new();
        for sex in Sex::ALL {
            let scale = if sex == Sex::Male { 1.0 } else { 2.0 };
            rows.push(DrawRow::new(scale).sex(sex).category("cat106"));
            rows.push(DrawRow::new(3.0 * scale).sex(sex).category("cat116"));
        }
        let sources = vec!["cat106".to_string(), "cat116".to_string()];
        let filled = fill_missing_category(&DrawTable::from_rows(rows), 0, |stratum| {
            mean_of_sources(stratum, &sources)
        })
        .expect("filled");
        let missing: Vec<(Option<Sex>, f64)> = filled
            .rows()
            .iter()
            .filter(|r| r.category.as_deref() == Some(MISSING_CATEGORY))
            .map(|r| (r.sex, r.value))
            .collect();
        assert_eq!(missing, vec![(Some(Sex::Male), 2.0), (Some(Sex::Female), 4.0)]);
    }

    #[test]
    fn paf_rows_are_selected_by_target() {
        let table = DrawTable::from_rows(vec![
            DrawRow::new(0.1).category("affected_unmodeled.csmr"),
            DrawRow::new(0.3).category("measles.excess_mortality_rate"),
        ]);
        let paf = paf_for_target(&table, 0, "measles.excess_mortality_rate").expect("paf");
        assert_eq!(paf.value(Sex::Female, 0.0, 2022.0), 0.3);
        assert!(paf_for_target(&table, 0, "other").is_err());
    }
}
