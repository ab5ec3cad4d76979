//! Interpolation-free lookup tables built from one draw of a [DrawTable].
//!
//! Tables are validated when they are built: every combination of sex, age bin, year bin (and
//! category, for categorical tables) must appear exactly once and bins must tile their range.
//! Lookups clamp to the outermost bins.

use crate::data::{DrawRow, DrawTable, Interval};
use crate::error::{DataError, PipelineError};
use crate::population::{PopulationView, Sex, SimulantId, AGE, SEX};
use crate::values::{PipelineContext, ValueFrame};

#[derive(Debug, Clone, PartialEq)]
pub struct LookupTable {
    key: String,
    by_sex: bool,
    age_bins: Vec<Interval>,
    year_bins: Vec<Interval>,
    categories: Vec<String>,
    values: Vec<f64>,
}

impl LookupTable {
    /// A table that returns `value` for everyone.
    pub fn constant(key: &str, value: f64) -> Self {
        Self {
            key: key.to_string(),
            by_sex: false,
            age_bins: Vec::new(),
            year_bins: Vec::new(),
            categories: Vec::new(),
            values: vec![value],
        }
    }

    /// Scalar table. Rows must not carry a category.
    pub fn build(key: &str, table: &DrawTable, draw: u32) -> Result<Self, DataError> {
        let rows = table.for_draw(draw);
        if rows.iter().any(|r| r.category.is_some()) {
            return Err(DataError::InconsistentStratification {
                key: key.to_string(),
                dimension: "category",
            });
        }
        Self::from_rows(key, rows, draw, Vec::new())
    }

    /// Categorical table with one value per category in `categories` order. Rows for other
    /// categories are ignored.
    pub fn build_categorical(
        key: &str,
        table: &DrawTable,
        draw: u32,
        categories: &[String],
    ) -> Result<Self, DataError> {
        let rows: Vec<&DrawRow> = table
            .for_draw(draw)
            .into_iter()
            .filter(|r| {
                r.category
                    .as_ref()
                    .is_some_and(|c| categories.contains(c))
            })
            .collect();
        Self::from_rows(key, rows, draw, categories.to_vec())
    }

    fn from_rows(
        key: &str,
        rows: Vec<&DrawRow>,
        draw: u32,
        categories: Vec<String>,
    ) -> Result<Self, DataError> {
        if rows.is_empty() {
            return Err(DataError::MissingDraw {
                key: key.to_string(),
                draw,
            });
        }
        let by_sex = stratified(key, &rows, "sex", |r| r.sex.is_some())?;
        let age_bins = bins(key, &rows, "age", |r| r.age)?;
        let year_bins = bins(key, &rows, "year", |r| r.year)?;

        let mut table = Self {
            key: key.to_string(),
            by_sex,
            age_bins,
            year_bins,
            categories,
            values: Vec::new(),
        };
        let n_sex = if by_sex { 2 } else { 1 };
        let size = n_sex
            * table.age_bins.len().max(1)
            * table.year_bins.len().max(1)
            * table.categories.len().max(1);
        let mut values = vec![f64::NAN; size];
        for row in &rows {
            let sex = row.sex.unwrap_or(Sex::Male);
            let age_bin = row.age.map_or(0, |a| bin_of(&table.age_bins, a.start));
            let year_bin = row.year.map_or(0, |y| bin_of(&table.year_bins, y.start));
            let category = match &row.category {
                Some(c) => table
                    .categories
                    .iter()
                    .position(|k| k == c)
                    .unwrap_or(0),
                None => 0,
            };
            let pos = table.offset(sex, age_bin, year_bin) + category;
            if !values[pos].is_nan() {
                return Err(DataError::OverlappingStratum {
                    key: key.to_string(),
                    stratum: describe(row.sex, row.age, row.year, row.category.as_deref()),
                });
            }
            values[pos] = row.value;
        }
        table.values = values;
        table.check_complete()?;
        Ok(table)
    }

    fn check_complete(&self) -> Result<(), DataError> {
        let sexes: &[Sex] = if self.by_sex { &Sex::ALL } else { &[Sex::Male] };
        let ages = optional_bins(&self.age_bins);
        let years = optional_bins(&self.year_bins);
        for &sex in sexes {
            for (a, age) in ages.iter().enumerate() {
                for (y, year) in years.iter().enumerate() {
                    let offset = self.offset(sex, a, y);
                    for c in 0..self.width() {
                        if self.values[offset + c].is_nan() {
                            return Err(DataError::MissingStratum {
                                key: self.key.clone(),
                                stratum: describe(
                                    self.by_sex.then_some(sex),
                                    *age,
                                    *year,
                                    self.categories.get(c).map(String::as_str),
                                ),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn width(&self) -> usize {
        self.categories.len().max(1)
    }

    fn offset(&self, sex: Sex, age_bin: usize, year_bin: usize) -> usize {
        let sex = if self.by_sex && sex == Sex::Female { 1 } else { 0 };
        let n_age = self.age_bins.len().max(1);
        let n_year = self.year_bins.len().max(1);
        ((sex * n_age + age_bin) * n_year + year_bin) * self.width()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Values of the stratum containing (sex, age, year), one per category.
    pub fn row(&self, sex: Sex, age: f64, year: f64) -> &[f64] {
        let age_bin = bin_of(&self.age_bins, age);
        let year_bin = bin_of(&self.year_bins, year);
        let offset = self.offset(sex, age_bin, year_bin);
        &self.values[offset..offset + self.width()]
    }

    pub fn value(&self, sex: Sex, age: f64, year: f64) -> f64 {
        self.row(sex, age, year)[0]
    }

    /// Every stratum row, for validation of categorical distributions.
    pub fn strata(&self) -> impl Iterator<Item = (String, &[f64])> {
        let sexes: Vec<Sex> = if self.by_sex { Sex::ALL.to_vec() } else { vec![Sex::Male] };
        let ages = optional_bins(&self.age_bins);
        let years = optional_bins(&self.year_bins);
        let mut out = Vec::new();
        for sex in sexes {
            for (a, age) in ages.iter().enumerate() {
                for (y, year) in years.iter().enumerate() {
                    let offset = self.offset(sex, a, y);
                    out.push((
                        describe(self.by_sex.then_some(sex), *age, *year, None),
                        &self.values[offset..offset + self.width()],
                    ));
                }
            }
        }
        out.into_iter()
    }

    /// Scalar values for `index`, stratified by the simulants' sex and age.
    pub fn evaluate(
        &self,
        ctx: &PipelineContext<'_>,
        view: &PopulationView,
        index: &[SimulantId],
    ) -> Result<Vec<f64>, PipelineError> {
        let ages = ctx.population.floats(view, AGE)?;
        let sexes = ctx.population.categories(view, SEX)?;
        let year = ctx.time.year;
        index
            .iter()
            .map(|&i| Ok(self.value(parse_sex(sexes.get(i))?, ages[i], year)))
            .collect()
    }

    /// Categorical values for `index` as a frame with one column per category.
    pub fn evaluate_frame(
        &self,
        ctx: &PipelineContext<'_>,
        view: &PopulationView,
        index: &[SimulantId],
    ) -> Result<ValueFrame, PipelineError> {
        let ages = ctx.population.floats(view, AGE)?;
        let sexes = ctx.population.categories(view, SEX)?;
        let year = ctx.time.year;
        let mut columns = vec![Vec::with_capacity(index.len()); self.width()];
        for &i in index {
            let row = self.row(parse_sex(sexes.get(i))?, ages[i], year);
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(*value);
            }
        }
        let mut frame = ValueFrame::new();
        for (name, column) in self.categories.iter().zip(columns) {
            frame.push(name, column);
        }
        Ok(frame)
    }
}

pub(crate) fn parse_sex(value: &str) -> Result<Sex, PipelineError> {
    value.parse().map_err(PipelineError::InvalidSex)
}

fn stratified(
    key: &str,
    rows: &[&DrawRow],
    dimension: &'static str,
    has: impl Fn(&DrawRow) -> bool,
) -> Result<bool, DataError> {
    let count = rows.iter().filter(|r| has(r)).count();
    if count != 0 && count != rows.len() {
        return Err(DataError::InconsistentStratification {
            key: key.to_string(),
            dimension,
        });
    }
    Ok(count != 0)
}

fn bins(
    key: &str,
    rows: &[&DrawRow],
    dimension: &'static str,
    get: impl Fn(&DrawRow) -> Option<Interval>,
) -> Result<Vec<Interval>, DataError> {
    if !stratified(key, rows, dimension, |r| get(r).is_some())? {
        return Ok(Vec::new());
    }
    let mut bins: Vec<Interval> = Vec::new();
    for row in rows {
        if let Some(interval) = get(row) {
            if !bins.contains(&interval) {
                bins.push(interval);
            }
        }
    }
    bins.sort_by(|a, b| a.start.total_cmp(&b.start));
    for pair in bins.windows(2) {
        if pair[0].end != pair[1].start {
            return Err(DataError::NonContiguousBins {
                key: key.to_string(),
                dimension,
            });
        }
    }
    Ok(bins)
}

fn optional_bins(bins: &[Interval]) -> Vec<Option<Interval>> {
    if bins.is_empty() {
        vec![None]
    } else {
        bins.iter().copied().map(Some).collect()
    }
}

/// Bin containing `x`, clamped to the first and last bins.
fn bin_of(bins: &[Interval], x: f64) -> usize {
    if bins.is_empty() {
        return 0;
    }
    bins.partition_point(|b| b.end <= x).min(bins.len() - 1)
}

fn describe(
    sex: Option<Sex>,
    age: Option<Interval>,
    year: Option<Interval>,
    category: Option<&str>,
) -> String {
    let mut parts = Vec::new();
    if let Some(sex) = sex {
        parts.push(format!("sex={sex}"));
    }
    if let Some(age) = age {
        parts.push(format!("age=[{}, {})", age.start, age.end));
    }
    if let Some(year) = year {
        parts.push(format!("year=[{}, {})", year.start, year.end));
    }
    if let Some(category) = category {
        parts.push(format!("category={category}"));
    }
    format!("({})", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn by_sex_and_age() -> DrawTable {
        let mut rows = Vec::new();
        for (sex, base) in [(Sex::Male, 1.0), (Sex::Female, 2.0)] {
            for (i, (start, end)) in [(0.0, 0.1), (0.1, 1.0), (1.0, 5.0)].into_iter().enumerate() {
                rows.push(
                    DrawRow::new(base + i as f64 * 10.0)
                        .sex(sex)
                        .age(start, end)
                        .year(1990.0, 2030.0)
                        .draw(0),
                );
            }
        }
        DrawTable::from_rows(rows)
    }

    #[test]
    fn lookup_bins_by_sex_and_age_and_clamps() {
        let table = LookupTable::build("cause.x.incidence_rate", &by_sex_and_age(), 0).expect("table");
        assert_eq!(table.value(Sex::Male, 0.0, 2020.0), 1.0);
        assert_eq!(table.value(Sex::Male, 0.1, 2020.0), 11.0);
        assert_eq!(table.value(Sex::Female, 4.9, 2020.0), 22.0);
        assert_eq!(table.value(Sex::Female, 80.0, 2050.0), 22.0);
    }

    #[test]
    fn missing_stratum_fails_at_build() {
        let mut rows = by_sex_and_age().rows().to_vec();
        rows.retain(|r| !(r.sex == Some(Sex::Female) && r.age == Some(Interval::new(0.1, 1.0))));
        let err = LookupTable::build("cause.x.incidence_rate", &DrawTable::from_rows(rows), 0)
            .unwrap_err();
        assert!(matches!(err, DataError::MissingStratum { .. }), "{err:?}");
    }

    #[test]
    fn duplicate_and_absent_draws_fail_at_build() {
        let mut table = by_sex_and_age();
        table.push(DrawRow::new(9.0).sex(Sex::Male).age(0.0, 0.1).year(1990.0, 2030.0));
        assert!(matches!(
            LookupTable::build("k", &table, 0),
            Err(DataError::OverlappingStratum { .. })
        ));
        assert!(matches!(
            LookupTable::build("k", &by_sex_and_age(), 1),
            Err(DataError::MissingDraw { draw: 1, .. })
        ));
    }

    #[test]
    fn unrecognized_sex_is_an_error_not_a_default() {
        use crate::clock::SimTime;
        use crate::population::{ColumnKind, PopulationSchema, PopulationUpdate};
        use crate::telemetry::SimTelemetry;
        use crate::values::ValuesBuilder;

        let mut schema = PopulationSchema::new();
        let view = schema
            .declare_view("test", &[(AGE, ColumnKind::Float), (SEX, ColumnKind::Category)], &[])
            .expect("view");
        let mut population = schema.finalize().expect("table");
        let index: Vec<_> = population.create(2).collect();
        population
            .update(
                &view,
                PopulationUpdate::new(index.clone())
                    .fill_float(AGE, 0.0)
                    .categories(SEX, vec!["Female", "unknown"]),
            )
            .expect("update");
        let registry = ValuesBuilder::new().finalize().expect("registry");
        let telemetry = SimTelemetry::default();
        let time = SimTime {
            now: 0.0,
            event_time: 1.0,
            year: 2020.0,
            step_years: 1.0 / 365.25,
        };
        let ctx = PipelineContext::new(&population, &registry, time, &telemetry);
        let table = LookupTable::build("cause.x.incidence_rate", &by_sex_and_age(), 0).expect("table");

        assert_eq!(table.evaluate(&ctx, &view, &index[..1]), Ok(vec![2.0]));
        let err = table.evaluate(&ctx, &view, &index).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidSex(ref message) if message.contains("unknown")));
        assert!(table.evaluate_frame(&ctx, &view, &index[1..]).is_err());
        assert_eq!(parse_sex("Male"), Ok(Sex::Male));
    }

    #[test]
    fn categorical_rows_follow_requested_order() {
        let rows = vec![
            DrawRow::new(0.3).category("cat2"),
            DrawRow::new(0.7).category("cat1"),
            DrawRow::new(0.9).category("unused"),
        ];
        let categories = vec!["cat1".to_string(), "cat2".to_string()];
        let table = LookupTable::build_categorical("k", &DrawTable::from_rows(rows), 0, &categories)
            .expect("table");
        assert_eq!(table.row(Sex::Female, 0.0, 2020.0), &[0.7, 0.3]);
    }
}
