//! The gestational-age × birth-weight category grid and its continuous → categorical mapping.

use std::cmp::Ordering;

use crate::data::Interval;
use crate::error::LbwsgError;

/// Category absent from the source data, standing in for a hole in the grid.
pub const MISSING_CATEGORY: &str = "cat212";
pub const MISSING_CATEGORY_NAME: &str = "Birth prevalence - [37, 38) wks, [1000, 1500) g";

/// Distance a corrected point is moved inside its target cell.
pub const BOUNDARY_EPSILON: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq)]
pub struct LbwsgCategory {
    pub id: String,
    /// Weeks.
    pub gestation: Interval,
    /// Grams.
    pub birth_weight: Interval,
}

/// Parses `Birth prevalence - [a, b) wks, [c, d) g` into (gestation, birth weight) intervals.
pub fn parse_category_name(name: &str) -> Result<(Interval, Interval), LbwsgError> {
    let invalid = || LbwsgError::InvalidCategoryName(name.to_string());
    let rest = name
        .strip_prefix("Birth prevalence - ")
        .ok_or_else(invalid)?;
    let (gestation, birth_weight) = rest.split_once(" wks, ").ok_or_else(invalid)?;
    let birth_weight = birth_weight.strip_suffix(" g").ok_or_else(invalid)?;
    let interval = |text: &str| -> Option<Interval> {
        let inner = text.strip_prefix('[')?.strip_suffix(')')?;
        let (start, end) = inner.split_once(',')?;
        let start: f64 = start.trim().parse().ok()?;
        let end: f64 = end.trim().parse().ok()?;
        (start < end).then(|| Interval::new(start, end))
    };
    Ok((
        interval(gestation).ok_or_else(invalid)?,
        interval(birth_weight).ok_or_else(invalid)?,
    ))
}

/// Orders ids like `cat2 < cat10 < cat100` by comparing embedded numbers numerically.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let split = |s: &str| {
        let digits = s.len() - s.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        let (prefix, number) = s.split_at(s.len() - digits);
        (prefix.to_string(), number.parse::<u64>().ok())
    };
    let (pa, na) = split(a);
    let (pb, nb) = split(b);
    pa.cmp(&pb).then(na.cmp(&nb)).then_with(|| a.cmp(b))
}

/// One gestation interval and the birth-weight cells defined within it.
#[derive(Debug, Clone)]
struct GestationColumn {
    gestation: Interval,
    /// (birth weight interval, category position), sorted by interval start.
    cells: Vec<(Interval, usize)>,
}

#[derive(Debug, Clone)]
pub struct LbwsgGrid {
    categories: Vec<LbwsgCategory>,
    columns: Vec<GestationColumn>,
    /// Highest gestation end defined for each birth-weight row.
    max_gestation_by_row: Vec<(Interval, f64)>,
    max_gestation: f64,
    max_birth_weight: f64,
    min_birth_weight: f64,
}

impl LbwsgGrid {
    /// Builds the grid from `(id, description)` pairs, adding the missing category when absent.
    /// Categories are kept in natural id order.
    pub fn from_descriptions(descriptions: &[(String, String)]) -> Result<Self, LbwsgError> {
        let mut categories = descriptions
            .iter()
            .map(|(id, name)| {
                let (gestation, birth_weight) = parse_category_name(name)?;
                Ok(LbwsgCategory {
                    id: id.clone(),
                    gestation,
                    birth_weight,
                })
            })
            .collect::<Result<Vec<_>, LbwsgError>>()?;
        if !categories.iter().any(|c| c.id == MISSING_CATEGORY) {
            let (gestation, birth_weight) = parse_category_name(MISSING_CATEGORY_NAME)?;
            categories.push(LbwsgCategory {
                id: MISSING_CATEGORY.to_string(),
                gestation,
                birth_weight,
            });
        }
        Self::new(categories)
    }

    pub fn new(mut categories: Vec<LbwsgCategory>) -> Result<Self, LbwsgError> {
        if categories.is_empty() {
            return Err(LbwsgError::EmptyGrid);
        }
        categories.sort_by(|a, b| natural_cmp(&a.id, &b.id));

        let mut columns: Vec<GestationColumn> = Vec::new();
        for (position, category) in categories.iter().enumerate() {
            match columns.iter_mut().find(|c| c.gestation == category.gestation) {
                Some(column) => column.cells.push((category.birth_weight, position)),
                None => columns.push(GestationColumn {
                    gestation: category.gestation,
                    cells: vec![(category.birth_weight, position)],
                }),
            }
        }
        columns.sort_by(|a, b| a.gestation.start.total_cmp(&b.gestation.start));
        for column in &mut columns {
            column.cells.sort_by(|a, b| a.0.start.total_cmp(&b.0.start));
        }

        let mut max_gestation_by_row: Vec<(Interval, f64)> = Vec::new();
        for category in &categories {
            match max_gestation_by_row
                .iter_mut()
                .find(|(row, _)| *row == category.birth_weight)
            {
                Some((_, max)) => *max = max.max(category.gestation.end),
                None => max_gestation_by_row.push((category.birth_weight, category.gestation.end)),
            }
        }
        max_gestation_by_row.sort_by(|a, b| a.0.start.total_cmp(&b.0.start));

        let fold = |init: f64, f: fn(f64, f64) -> f64, get: fn(&LbwsgCategory) -> f64| {
            categories.iter().map(get).fold(init, f)
        };
        let max_gestation = fold(f64::NEG_INFINITY, f64::max, |c| c.gestation.end);
        let max_birth_weight = fold(f64::NEG_INFINITY, f64::max, |c| c.birth_weight.end);
        let min_birth_weight = fold(f64::INFINITY, f64::min, |c| c.birth_weight.start);

        Ok(Self {
            categories,
            columns,
            max_gestation_by_row,
            max_gestation,
            max_birth_weight,
            min_birth_weight,
        })
    }

    pub fn categories(&self) -> &[LbwsgCategory] {
        &self.categories
    }

    pub fn ids(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.categories.iter().position(|c| c.id == id)
    }

    /// Lowest birth weight covered by any category, the default clipping floor.
    pub fn min_birth_weight(&self) -> f64 {
        self.min_birth_weight
    }

    /// Corner of the theoretical-minimum-risk category: (max gestation, max birth weight).
    pub fn tmrel_corner(&self) -> (f64, f64) {
        (self.max_gestation, self.max_birth_weight)
    }

    /// Position of the category whose cell contains the point, if any.
    pub fn locate(&self, gestation: f64, birth_weight: f64) -> Option<usize> {
        let column = self
            .columns
            .iter()
            .find(|c| c.gestation.contains(gestation))?;
        column
            .cells
            .iter()
            .find(|(interval, _)| interval.contains(birth_weight))
            .map(|(_, position)| *position)
    }

    fn max_gestation_for(&self, birth_weight: f64) -> f64 {
        self.max_gestation_by_row
            .iter()
            .find(|(row, _)| row.contains(birth_weight))
            .map_or(self.max_gestation, |(_, max)| *max)
    }

    fn max_birth_weight_for(&self, gestation: f64) -> f64 {
        self.columns
            .iter()
            .find(|c| c.gestation.contains(gestation))
            .and_then(|c| c.cells.iter().map(|(bw, _)| bw.end).reduce(f64::max))
            .unwrap_or(self.max_birth_weight)
    }

    /// Moves a point that fell outside every cell back inside the grid.
    ///
    /// Birth weight is first clipped to `floor`. A point whose gestation overshoots its
    /// birth-weight row is pulled back to that row's maximum; one whose birth weight overshoots
    /// its gestation column is pulled back to the column's maximum; one overshooting both is
    /// moved to the theoretical-minimum-risk corner. Each clip lands [BOUNDARY_EPSILON] inside the
    /// target cell.
    pub fn correct(
        &self,
        gestation: f64,
        birth_weight: f64,
        floor: f64,
    ) -> Result<(f64, f64), LbwsgError> {
        let birth_weight = birth_weight.max(floor);
        if self.locate(gestation, birth_weight).is_some() {
            return Ok((gestation, birth_weight));
        }
        let row_max = self.max_gestation_for(birth_weight);
        let column_max = self.max_birth_weight_for(gestation);
        let gestation_over = gestation >= row_max;
        let birth_weight_over = birth_weight >= column_max;

        let corrected = match (gestation_over, birth_weight_over) {
            (true, false) => (row_max - BOUNDARY_EPSILON, birth_weight),
            (false, true) => (gestation, column_max - BOUNDARY_EPSILON),
            (true, true) => (
                self.max_gestation - BOUNDARY_EPSILON,
                self.max_birth_weight - BOUNDARY_EPSILON,
            ),
            (false, false) => {
                return Err(LbwsgError::Uncorrectable {
                    gestation_time: gestation,
                    birth_weight,
                })
            }
        };
        match self.locate(corrected.0, corrected.1) {
            Some(_) => Ok(corrected),
            None => Err(LbwsgError::Uncorrectable {
                gestation_time: gestation,
                birth_weight,
            }),
        }
    }

    /// Category position for a continuous point, correcting it first if needed.
    pub fn categorize(
        &self,
        gestation: f64,
        birth_weight: f64,
        floor: f64,
    ) -> Result<usize, LbwsgError> {
        let (gestation, birth_weight) = self.correct(gestation, birth_weight, floor)?;
        self.locate(gestation, birth_weight)
            .ok_or(LbwsgError::Uncorrectable {
                gestation_time: gestation,
                birth_weight,
            })
    }
}
