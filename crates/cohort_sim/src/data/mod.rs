//! Draw-indexed input data addressed by `<entity_type>.<entity_name>.<measure>` keys.
//!
//! Tables are stored in long format: one row per (sex, age bin, year bin, draw, category).
//! Any stratifying field may be absent when a measure does not vary along it.

mod io;

use std::collections::BTreeMap;

pub use io::write_draw_table_parquet;
use crate::error::DataError;
use crate::population::Sex;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, x: f64) -> bool {
        self.start <= x && x < self.end
    }

    pub fn width(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawRow {
    pub sex: Option<Sex>,
    pub age: Option<Interval>,
    pub year: Option<Interval>,
    /// `None` applies the row to every draw.
    pub draw: Option<u32>,
    pub category: Option<String>,
    pub value: f64,
}

impl DrawRow {
    pub fn new(value: f64) -> Self {
        Self {
            sex: None,
            age: None,
            year: None,
            draw: None,
            category: None,
            value,
        }
    }

    pub fn sex(mut self, sex: Sex) -> Self {
        self.sex = Some(sex);
        self
    }

    pub fn age(mut self, start: f64, end: f64) -> Self {
        self.age = Some(Interval::new(start, end));
        self
    }

    pub fn year(mut self, start: f64, end: f64) -> Self {
        self.year = Some(Interval::new(start, end));
        self
    }

    pub fn draw(mut self, draw: u32) -> Self {
        self.draw = Some(draw);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawTable {
    rows: Vec<DrawRow>,
}

impl DrawTable {
    pub fn from_rows(rows: Vec<DrawRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[DrawRow] {
        &self.rows
    }

    pub fn push(&mut self, row: DrawRow) {
        self.rows.push(row);
    }

    /// Rows that apply to `draw`.
    pub fn for_draw(&self, draw: u32) -> Vec<&DrawRow> {
        self.rows
            .iter()
            .filter(|r| r.draw.map_or(true, |d| d == draw))
            .collect()
    }
}

/// In-memory artifact store consumed at wiring time.
#[derive(Debug, Clone, Default)]
pub struct DataStore {
    tables: BTreeMap<String, DrawTable>,
    categories: BTreeMap<String, Vec<(String, String)>>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_table(&mut self, key: &str, table: DrawTable) {
        self.tables.insert(key.to_string(), table);
    }

    /// Stores a category id → description map, such as the LBWSG category names.
    pub fn insert_categories(&mut self, key: &str, categories: Vec<(String, String)>) {
        self.categories.insert(key.to_string(), categories);
    }

    pub fn has_table(&self, key: &str) -> bool {
        self.tables.contains_key(key)
    }

    pub fn table(&self, key: &str) -> Result<&DrawTable, DataError> {
        self.tables.get(key).ok_or_else(|| DataError::MissingKey {
            key: key.to_string(),
        })
    }

    pub fn categories(&self, key: &str) -> Result<&[(String, String)], DataError> {
        self.categories
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| DataError::MissingKey {
                key: key.to_string(),
            })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tables
            .keys()
            .chain(self.categories.keys())
            .map(String::as_str)
    }
}
