//! Population table: one row per simulant, typed columns, append-only.
//!
//! Components declare at wiring time which columns they create (and therefore own) and which
//! they read. The declarations are validated once against the shared table by
//! [PopulationSchema::finalize]; afterwards every access goes through a [PopulationView] and is
//! checked against those declarations.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::error::{PopulationError, WiringError};

/// Stable simulant index. Rows are never removed, so an id is never reused within a run.
pub type SimulantId = usize;

pub const AGE: &str = "age";
pub const SEX: &str = "sex";
pub const ALIVE: &str = "alive";
pub const ENTRANCE_TIME: &str = "entrance_time";
pub const EXIT_TIME: &str = "exit_time";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub const ALL: [Sex; 2] = [Sex::Male, Sex::Female];

    pub fn as_str(self) -> &'static str {
        match self {
            Sex::Male => "Male",
            Sex::Female => "Female",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Male" | "male" => Ok(Sex::Male),
            "Female" | "female" => Ok(Sex::Female),
            other => Err(format!("unknown sex '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliveStatus {
    Alive,
    Dead,
    Untracked,
}

impl AliveStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AliveStatus::Alive => "alive",
            AliveStatus::Dead => "dead",
            AliveStatus::Untracked => "untracked",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Float,
    /// Optional time stamp in simulation days, unset until the event happens.
    Time,
    Category,
}

impl ColumnKind {
    fn name(self) -> &'static str {
        match self {
            ColumnKind::Float => "float",
            ColumnKind::Time => "time",
            ColumnKind::Category => "category",
        }
    }
}

/// Owned column values for a subset of simulants.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Float(Vec<f64>),
    Time(Vec<Option<f64>>),
    Category(Vec<String>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Float(v) => v.len(),
            ColumnValues::Time(v) => v.len(),
            ColumnValues::Category(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn kind(&self) -> ColumnKind {
        match self {
            ColumnValues::Float(_) => ColumnKind::Float,
            ColumnValues::Time(_) => ColumnKind::Time,
            ColumnValues::Category(_) => ColumnKind::Category,
        }
    }
}

/// Interned categorical storage.
#[derive(Debug, Clone, Default)]
struct CategoryStore {
    levels: Vec<String>,
    codes: Vec<u32>,
}

impl CategoryStore {
    const UNSET: u32 = u32::MAX;

    fn code_for(&mut self, level: &str) -> u32 {
        match self.levels.iter().position(|l| l == level) {
            Some(pos) => pos as u32,
            None => {
                self.levels.push(level.to_string());
                (self.levels.len() - 1) as u32
            }
        }
    }

    fn get(&self, id: SimulantId) -> &str {
        match self.codes[id] {
            Self::UNSET => "",
            code => &self.levels[code as usize],
        }
    }
}

#[derive(Debug, Clone)]
enum ColumnStore {
    Float(Vec<f64>),
    Time(Vec<Option<f64>>),
    Category(CategoryStore),
}

impl ColumnStore {
    fn new(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Float => ColumnStore::Float(Vec::new()),
            ColumnKind::Time => ColumnStore::Time(Vec::new()),
            ColumnKind::Category => ColumnStore::Category(CategoryStore::default()),
        }
    }

    fn kind(&self) -> ColumnKind {
        match self {
            ColumnStore::Float(_) => ColumnKind::Float,
            ColumnStore::Time(_) => ColumnKind::Time,
            ColumnStore::Category(_) => ColumnKind::Category,
        }
    }

    fn grow(&mut self, n: usize) {
        match self {
            ColumnStore::Float(v) => v.resize(v.len() + n, f64::NAN),
            ColumnStore::Time(v) => v.resize(v.len() + n, None),
            ColumnStore::Category(c) => c.codes.resize(c.codes.len() + n, CategoryStore::UNSET),
        }
    }
}

#[derive(Debug, Clone)]
struct Column {
    owner: String,
    store: ColumnStore,
    initialized: bool,
}

/// A component's declared access to the population table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulationView {
    component: String,
    reads: BTreeSet<String>,
    writes: BTreeSet<String>,
}

impl PopulationView {
    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn can_read(&self, column: &str) -> bool {
        self.reads.contains(column) || self.writes.contains(column)
    }

    pub fn owns(&self, column: &str) -> bool {
        self.writes.contains(column)
    }
}

/// Wiring-time collection of column declarations.
#[derive(Debug, Default)]
pub struct PopulationSchema {
    columns: BTreeMap<String, (ColumnKind, String)>,
    views: Vec<PopulationView>,
}

impl PopulationSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares that `component` creates the columns in `creates` and reads those in `reads`.
    pub fn declare_view(
        &mut self,
        component: &str,
        creates: &[(&str, ColumnKind)],
        reads: &[&str],
    ) -> Result<PopulationView, WiringError> {
        for (column, kind) in creates {
            if let Some((_, owner)) = self.columns.get(*column) {
                return Err(WiringError::ColumnOwnedTwice {
                    column: column.to_string(),
                    first: owner.clone(),
                    second: component.to_string(),
                });
            }
            self.columns
                .insert(column.to_string(), (*kind, component.to_string()));
        }
        let view = PopulationView {
            component: component.to_string(),
            reads: reads.iter().map(|c| c.to_string()).collect(),
            writes: creates.iter().map(|(c, _)| c.to_string()).collect(),
        };
        self.views.push(view.clone());
        Ok(view)
    }

    /// Checks every declared read against the declared columns and builds the empty table.
    pub fn finalize(self) -> Result<PopulationTable, WiringError> {
        for view in &self.views {
            for column in &view.reads {
                if !self.columns.contains_key(column) {
                    return Err(WiringError::MissingColumn {
                        component: view.component.clone(),
                        column: column.clone(),
                    });
                }
            }
        }
        let columns = self
            .columns
            .into_iter()
            .map(|(name, (kind, owner))| {
                (
                    name,
                    Column {
                        owner,
                        store: ColumnStore::new(kind),
                        initialized: false,
                    },
                )
            })
            .collect();
        Ok(PopulationTable { size: 0, columns })
    }
}

/// Values read for a subset of simulants.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationFrame {
    pub index: Vec<SimulantId>,
    columns: BTreeMap<String, ColumnValues>,
}

impl PopulationFrame {
    pub fn column(&self, name: &str) -> Result<&ColumnValues, PopulationError> {
        self.columns
            .get(name)
            .ok_or_else(|| PopulationError::UnknownColumn {
                column: name.to_string(),
            })
    }

    pub fn floats(&self, name: &str) -> Result<&[f64], PopulationError> {
        match self.column(name)? {
            ColumnValues::Float(v) => Ok(v),
            other => Err(wrong_kind(name, ColumnKind::Float, other.kind())),
        }
    }

    pub fn times(&self, name: &str) -> Result<&[Option<f64>], PopulationError> {
        match self.column(name)? {
            ColumnValues::Time(v) => Ok(v),
            other => Err(wrong_kind(name, ColumnKind::Time, other.kind())),
        }
    }

    pub fn categories(&self, name: &str) -> Result<&[String], PopulationError> {
        match self.column(name)? {
            ColumnValues::Category(v) => Ok(v),
            other => Err(wrong_kind(name, ColumnKind::Category, other.kind())),
        }
    }
}

/// A partial frame merged into the table by index and column.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationUpdate {
    index: Vec<SimulantId>,
    columns: Vec<(String, ColumnValues)>,
}

impl PopulationUpdate {
    pub fn new(index: Vec<SimulantId>) -> Self {
        Self {
            index,
            columns: Vec::new(),
        }
    }

    pub fn index(&self) -> &[SimulantId] {
        &self.index
    }

    pub fn floats(mut self, column: &str, values: Vec<f64>) -> Self {
        self.columns
            .push((column.to_string(), ColumnValues::Float(values)));
        self
    }

    pub fn fill_float(self, column: &str, value: f64) -> Self {
        let n = self.index.len();
        self.floats(column, vec![value; n])
    }

    pub fn times(mut self, column: &str, values: Vec<Option<f64>>) -> Self {
        self.columns
            .push((column.to_string(), ColumnValues::Time(values)));
        self
    }

    pub fn fill_time(self, column: &str, value: Option<f64>) -> Self {
        let n = self.index.len();
        self.times(column, vec![value; n])
    }

    pub fn categories<S: Into<String>>(mut self, column: &str, values: Vec<S>) -> Self {
        self.columns.push((
            column.to_string(),
            ColumnValues::Category(values.into_iter().map(Into::into).collect()),
        ));
        self
    }

    pub fn fill_category(self, column: &str, value: &str) -> Self {
        let n = self.index.len();
        self.categories(column, vec![value; n])
    }
}

/// Borrowed categorical column, indexed by simulant id.
#[derive(Debug, Clone, Copy)]
pub struct CategoryColumn<'a> {
    store: &'a CategoryStore,
}

impl<'a> CategoryColumn<'a> {
    pub fn get(&self, id: SimulantId) -> &'a str {
        self.store.get(id)
    }
}

#[derive(Debug, Resource)]
pub struct PopulationTable {
    size: usize,
    columns: BTreeMap<String, Column>,
}

impl PopulationTable {
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Appends `n` rows. Every column grows with an unset value; owners fill the new rows during
    /// their initialization step.
    pub fn create(&mut self, n: usize) -> Range<SimulantId> {
        let start = self.size;
        for column in self.columns.values_mut() {
            column.store.grow(n);
        }
        self.size += n;
        start..self.size
    }

    /// Reads `columns` for the simulants in `index`.
    pub fn get(
        &self,
        view: &PopulationView,
        index: &[SimulantId],
        columns: &[&str],
    ) -> Result<PopulationFrame, PopulationError> {
        self.check_index(index)?;
        let mut out = BTreeMap::new();
        for name in columns {
            let column = self.readable(view, name)?;
            let values = match &column.store {
                ColumnStore::Float(v) => ColumnValues::Float(index.iter().map(|&i| v[i]).collect()),
                ColumnStore::Time(v) => ColumnValues::Time(index.iter().map(|&i| v[i]).collect()),
                ColumnStore::Category(c) => ColumnValues::Category(
                    index.iter().map(|&i| c.get(i).to_string()).collect(),
                ),
            };
            out.insert(name.to_string(), values);
        }
        Ok(PopulationFrame {
            index: index.to_vec(),
            columns: out,
        })
    }

    /// Full float column indexed by simulant id.
    pub fn floats(&self, view: &PopulationView, name: &str) -> Result<&[f64], PopulationError> {
        match &self.readable(view, name)?.store {
            ColumnStore::Float(v) => Ok(v),
            other => Err(wrong_kind(name, ColumnKind::Float, other.kind())),
        }
    }

    /// Full time column indexed by simulant id.
    pub fn times(
        &self,
        view: &PopulationView,
        name: &str,
    ) -> Result<&[Option<f64>], PopulationError> {
        match &self.readable(view, name)?.store {
            ColumnStore::Time(v) => Ok(v),
            other => Err(wrong_kind(name, ColumnKind::Time, other.kind())),
        }
    }

    /// Full categorical column indexed by simulant id.
    pub fn categories(
        &self,
        view: &PopulationView,
        name: &str,
    ) -> Result<CategoryColumn<'_>, PopulationError> {
        match &self.readable(view, name)?.store {
            ColumnStore::Category(store) => Ok(CategoryColumn { store }),
            other => Err(wrong_kind(name, ColumnKind::Category, other.kind())),
        }
    }

    /// Ids of every simulant whose alive status is `alive`.
    pub fn alive_index(&self, view: &PopulationView) -> Result<Vec<SimulantId>, PopulationError> {
        self.filter_category(view, ALIVE, AliveStatus::Alive.as_str())
    }

    /// Ids of every simulant whose categorical `column` equals `level`.
    pub fn filter_category(
        &self,
        view: &PopulationView,
        column: &str,
        level: &str,
    ) -> Result<Vec<SimulantId>, PopulationError> {
        let values = self.categories(view, column)?;
        Ok((0..self.size).filter(|&i| values.get(i) == level).collect())
    }

    /// Merges `update` into the table. Only the columns the view owns may be written.
    pub fn update(
        &mut self,
        view: &PopulationView,
        update: PopulationUpdate,
    ) -> Result<(), PopulationError> {
        self.check_index(&update.index)?;
        let index = update.index;
        for (name, values) in update.columns {
            if !view.owns(&name) {
                return Err(PopulationError::NotOwner {
                    component: view.component.clone(),
                    column: name,
                });
            }
            if values.len() != index.len() {
                return Err(PopulationError::LengthMismatch {
                    column: name,
                    values: values.len(),
                    index: index.len(),
                });
            }
            let column = self
                .columns
                .get_mut(&name)
                .ok_or_else(|| PopulationError::UnknownColumn {
                    column: name.clone(),
                })?;
            match (&mut column.store, values) {
                (ColumnStore::Float(store), ColumnValues::Float(values)) => {
                    for (&i, v) in index.iter().zip(values) {
                        store[i] = v;
                    }
                }
                (ColumnStore::Time(store), ColumnValues::Time(values)) => {
                    for (&i, v) in index.iter().zip(values) {
                        store[i] = v;
                    }
                }
                (ColumnStore::Category(store), ColumnValues::Category(values)) => {
                    for (&i, v) in index.iter().zip(values) {
                        let code = store.code_for(&v);
                        store.codes[i] = code;
                    }
                }
                (store, values) => {
                    return Err(wrong_kind(&name, store.kind(), values.kind()));
                }
            }
            column.initialized = true;
        }
        Ok(())
    }

    /// Owner of a column, for diagnostics and export.
    pub fn owner(&self, column: &str) -> Option<&str> {
        self.columns.get(column).map(|c| c.owner.as_str())
    }

    /// Snapshot of every initialized column for all simulants, bypassing view checks.
    /// Used by end-of-run export.
    pub fn snapshot(&self) -> Vec<(String, ColumnValues)> {
        self.columns
            .iter()
            .filter(|(_, c)| c.initialized)
            .map(|(name, column)| {
                let values = match &column.store {
                    ColumnStore::Float(v) => ColumnValues::Float(v.clone()),
                    ColumnStore::Time(v) => ColumnValues::Time(v.clone()),
                    ColumnStore::Category(c) => ColumnValues::Category(
                        (0..self.size).map(|i| c.get(i).to_string()).collect(),
                    ),
                };
                (name.clone(), values)
            })
            .collect()
    }

    fn readable(&self, view: &PopulationView, name: &str) -> Result<&Column, PopulationError> {
        if !view.can_read(name) {
            return Err(PopulationError::UndeclaredRead {
                component: view.component.clone(),
                column: name.to_string(),
            });
        }
        let column = self
            .columns
            .get(name)
            .ok_or_else(|| PopulationError::UnknownColumn {
                column: name.to_string(),
            })?;
        if !column.initialized {
            return Err(PopulationError::ColumnNotInitialized {
                column: name.to_string(),
            });
        }
        Ok(column)
    }

    fn check_index(&self, index: &[SimulantId]) -> Result<(), PopulationError> {
        match index.iter().find(|&&i| i >= self.size) {
            Some(&id) => Err(PopulationError::IndexOutOfRange {
                id,
                size: self.size,
            }),
            None => Ok(()),
        }
    }
}

fn wrong_kind(column: &str, expected: ColumnKind, actual: ColumnKind) -> PopulationError {
    PopulationError::WrongKind {
        column: column.to_string(),
        expected: expected.name(),
        actual: actual.name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_component_table() -> (PopulationTable, PopulationView, PopulationView) {
        let mut schema = PopulationSchema::new();
        let base = schema
            .declare_view(
                "population",
                &[(AGE, ColumnKind::Float), (ALIVE, ColumnKind::Category)],
                &[],
            )
            .expect("base view");
        let disease = schema
            .declare_view("measles", &[("measles", ColumnKind::Category)], &[AGE, ALIVE])
            .expect("disease view");
        let table = schema.finalize().expect("schema");
        (table, base, disease)
    }

    #[test]
    fn create_appends_stable_ids() {
        let (mut table, base, _) = two_component_table();
        assert_eq!(table.create(3), 0..3);
        assert_eq!(table.create(2), 3..5);
        table
            .update(
                &base,
                PopulationUpdate::new((0..5).collect())
                    .fill_float(AGE, 0.0)
                    .fill_category(ALIVE, "alive"),
            )
            .expect("update");
        assert_eq!(table.size(), 5);
        assert_eq!(table.alive_index(&base).expect("alive"), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn update_merges_by_index_and_column() {
        let (mut table, base, disease) = two_component_table();
        table.create(4);
        table
            .update(
                &base,
                PopulationUpdate::new(vec![0, 1, 2, 3])
                    .floats(AGE, vec![0.0, 0.1, 0.2, 0.3])
                    .fill_category(ALIVE, "alive"),
            )
            .expect("init");
        table
            .update(
                &base,
                PopulationUpdate::new(vec![2]).categories(ALIVE, vec!["dead"]),
            )
            .expect("partial update");

        let frame = table
            .get(&disease, &[1, 2], &[AGE, ALIVE])
            .expect("frame");
        assert_eq!(frame.floats(AGE).expect("age"), &[0.1, 0.2]);
        assert_eq!(
            frame.categories(ALIVE).expect("alive"),
            &["alive".to_string(), "dead".to_string()]
        );
        assert_eq!(table.alive_index(&disease).expect("alive"), vec![0, 1, 3]);
    }

    #[test]
    fn reading_before_owner_initializes_fails() {
        let (mut table, _, disease) = two_component_table();
        table.create(1);
        assert_eq!(
            table.floats(&disease, AGE).unwrap_err(),
            PopulationError::ColumnNotInitialized {
                column: AGE.to_string()
            }
        );
    }

    #[test]
    fn non_owner_write_is_rejected() {
        let (mut table, _, disease) = two_component_table();
        table.create(1);
        let err = table
            .update(&disease, PopulationUpdate::new(vec![0]).fill_float(AGE, 1.0))
            .unwrap_err();
        assert_eq!(
            err,
            PopulationError::NotOwner {
                component: "measles".to_string(),
                column: AGE.to_string()
            }
        );
    }

    #[test]
    fn undeclared_read_is_rejected() {
        let (mut table, base, _) = two_component_table();
        table.create(1);
        assert!(matches!(
            table.categories(&base, "measles"),
            Err(PopulationError::UndeclaredRead { .. })
        ));
    }

    #[test]
    fn schema_rejects_second_owner_and_unknown_reads() {
        let mut schema = PopulationSchema::new();
        schema
            .declare_view("population", &[(AGE, ColumnKind::Float)], &[])
            .expect("first");
        let err = schema
            .declare_view("other", &[(AGE, ColumnKind::Float)], &[])
            .unwrap_err();
        assert!(matches!(err, WiringError::ColumnOwnedTwice { .. }));

        let mut schema = PopulationSchema::new();
        schema
            .declare_view("mortality", &[], &["cause_of_death"])
            .expect("view");
        assert_eq!(
            schema.finalize().unwrap_err(),
            WiringError::MissingColumn {
                component: "mortality".to_string(),
                column: "cause_of_death".to_string()
            }
        );
    }
}
