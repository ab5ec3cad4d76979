use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::{DataStore, DrawRow, DrawTable, Interval};
use crate::error::{DataError, ExportError};
use crate::export::write_record_batch;

fn read_error(path: &Path, reason: impl ToString) -> DataError {
    DataError::Read {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn float_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> Result<Option<&'a Float64Array>, DataError> {
    match batch.column_by_name(name) {
        None => Ok(None),
        Some(col) => col
            .as_any()
            .downcast_ref::<Float64Array>()
            .map(Some)
            .ok_or_else(|| read_error(path, format!("column '{name}' is not Float64"))),
    }
}

fn string_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> Result<Option<&'a StringArray>, DataError> {
    match batch.column_by_name(name) {
        None => Ok(None),
        Some(col) => col
            .as_any()
            .downcast_ref::<StringArray>()
            .map(Some)
            .ok_or_else(|| read_error(path, format!("column '{name}' is not Utf8"))),
    }
}

fn optional_f64(array: Option<&Float64Array>, i: usize) -> Option<f64> {
    array.and_then(|a| (!a.is_null(i)).then(|| a.value(i)))
}

fn optional_interval(
    start: Option<&Float64Array>,
    end: Option<&Float64Array>,
    i: usize,
) -> Option<Interval> {
    match (optional_f64(start, i), optional_f64(end, i)) {
        (Some(s), Some(e)) => Some(Interval::new(s, e)),
        _ => None,
    }
}

impl DataStore {
    /// Loads a long-format parquet table under `key`.
    ///
    /// Expected columns: `value` (Float64, required) and the optional, nullable stratifiers
    /// `age_start`, `age_end`, `year_start`, `year_end` (Float64), `sex`, `category` (Utf8)
    /// and `draw` (UInt32).
    pub fn read_parquet<P: AsRef<Path>>(&mut self, key: &str, path: P) -> Result<(), DataError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| read_error(path, e))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| read_error(path, e))?
            .build()
            .map_err(|e| read_error(path, e))?;

        let mut table = DrawTable::default();
        for batch in reader {
            let batch = batch.map_err(|e| read_error(path, e))?;
            let value = float_column(&batch, "value", path)?
                .ok_or_else(|| read_error(path, "missing 'value' column"))?;
            let age_start = float_column(&batch, "age_start", path)?;
            let age_end = float_column(&batch, "age_end", path)?;
            let year_start = float_column(&batch, "year_start", path)?;
            let year_end = float_column(&batch, "year_end", path)?;
            let sex = string_column(&batch, "sex", path)?;
            let category = string_column(&batch, "category", path)?;
            let draw = match batch.column_by_name("draw") {
                None => None,
                Some(col) => Some(
                    col.as_any()
                        .downcast_ref::<UInt32Array>()
                        .ok_or_else(|| read_error(path, "column 'draw' is not UInt32"))?,
                ),
            };

            for i in 0..batch.num_rows() {
                let sex = match sex.filter(|a| !a.is_null(i)) {
                    Some(a) => Some(a.value(i).parse().map_err(|e: String| read_error(path, e))?),
                    None => None,
                };
                table.push(DrawRow {
                    sex,
                    age: optional_interval(age_start, age_end, i),
                    year: optional_interval(year_start, year_end, i),
                    draw: draw.and_then(|a| (!a.is_null(i)).then(|| a.value(i))),
                    category: category
                        .filter(|a| !a.is_null(i))
                        .map(|a| a.value(i).to_string()),
                    value: value.value(i),
                });
            }
        }
        self.insert_table(key, table);
        Ok(())
    }
}

/// Writes a table in the layout [DataStore::read_parquet] expects.
pub fn write_draw_table_parquet<P: AsRef<Path>>(
    path: P,
    table: &DrawTable,
) -> Result<(), ExportError> {
    let rows = table.rows();
    let schema = Schema::new(vec![
        Field::new("age_start", DataType::Float64, true),
        Field::new("age_end", DataType::Float64, true),
        Field::new("sex", DataType::Utf8, true),
        Field::new("year_start", DataType::Float64, true),
        Field::new("year_end", DataType::Float64, true),
        Field::new("draw", DataType::UInt32, true),
        Field::new("category", DataType::Utf8, true),
        Field::new("value", DataType::Float64, false),
    ]);

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(Float64Array::from(
            rows.iter().map(|r| r.age.map(|a| a.start)).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            rows.iter().map(|r| r.age.map(|a| a.end)).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter()
                .map(|r| r.sex.map(|s| s.as_str()))
                .collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            rows.iter().map(|r| r.year.map(|y| y.start)).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            rows.iter().map(|r| r.year.map(|y| y.end)).collect::<Vec<_>>(),
        )),
        Arc::new(UInt32Array::from(
            rows.iter().map(|r| r.draw).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter()
                .map(|r| r.category.as_deref())
                .collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            rows.iter().map(|r| r.value).collect::<Vec<_>>(),
        )),
    ];

    write_record_batch(path, schema, arrays)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::Sex;

    #[test]
    fn parquet_layout_reloads_into_the_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("acmr.parquet");
        let table = DrawTable::from_rows(vec![
            DrawRow::new(0.5)
                .sex(Sex::Female)
                .age(0.0, 1.0)
                .year(2019.0, 2020.0)
                .draw(3),
            DrawRow::new(0.25).category("cat1"),
        ]);
        write_draw_table_parquet(&path, &table).expect("write");

        let mut store = DataStore::new();
        store
            .read_parquet("cause.all_causes.cause_specific_mortality_rate", &path)
            .expect("read");
        let loaded = store
            .table("cause.all_causes.cause_specific_mortality_rate")
            .expect("table");
        assert_eq!(loaded, &table);
    }
}
