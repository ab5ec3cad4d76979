//! End-of-run parquet export of the population table and run-level metrics.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use crate::error::ExportError;
use crate::population::{ColumnValues, PopulationTable};

pub(crate) fn write_record_batch<P: AsRef<Path>>(
    path: P,
    schema: Schema,
    arrays: Vec<ArrayRef>,
) -> Result<(), ExportError> {
    let schema = Arc::new(schema);
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn column_array(name: &str, values: ColumnValues) -> (Field, ArrayRef) {
    match values {
        ColumnValues::Float(v) => (
            Field::new(name, DataType::Float64, false),
            Arc::new(Float64Array::from(v)),
        ),
        ColumnValues::Time(v) => (
            Field::new(name, DataType::Float64, true),
            Arc::new(Float64Array::from(v)),
        ),
        ColumnValues::Category(v) => (
            Field::new(name, DataType::Utf8, false),
            Arc::new(StringArray::from(v)),
        ),
    }
}

/// One row per simulant with `simulant_id` followed by every initialized column.
/// `Time` columns are nullable; dead and living simulants are both written.
pub fn write_population_parquet<P: AsRef<Path>>(
    path: P,
    table: &PopulationTable,
) -> Result<(), ExportError> {
    let mut fields = vec![Field::new("simulant_id", DataType::UInt64, false)];
    let mut arrays: Vec<ArrayRef> = vec![Arc::new(UInt64Array::from(
        (0..table.size() as u64).collect::<Vec<_>>(),
    ))];
    for (name, values) in table.snapshot() {
        let (field, array) = column_array(&name, values);
        fields.push(field);
        arrays.push(array);
    }
    write_record_batch(path, Schema::new(fields), arrays)
}

pub fn write_metrics_parquet<P: AsRef<Path>>(
    path: P,
    metrics: &BTreeMap<String, f64>,
) -> Result<(), ExportError> {
    let schema = Schema::new(vec![
        Field::new("measure", DataType::Utf8, false),
        Field::new("value", DataType::Float64, false),
    ]);
    let arrays: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(
            metrics.keys().map(String::as_str).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(metrics.values().copied().collect::<Vec<_>>())),
    ];
    write_record_batch(path, schema, arrays)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    use crate::population::{ColumnKind, PopulationSchema, PopulationUpdate};

    #[test]
    fn population_export_writes_one_row_per_simulant() {
        let mut schema = PopulationSchema::new();
        let view = schema
            .declare_view(
                "test",
                &[("age", ColumnKind::Float), ("exit_time", ColumnKind::Time)],
                &[],
            )
            .expect("view");
        let mut table = schema.finalize().expect("table");
        let index: Vec<_> = table.create(3).collect();
        table
            .update(
                &view,
                PopulationUpdate::new(index)
                    .floats("age", vec![0.0, 0.5, 1.0])
                    .times("exit_time", vec![None, Some(12.0), None]),
            )
            .expect("update");

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("population.parquet");
        write_population_parquet(&path, &table).expect("write");

        let file = File::open(&path).expect("open");
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .expect("reader")
            .build()
            .expect("build");
        let batches: Vec<RecordBatch> = reader.collect::<Result<_, _>>().expect("batches");
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 3);
        let schema = batch.schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["simulant_id", "age", "exit_time"]);
        assert_eq!(batch.column(2).null_count(), 2);
    }
}
