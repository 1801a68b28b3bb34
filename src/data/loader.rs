use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, AsArray};
use arrow::datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type, UInt16Type, UInt32Type};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{FeatureTable, MetadataValue, ObjectRecord};

/// Names of the id columns. Everything else is a feature / metadata column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderOptions {
    pub image_column: String,
    pub object_column: String,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            image_column: "ImageNumber".to_string(),
            object_column: "ObjectNumber".to_string(),
        }
    }
}

impl LoaderOptions {
    /// Split a parsed row into its ids and remaining values.
    fn build_record(
        &self,
        row: usize,
        mut values: BTreeMap<String, MetadataValue>,
    ) -> Result<ObjectRecord> {
        let image_id = take_id(&mut values, &self.image_column)
            .with_context(|| format!("Row {row}: missing or non-integer '{}'", self.image_column))?;
        let object_number = take_id(&mut values, &self.object_column)
            .with_context(|| format!("Row {row}: missing or non-integer '{}'", self.object_column))?;
        Ok(ObjectRecord {
            image_id,
            object_number,
            values,
        })
    }
}

fn take_id(values: &mut BTreeMap<String, MetadataValue>, column: &str) -> Option<i64> {
    values.remove(column).and_then(|v| v.as_id())
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a per-object feature table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – one row per object (recommended for large exports)
/// * `.json`    – `[{ "ImageNumber": 1, "ObjectNumber": 1, ...features }, ...]`
/// * `.csv`     – header row, one row per object
pub fn load_table(path: &Path, options: &LoaderOptions) -> Result<FeatureTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path, options),
        "json" => load_json(path, options),
        "csv" => load_csv(path, options),
        other => bail!("Unsupported file extension: .{other}"),
    }?;

    log::info!(
        "Loaded {} objects across {} images with {} columns from {}",
        table.len(),
        table.image_ids().len(),
        table.column_names.len(),
        path.display()
    );
    Ok(table)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "ImageNumber": 1, "ObjectNumber": 1, "AreaShape_Area": 412, "Metadata_Well": "B03" },
///   ...
/// ]
/// ```
fn load_json(path: &Path, options: &LoaderOptions) -> Result<FeatureTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let rows = root.as_array().context("Expected top-level JSON array")?;

    let mut records = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let obj = row
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        let values = obj
            .iter()
            .map(|(key, val)| (key.clone(), json_to_metadata(val)))
            .collect();
        records.push(options.build_record(i, values)?);
    }

    Ok(FeatureTable::from_records(records))
}

fn json_to_metadata(val: &JsonValue) -> MetadataValue {
    match val {
        JsonValue::String(s) => MetadataValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                MetadataValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                MetadataValue::Float(f)
            } else {
                MetadataValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => MetadataValue::Bool(*b),
        JsonValue::Null => MetadataValue::Null,
        other => MetadataValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one object per row.
/// Empty cells and `NaN` become missing values.
fn load_csv(path: &Path, options: &LoaderOptions) -> Result<FeatureTable> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    for required in [&options.image_column, &options.object_column] {
        if !headers.iter().any(|h| h == required) {
            bail!("CSV missing '{required}' column");
        }
    }

    let mut records = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let values = headers
            .iter()
            .zip(record.iter())
            .map(|(col, value)| (col.clone(), guess_metadata_type(value)))
            .collect();
        records.push(options.build_record(row_no, values)?);
    }

    Ok(FeatureTable::from_records(records))
}

fn guess_metadata_type(s: &str) -> MetadataValue {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return MetadataValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return MetadataValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return MetadataValue::Float(f);
    }
    if s == "true" || s == "false" || s == "True" || s == "False" {
        return MetadataValue::Bool(s.eq_ignore_ascii_case("true"));
    }
    MetadataValue::String(s.to_string())
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file containing one row per object.
///
/// Scalar columns (strings, ints, floats, bools) are read; nested columns are
/// kept as their type name so they still show up in the column list.
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path, options: &LoaderOptions) -> Result<FeatureTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut records = Vec::new();
    let mut row_offset = 0;

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        for name in [&options.image_column, &options.object_column] {
            if schema.index_of(name).is_err() {
                bail!("Parquet file missing '{name}' column");
            }
        }

        let columns: Vec<(String, &Arc<dyn Array>)> = schema
            .fields()
            .iter()
            .zip(batch.columns())
            .map(|(f, c)| (f.name().clone(), c))
            .collect();

        for row in 0..batch.num_rows() {
            let values = columns
                .iter()
                .map(|(name, col)| (name.clone(), extract_metadata_value(col, row)))
                .collect();
            records.push(options.build_record(row_offset + row, values)?);
        }
        row_offset += batch.num_rows();
    }

    Ok(FeatureTable::from_records(records))
}

/// Extract a single cell from an Arrow column at a given row.
fn extract_metadata_value(col: &Arc<dyn Array>, row: usize) -> MetadataValue {
    if col.is_null(row) {
        return MetadataValue::Null;
    }
    let value = match col.data_type() {
        DataType::Utf8 => col
            .as_string_opt::<i32>()
            .map(|s| MetadataValue::String(s.value(row).to_string())),
        DataType::LargeUtf8 => col
            .as_string_opt::<i64>()
            .map(|s| MetadataValue::String(s.value(row).to_string())),
        DataType::Int32 => col
            .as_primitive_opt::<Int32Type>()
            .map(|a| MetadataValue::Integer(i64::from(a.value(row)))),
        DataType::Int64 => col
            .as_primitive_opt::<Int64Type>()
            .map(|a| MetadataValue::Integer(a.value(row))),
        DataType::UInt16 => col
            .as_primitive_opt::<UInt16Type>()
            .map(|a| MetadataValue::Integer(i64::from(a.value(row)))),
        DataType::UInt32 => col
            .as_primitive_opt::<UInt32Type>()
            .map(|a| MetadataValue::Integer(i64::from(a.value(row)))),
        DataType::Float32 => col
            .as_primitive_opt::<Float32Type>()
            .map(|a| MetadataValue::Float(f64::from(a.value(row)))),
        DataType::Float64 => col
            .as_primitive_opt::<Float64Type>()
            .map(|a| MetadataValue::Float(a.value(row))),
        DataType::Boolean => col
            .as_boolean_opt()
            .map(|a| MetadataValue::Bool(a.value(row))),
        _ => None,
    };
    value.unwrap_or_else(|| MetadataValue::String(format!("{:?}", col.data_type())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::store::FeatureStore;

    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;

    #[test]
    fn test_guess_metadata_type() {
        assert_eq!(guess_metadata_type("12"), MetadataValue::Integer(12));
        assert_eq!(guess_metadata_type("1.5"), MetadataValue::Float(1.5));
        assert_eq!(guess_metadata_type("NaN"), MetadataValue::Null);
        assert_eq!(guess_metadata_type(""), MetadataValue::Null);
        assert_eq!(guess_metadata_type("True"), MetadataValue::Bool(true));
        assert_eq!(guess_metadata_type("B03"), MetadataValue::String("B03".into()));
    }

    #[test]
    fn test_load_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells.csv");
        std::fs::write(
            &path,
            "ImageNumber,ObjectNumber,Area,Well\n1,1,40,B03\n1,2,,B03\n2,1,55.5,C04\n",
        )
        .unwrap();

        let table = load_table(&path, &LoaderOptions::default()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.column_names, vec!["Area", "Well"]);
        assert_eq!(table.records[1].get("Area"), Some(&MetadataValue::Null));
        assert_eq!(table.feature_column(2, "Area").unwrap(), vec![55.5]);
    }

    #[test]
    fn test_load_csv_missing_id_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells.csv");
        std::fs::write(&path, "ImageNumber,Area\n1,40\n").unwrap();
        let err = load_table(&path, &LoaderOptions::default()).unwrap_err();
        assert!(format!("{err:#}").contains("ObjectNumber"));
    }

    #[test]
    fn test_load_json_with_custom_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells.json");
        std::fs::write(
            &path,
            r#"[{"img": 3, "obj": 1.0, "Intensity": 0.25, "Mitotic": true},
                {"img": 3, "obj": 2, "Intensity": 0.75, "Mitotic": false}]"#,
        )
        .unwrap();

        let options = LoaderOptions {
            image_column: "img".into(),
            object_column: "obj".into(),
        };
        let table = load_table(&path, &options).unwrap();
        assert_eq!(table.image_ids(), vec![3]);
        assert_eq!(table.records[0].object_number, 1);
        assert_eq!(table.feature_column(3, "Intensity").unwrap(), vec![0.25, 0.75]);
        assert_eq!(table.unique_values["Mitotic"].len(), 2);
    }

    #[test]
    fn test_load_json_rejects_non_integer_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells.json");
        std::fs::write(&path, r#"[{"ImageNumber": 1, "ObjectNumber": "a"}]"#).unwrap();
        let err = load_table(&path, &LoaderOptions::default()).unwrap_err();
        assert!(format!("{err:#}").contains("Row 0"));
    }

    #[test]
    fn test_load_parquet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells.parquet");

        let schema = Arc::new(Schema::new(vec![
            Field::new("ImageNumber", DataType::Int64, false),
            Field::new("ObjectNumber", DataType::Int64, false),
            Field::new("Area", DataType::Float64, true),
            Field::new("Well", DataType::Utf8, false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1, 1])),
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(Float64Array::from(vec![Some(12.0), None])),
                Arc::new(StringArray::from(vec!["B03", "B03"])),
            ],
        )
        .unwrap();
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let table = load_table(&path, &LoaderOptions::default()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.records[0].get("Area"), Some(&MetadataValue::Float(12.0)));
        assert_eq!(table.records[1].get("Area"), Some(&MetadataValue::Null));
        assert_eq!(
            table.records[1].get("Well"),
            Some(&MetadataValue::String("B03".into()))
        );
    }

    #[test]
    fn test_unsupported_extension() {
        let err = load_table(Path::new("cells.xlsx"), &LoaderOptions::default()).unwrap_err();
        assert!(err.to_string().contains(".xlsx"));
    }
}
