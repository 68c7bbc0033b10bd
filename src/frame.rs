//! Row-oriented neuron tables and their Arrow IPC (feather) cache files.

use crate::error::{BuildError, BuildResult};
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, StringArray, UInt64Array,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema, UInt64Type};
use arrow::ipc::CompressionType;
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::{FileWriter, IpcWriteOptions};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

pub type Row = Map<String, Value>;

/// A table of neurons, one JSON object per row. `null` marks a missing value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    rows: Vec<Row>,
}

impl Frame {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Row] {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names in first-seen order across all rows.
    pub fn columns(&self) -> Vec<String> {
        let mut seen: IndexMap<&str, ()> = IndexMap::new();
        for row in &self.rows {
            for key in row.keys() {
                seen.entry(key.as_str()).or_insert(());
            }
        }
        seen.into_keys().map(str::to_string).collect()
    }

    /// Fill `target` from the first non-null column in `sources`, else `fallback`.
    pub fn coalesce_into(&mut self, target: &str, sources: &[&str], fallback: Option<&str>) {
        for row in &mut self.rows {
            let value = sources
                .iter()
                .find_map(|col| non_null(row, col).cloned())
                .or_else(|| fallback.map(|f| Value::String(f.to_string())))
                .unwrap_or(Value::Null);
            row.insert(target.to_string(), value);
        }
    }
}

impl FromIterator<Row> for Frame {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Value of `column` unless missing or null.
pub fn non_null<'a>(row: &'a Row, column: &str) -> Option<&'a Value> {
    row.get(column).filter(|v| !v.is_null())
}

/// String value of `column`; empty strings count as missing.
pub fn str_col<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    match row.get(column) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.as_str()),
        _ => None,
    }
}

/// Integer ID stored either as a JSON number or a numeric string.
pub fn u64_col(row: &Row, column: &str) -> Option<u64> {
    match row.get(column)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Field metadata key marking text columns that hold JSON-encoded values.
const ENCODING_KEY: &str = "encoding";
const JSON_ENCODING: &str = "json";

static NULL: Value = Value::Null;

/// Arrow type chosen for a column from the values it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Null,
    Bool,
    Int,
    UInt,
    Float,
    Text,
    /// Nested or mixed values, stored as JSON text.
    Json,
}

impl ColumnKind {
    fn of(value: &Value) -> Self {
        match value {
            Value::Null => ColumnKind::Null,
            Value::Bool(_) => ColumnKind::Bool,
            Value::Number(n) if n.is_i64() => ColumnKind::Int,
            Value::Number(n) if n.is_u64() => ColumnKind::UInt,
            Value::Number(_) => ColumnKind::Float,
            Value::String(_) => ColumnKind::Text,
            Value::Array(_) | Value::Object(_) => ColumnKind::Json,
        }
    }

    fn merge(self, other: Self) -> Self {
        use ColumnKind::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Null, x) | (x, Null) => x,
            (Int | UInt | Float, Int | UInt | Float) if self != UInt && other != UInt => Float,
            _ => Json,
        }
    }
}

fn column_array(frame: &Frame, name: &str) -> BuildResult<(Field, ArrayRef)> {
    let values: Vec<&Value> = frame
        .rows()
        .iter()
        .map(|row| row.get(name).unwrap_or(&NULL))
        .collect();
    let kind = values
        .iter()
        .fold(ColumnKind::Null, |kind, value| kind.merge(ColumnKind::of(value)));

    let array: ArrayRef = match kind {
        ColumnKind::Bool => Arc::new(BooleanArray::from(
            values.iter().map(|v| v.as_bool()).collect::<Vec<_>>(),
        )),
        ColumnKind::Int => Arc::new(Int64Array::from(
            values.iter().map(|v| v.as_i64()).collect::<Vec<_>>(),
        )),
        ColumnKind::UInt => Arc::new(UInt64Array::from(
            values.iter().map(|v| v.as_u64()).collect::<Vec<_>>(),
        )),
        ColumnKind::Float => Arc::new(Float64Array::from(
            values.iter().map(|v| v.as_f64()).collect::<Vec<_>>(),
        )),
        ColumnKind::Null | ColumnKind::Text => Arc::new(StringArray::from(
            values.iter().map(|v| v.as_str()).collect::<Vec<_>>(),
        )),
        ColumnKind::Json => {
            let mut encoded: Vec<Option<String>> = Vec::with_capacity(values.len());
            for value in &values {
                if value.is_null() {
                    encoded.push(None);
                } else {
                    let text = serde_json::to_string(value).map_err(|e| BuildError::decode(name, e))?;
                    encoded.push(Some(text));
                }
            }
            Arc::new(StringArray::from(encoded))
        }
    };

    let mut field = Field::new(name, array.data_type().clone(), true);
    if kind == ColumnKind::Json {
        field = field.with_metadata(HashMap::from([(
            ENCODING_KEY.to_string(),
            JSON_ENCODING.to_string(),
        )]));
    }
    Ok((field, array))
}

fn to_record_batch(frame: &Frame) -> BuildResult<RecordBatch> {
    let mut fields = Vec::new();
    let mut arrays = Vec::new();
    for name in frame.columns() {
        let (field, array) = column_array(frame, &name)?;
        fields.push(field);
        arrays.push(array);
    }
    let options = RecordBatchOptions::new().with_row_count(Some(frame.len()));
    RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)
        .map_err(|e| BuildError::decode("frame", e))
}

/// Widen the integer, float and string variants we do not write ourselves.
fn normalise(column: &ArrayRef) -> BuildResult<ArrayRef> {
    let target = match column.data_type() {
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::UInt8 | DataType::UInt16
        | DataType::UInt32 => DataType::Int64,
        DataType::Float16 | DataType::Float32 => DataType::Float64,
        DataType::LargeUtf8 | DataType::Utf8View => DataType::Utf8,
        _ => return Ok(Arc::clone(column)),
    };
    cast(column, &target).map_err(|e| BuildError::decode("cached column", e))
}

fn cell(column: &dyn Array, index: usize, json: bool) -> BuildResult<Value> {
    if column.is_null(index) {
        return Ok(Value::Null);
    }
    Ok(match column.data_type() {
        DataType::Null => Value::Null,
        DataType::Boolean => Value::Bool(column.as_boolean().value(index)),
        DataType::Int64 => Value::from(column.as_primitive::<Int64Type>().value(index)),
        DataType::UInt64 => Value::from(column.as_primitive::<UInt64Type>().value(index)),
        DataType::Float64 => Value::from(column.as_primitive::<Float64Type>().value(index)),
        DataType::Utf8 => {
            let text = column.as_string::<i32>().value(index);
            if json {
                serde_json::from_str(text).map_err(|e| BuildError::decode("cached column", e))?
            } else {
                Value::String(text.to_string())
            }
        }
        other => {
            return Err(BuildError::decode(
                "cached column",
                format!("unsupported type {other}"),
            ));
        }
    })
}

fn append_batch(rows: &mut Vec<Row>, batch: &RecordBatch) -> BuildResult<()> {
    let start = rows.len();
    rows.resize(start + batch.num_rows(), Row::new());
    let schema = batch.schema();
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        let json = field.metadata().get(ENCODING_KEY).map(String::as_str) == Some(JSON_ENCODING);
        let column = normalise(column)?;
        for (index, row) in rows[start..].iter_mut().enumerate() {
            row.insert(field.name().clone(), cell(column.as_ref(), index, json)?);
        }
    }
    Ok(())
}

/// Write a frame as a zstd-compressed Arrow IPC file. Columns absent from a
/// row are stored as null.
pub fn write_frame(path: &Path, frame: &Frame) -> BuildResult<()> {
    let batch = to_record_batch(frame)?;
    let what = path.display().to_string();
    let options = IpcWriteOptions::default()
        .try_with_compression(Some(CompressionType::ZSTD))
        .map_err(|e| BuildError::decode(what.as_str(), e))?;
    let file = File::create(path).map_err(|source| BuildError::Cache {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = FileWriter::try_new_with_options(BufWriter::new(file), &batch.schema(), options)
        .map_err(|e| BuildError::decode(what.as_str(), e))?;
    if batch.num_rows() > 0 {
        writer
            .write(&batch)
            .map_err(|e| BuildError::decode(what.as_str(), e))?;
    }
    writer
        .finish()
        .map_err(|e| BuildError::decode(what.as_str(), e))?;
    writer
        .into_inner()
        .map_err(|e| BuildError::decode(what.as_str(), e))?
        .flush()
        .map_err(|source| BuildError::Cache {
            path: path.to_path_buf(),
            source,
        })
}

pub fn read_frame(path: &Path) -> BuildResult<Frame> {
    let file = File::open(path).map_err(|source| BuildError::Cache {
        path: path.to_path_buf(),
        source,
    })?;
    let what = path.display().to_string();
    let reader = FileReader::try_new(BufReader::new(file), None)
        .map_err(|e| BuildError::decode(what.as_str(), e))?;
    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| BuildError::decode(what.as_str(), e))?;
        append_batch(&mut rows, &batch)?;
    }
    Ok(Frame::new(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn ragged_rows_are_padded_with_nulls_on_disk() {
        let frame = Frame::new(vec![
            row(json!({"bodyId": 1, "type": "A"})),
            row(json!({"bodyId": 2, "somaSide": "L"})),
        ]);
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("meta.feather");
        write_frame(&path, &frame).expect("write");
        let back = read_frame(&path).expect("read");

        assert_eq!(back.len(), 2);
        assert_eq!(back.rows()[0]["somaSide"], Value::Null);
        assert_eq!(back.rows()[1]["type"], Value::Null);
        let mut columns = back.columns();
        columns.sort();
        assert_eq!(columns, vec!["bodyId", "somaSide", "type"]);
    }

    #[test]
    fn cached_values_keep_their_types() {
        let frame = Frame::new(vec![
            row(json!({
                "root_id": 720575940621039145u64,
                "primary": true,
                "pre": 1.5,
                "roiInfo": {"LAL(R)": {"pre": 4, "post": 6}},
                "mixed": 1
            })),
            row(json!({
                "root_id": 720575940621039146u64,
                "primary": null,
                "pre": 2,
                "roiInfo": null,
                "mixed": "one"
            })),
        ]);
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fw.feather");
        write_frame(&path, &frame).expect("write");
        let back = read_frame(&path).expect("read");

        let first = &back.rows()[0];
        assert_eq!(u64_col(first, "root_id"), Some(720575940621039145));
        assert_eq!(first["primary"], json!(true));
        assert_eq!(first["roiInfo"], json!({"LAL(R)": {"pre": 4, "post": 6}}));
        assert_eq!(first["mixed"], json!(1));
        let second = &back.rows()[1];
        assert_eq!(second["pre"].as_f64(), Some(2.0));
        assert_eq!(second["primary"], Value::Null);
        assert_eq!(second["mixed"], json!("one"));
    }

    #[test]
    fn empty_frames_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.feather");
        write_frame(&path, &Frame::default()).expect("write");
        assert!(read_frame(&path).expect("read").is_empty());
    }

    #[test]
    fn non_arrow_cache_is_a_decode_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.feather");
        std::fs::write(&path, b"{\"len\": 0}").expect("write");
        let err = read_frame(&path).expect_err("should fail");
        assert_eq!(err.category(), "decode");
    }

    #[test]
    fn coalesce_takes_first_present_column() {
        let mut frame = Frame::new(vec![
            row(json!({"cell_type": null, "hemibrain_type": "H1"})),
            row(json!({"cell_type": "C1", "hemibrain_type": "H2"})),
            row(json!({})),
        ]);
        frame.coalesce_into("type", &["cell_type", "hemibrain_type"], Some("unknown"));
        let types: Vec<_> = frame.rows().iter().map(|r| str_col(r, "type")).collect();
        assert_eq!(types, vec![Some("H1"), Some("C1"), Some("unknown")]);
    }

    #[test]
    fn ids_parse_from_numbers_and_strings() {
        let r = row(json!({"a": 720575940621039145u64, "b": "12", "c": "x"}));
        assert_eq!(u64_col(&r, "a"), Some(720575940621039145));
        assert_eq!(u64_col(&r, "b"), Some(12));
        assert_eq!(u64_col(&r, "c"), None);
    }
}
