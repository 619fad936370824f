use arrow::array::{Array, ArrayRef, AsArray, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use arrow::record_batch::RecordBatch;
use common::{Error, Result};
use serde_json::Value;

/// A column read as plain Utf8, whatever string encoding the file used.
/// `None` when the batch has no such column.
pub fn string_column(batch: &RecordBatch, name: &str) -> Result<Option<StringArray>> {
    let Some(column) = batch.column_by_name(name) else {
        return Ok(None);
    };
    let utf8: ArrayRef = match column.data_type() {
        DataType::Utf8 => column.clone(),
        DataType::LargeUtf8 | DataType::Utf8View | DataType::Null => cast(column, &DataType::Utf8)?,
        other => {
            return Err(Error::SchemaValidation(format!(
                "Column {} has type {:?}, expected a string column",
                name, other
            )));
        }
    };
    Ok(Some(utf8.as_string::<i32>().clone()))
}

pub fn float_column(batch: &RecordBatch, name: &str) -> Result<Option<Float64Array>> {
    let Some(column) = batch.column_by_name(name) else {
        return Ok(None);
    };
    let floats = cast(column, &DataType::Float64)?;
    Ok(Some(floats.as_primitive::<Float64Type>().clone()))
}

pub fn int_column(batch: &RecordBatch, name: &str) -> Result<Option<Int64Array>> {
    let Some(column) = batch.column_by_name(name) else {
        return Ok(None);
    };
    let ints = cast(column, &DataType::Int64)?;
    Ok(Some(ints.as_primitive::<Int64Type>().clone()))
}

pub fn string_at(array: Option<&StringArray>, row: usize) -> Option<String> {
    array
        .filter(|a| !a.is_null(row))
        .map(|a| a.value(row).to_string())
}

pub fn float_at(array: Option<&Float64Array>, row: usize) -> Option<f64> {
    array.filter(|a| !a.is_null(row)).map(|a| a.value(row))
}

/// Passthrough encoding of an arbitrary JSON value into a text column.
pub fn json_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub fn batches_row_count(batches: &[RecordBatch]) -> usize {
    batches.iter().map(|b| b.num_rows()).sum()
}
