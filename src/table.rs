//! JSON records to `DataFrame`, flattening nested objects into dotted column names.

use polars::prelude::*;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// The array found at `pointer` (`""` for the document root).
pub fn records_at<'a>(payload: &'a Value, pointer: &str) -> Option<&'a [Value]> {
    payload.pointer(pointer)?.as_array().map(Vec::as_slice)
}

/// Builds a frame with one row per record.
///
/// Nested objects become `parent.child` columns, ordered by first appearance.
/// Each column gets the narrowest of Int64, Float64, Boolean or String that
/// holds all of its values; missing keys and JSON nulls become nulls.
///
/// ```
/// use meteostations::table::json_normalize;
/// use serde_json::json;
///
/// let df = json_normalize(&[
///     json!({"id": 1, "name": {"en": "Precipitation"}}),
///     json!({"id": 6, "name": {"en": "Temperature 2m above ground"}}),
/// ])
/// .unwrap();
/// let names: Vec<&str> = df.get_column_names().iter().map(|n| n.as_str()).collect();
/// assert_eq!(names, ["id", "name.en"]);
/// ```
pub fn json_normalize(records: &[Value]) -> PolarsResult<DataFrame> {
    let mut names: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut values: Vec<Vec<Value>> = Vec::new();

    for (row, record) in records.iter().enumerate() {
        let mut flat = Vec::new();
        match record {
            Value::Object(map) => flatten(None, map, &mut flat),
            other => flat.push(("value".to_string(), other.clone())),
        }
        for (name, value) in flat {
            let col = *index.entry(name.clone()).or_insert_with(|| {
                names.push(name);
                values.push(vec![Value::Null; row]);
                values.len() - 1
            });
            values[col].push(value);
        }
        for column in values.iter_mut() {
            column.resize(row + 1, Value::Null);
        }
    }

    let columns = names
        .iter()
        .zip(values.iter())
        .map(|(name, column)| to_column(name, column))
        .collect::<Vec<_>>();
    DataFrame::new(columns)
}

fn flatten(prefix: Option<&str>, map: &Map<String, Value>, out: &mut Vec<(String, Value)>) {
    for (key, value) in map {
        let name = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten(Some(&name), inner, out),
            other => out.push((name, other.clone())),
        }
    }
}

fn to_column(name: &str, values: &[Value]) -> Column {
    let present = values.iter().filter(|v| !v.is_null());
    let mut all_int = true;
    let mut all_number = true;
    let mut all_bool = true;
    let mut any = false;
    for value in present {
        any = true;
        all_int &= value.is_i64();
        all_number &= value.is_number();
        all_bool &= value.is_boolean();
    }

    if any && all_int {
        let data: Vec<Option<i64>> = values.iter().map(Value::as_i64).collect();
        Column::new(name.into(), data)
    } else if any && all_number {
        let data: Vec<Option<f64>> = values.iter().map(Value::as_f64).collect();
        Column::new(name.into(), data)
    } else if any && all_bool {
        let data: Vec<Option<bool>> = values.iter().map(Value::as_bool).collect();
        Column::new(name.into(), data)
    } else {
        let data: Vec<Option<String>> = values.iter().map(value_to_string).collect();
        Column::new(name.into(), data)
    }
}

/// Text of a JSON scalar; nested arrays and objects keep their JSON form.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Numeric value of a JSON number or of a string holding one.
pub fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
