//! Collapse a column of a neuron group into a single value.
//!
//! One non-null unique value is kept as is, no value becomes the policy's
//! empty sentinel, several values become their sorted string forms joined by
//! the policy delimiter.

use crate::frame::Row;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub const NOT_AVAILABLE: &str = "N/A";
pub const DELIMITER: &str = ", ";

/// Columns holding per-neuron synapse detail; never collapsed.
pub const ROI_COLUMNS: &[&str] = &["roiInfo", "inputRois", "outputRois"];

#[derive(Debug, Clone, PartialEq)]
pub struct CollapsePolicy {
    pub empty: Value,
    pub delimiter: String,
}

impl Default for CollapsePolicy {
    fn default() -> Self {
        Self {
            empty: Value::String(NOT_AVAILABLE.to_string()),
            delimiter: DELIMITER.to_string(),
        }
    }
}

/// String form used for joining and sorting.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn collapse<'a, I>(values: I, policy: &CollapsePolicy) -> Value
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut unique: Vec<&Value> = Vec::new();
    for value in values {
        if !value.is_null() && !unique.contains(&value) {
            unique.push(value);
        }
    }
    match unique.as_slice() {
        [] => policy.empty.clone(),
        [single] => (*single).clone(),
        many => {
            let joined = many
                .iter()
                .map(|v| display_value(v))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect::<Vec<_>>()
                .join(&policy.delimiter);
            Value::String(joined)
        }
    }
}

/// Collapse every column seen in `rows`, skipping `exclude`.
pub fn collapse_rows<'a, I>(rows: I, exclude: &[&str], policy: &CollapsePolicy) -> Map<String, Value>
where
    I: IntoIterator<Item = &'a Row>,
    I::IntoIter: Clone,
{
    let rows = rows.into_iter();
    let mut columns: BTreeSet<&str> = BTreeSet::new();
    for row in rows.clone() {
        columns.extend(row.keys().map(String::as_str));
    }

    let mut out = Map::new();
    for column in columns {
        if exclude.contains(&column) {
            continue;
        }
        let collapsed = collapse(rows.clone().filter_map(|row| row.get(column)), policy);
        out.insert(column.to_string(), collapsed);
    }
    out
}

/// A collapsed value as text, `None` for the empty sentinel and non-strings.
pub fn present_str(value: Option<&Value>) -> Option<&str> {
    match value {
        Some(Value::String(s)) if !s.is_empty() && s != NOT_AVAILABLE => Some(s.as_str()),
        _ => None,
    }
}

/// Split a collapsed multi-value string back into its members.
pub fn split_members(value: &str, separator: char) -> impl Iterator<Item = &str> {
    value
        .split(separator)
        .map(str::trim)
        .filter(|member| !member.is_empty() && *member != NOT_AVAILABLE)
}
