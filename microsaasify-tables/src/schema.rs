//! Column schema inference and cell typing.

use crate::cells::{is_email, is_url, parse_boolean, parse_number, parse_temporal, Temporal};
use crate::types::{CellValue, ColumnSchema, ColumnType, RawTable};
use std::collections::HashSet;

/// Maximum number of data rows sampled per column.
pub const SAMPLE_LIMIT: usize = 200;

/// Text columns with more distinct sampled values than this are not offered as filters.
pub const FILTER_CARDINALITY_LIMIT: usize = 50;

/// Tunables for [`infer_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceOptions {
    pub sample_limit: usize,
    pub filter_cardinality_limit: usize,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            sample_limit: SAMPLE_LIMIT,
            filter_cardinality_limit: FILTER_CARDINALITY_LIMIT,
        }
    }
}

/// Infers one [`ColumnSchema`] per header using the default options.
pub fn infer(headers: &[String], sample_rows: &[Vec<String>]) -> Vec<ColumnSchema> {
    infer_with(headers, sample_rows, &InferenceOptions::default())
}

/// Infers one [`ColumnSchema`] per header, in header order.
///
/// Missing cells in short rows count as empty. Only the first
/// `sample_limit` rows are inspected.
pub fn infer_with(
    headers: &[String],
    sample_rows: &[Vec<String>],
    options: &InferenceOptions,
) -> Vec<ColumnSchema> {
    let sample = &sample_rows[..sample_rows.len().min(options.sample_limit)];

    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let mut saw_empty = false;
            let mut values: Vec<&str> = Vec::with_capacity(sample.len());
            for row in sample {
                match row.get(idx).map(|v| v.trim()) {
                    Some(v) if !v.is_empty() => values.push(v),
                    _ => saw_empty = true,
                }
            }

            let column_type = classify(&values);
            let required = !values.is_empty() && !saw_empty;
            let filterable = match column_type {
                ColumnType::Text => {
                    let distinct: HashSet<&str> = values.iter().copied().collect();
                    distinct.len() <= options.filter_cardinality_limit
                }
                _ => true,
            };

            ColumnSchema {
                name: name.clone(),
                column_type,
                required,
                searchable: column_type.is_searchable(),
                filterable,
            }
        })
        .collect()
}

// Booleans and dates are checked before numbers and free text: "2024-01-01"
// must not fall through to text, and "yes"/"no" must not stay text.
fn classify(values: &[&str]) -> ColumnType {
    if values.is_empty() {
        return ColumnType::Text;
    }
    if values.iter().all(|v| parse_boolean(v).is_some()) {
        ColumnType::Boolean
    } else if values.iter().all(|v| parse_temporal(v).is_some()) {
        ColumnType::Date
    } else if values.iter().all(|v| parse_number(v).is_some()) {
        ColumnType::Number
    } else if values.iter().all(|v| is_url(v)) {
        ColumnType::Url
    } else if values.iter().all(|v| is_email(v)) {
        ColumnType::Email
    } else {
        ColumnType::Text
    }
}

impl CellValue {
    /// Types a raw cell according to its column's inferred type.
    ///
    /// Values outside the sample that fail to parse fall back to text.
    pub fn parse(raw: &str, column_type: ColumnType) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        let typed = match column_type {
            ColumnType::Boolean => parse_boolean(trimmed).map(Self::Boolean),
            ColumnType::Number => parse_number(trimmed).map(Self::Number),
            ColumnType::Date => parse_temporal(trimmed).map(|t| match t {
                Temporal::Date(d) => Self::Date(d),
                Temporal::DateTime(dt) => Self::DateTime(dt),
            }),
            ColumnType::Text | ColumnType::Url | ColumnType::Email => None,
        };
        typed.unwrap_or_else(|| Self::Text(raw.to_string()))
    }
}

/// Types every cell of `table` against `schema`.
pub fn type_rows(table: &RawTable, schema: &[ColumnSchema]) -> Vec<Vec<CellValue>> {
    table
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .zip(schema)
                .map(|(raw, col)| CellValue::parse(raw, col.column_type))
                .collect()
        })
        .collect()
}
