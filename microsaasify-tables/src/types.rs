//! Core data types for spreadsheet tables.

use crate::error::{TableError, TableResult};
use crate::normalize::{normalize_headers, normalize_rows};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Semantic column type inferred from sampled cell values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Number,
    Date,
    Boolean,
    Url,
    Email,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::Url => "url",
            Self::Email => "email",
        }
    }

    /// Free-text-like types that the app search box matches against.
    pub fn is_searchable(&self) -> bool {
        matches!(self, Self::Text | Self::Url | Self::Email)
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inferred description of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub column_type: ColumnType,
    /// No empty cell was observed in the sample.
    pub required: bool,
    pub searchable: bool,
    pub filterable: bool,
}

/// A typed cell, produced once at ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Boolean(bool),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Renders the value for display and search.
    pub fn display(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
            Self::Boolean(b) => b.to_string(),
        }
    }
}

/// Header row plus data rows, every row exactly as wide as the header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Builds a table, naming blank headers and normalizing ragged rows.
    ///
    /// Short rows are padded with empty cells; cells beyond the header
    /// width are dropped. Rows themselves are never dropped.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let headers = normalize_headers(headers);
        let (rows, stats) = normalize_rows(headers.len(), rows);
        if stats.padded_rows > 0 || stats.truncated_cells > 0 {
            debug!(
                "normalized ragged rows: {} padded, {} cells truncated beyond {} columns",
                stats.padded_rows,
                stats.truncated_cells,
                headers.len()
            );
        }
        Self { headers, rows }
    }

    /// Splits provider rows into header (first row) and data rows.
    ///
    /// An empty range yields an empty table.
    pub fn from_values(mut values: Vec<Vec<String>>) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let rows = values.split_off(1);
        let headers = values.pop().unwrap_or_default();
        Self::new(headers, rows)
    }

    /// Converts JSON cell values (as returned by the Sheets API) into strings.
    ///
    /// Strings pass through, numbers and booleans are stringified, nulls
    /// become empty cells. Nested arrays or objects are rejected.
    pub fn from_json_values(values: Vec<Vec<serde_json::Value>>) -> TableResult<Self> {
        let mut out = Vec::with_capacity(values.len());
        for (row_idx, row) in values.into_iter().enumerate() {
            let mut cells = Vec::with_capacity(row.len());
            for (col_idx, value) in row.into_iter().enumerate() {
                let cell = match value {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    serde_json::Value::Null => String::new(),
                    other => {
                        return Err(TableError::MalformedCell {
                            row: row_idx,
                            column: col_idx,
                            reason: format!("unexpected nested value {other}"),
                        });
                    }
                };
                cells.push(cell);
            }
            out.push(cells);
        }
        Ok(Self::from_values(out))
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}
