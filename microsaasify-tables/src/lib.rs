//! Typed row tables for published spreadsheet apps.
//!
//! A spreadsheet range arrives as loosely-shaped rows of strings. This crate
//! turns it into:
//! - a [`RawTable`] whose rows all match the header width
//! - one [`ColumnSchema`] per header, inferred from a bounded sample
//! - typed [`CellValue`]s, produced once and matched exhaustively downstream
//!
//! Inference is a pure function of its inputs, so the same headers and
//! sample always produce the same schema.

mod cells;
mod error;
mod normalize;
mod schema;
mod types;

pub use cells::{parse_boolean, parse_number, parse_temporal, Temporal};
pub use error::{TableError, TableResult};
pub use normalize::{column_letter, normalize_headers, normalize_rows, NormalizeStats};
pub use schema::{
    infer, infer_with, type_rows, InferenceOptions, FILTER_CARDINALITY_LIMIT, SAMPLE_LIMIT,
};
pub use types::{CellValue, ColumnSchema, ColumnType, RawTable};
