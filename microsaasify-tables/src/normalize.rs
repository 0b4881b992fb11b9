//! Header naming and ragged-row normalization.

use std::collections::HashSet;

/// Counts of adjustments made while normalizing rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub padded_rows: usize,
    pub truncated_rows: usize,
    pub truncated_cells: usize,
}

/// Spreadsheet column letter for a zero-based index (0 -> A, 26 -> AA).
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Trims header names, names blank ones after their column letter and
/// suffixes repeats (`Name`, `Name 2`) so every header is unique.
pub fn normalize_headers(headers: Vec<String>) -> Vec<String> {
    let mut taken = HashSet::with_capacity(headers.len());
    headers
        .into_iter()
        .enumerate()
        .map(|(i, h)| {
            let trimmed = h.trim();
            let base = if trimmed.is_empty() {
                format!("Column {}", column_letter(i))
            } else {
                trimmed.to_string()
            };
            let mut name = base.clone();
            let mut n = 2;
            while !taken.insert(name.clone()) {
                name = format!("{base} {n}");
                n += 1;
            }
            name
        })
        .collect()
}

/// Pads short rows with empty cells and truncates long rows to `width`.
pub fn normalize_rows(width: usize, rows: Vec<Vec<String>>) -> (Vec<Vec<String>>, NormalizeStats) {
    let mut stats = NormalizeStats::default();
    let rows = rows
        .into_iter()
        .map(|mut row| {
            if row.len() < width {
                stats.padded_rows += 1;
                row.resize(width, String::new());
            } else if row.len() > width {
                stats.truncated_rows += 1;
                stats.truncated_cells += row.len() - width;
                row.truncate(width);
            }
            row
        })
        .collect();
    (rows, stats)
}
