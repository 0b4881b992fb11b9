//! A1 range handling and spreadsheet id extraction.

use crate::types::SpreadsheetRef;
use regex_lite::Regex;
use std::sync::LazyLock;

static URL_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/spreadsheets/d/([a-zA-Z0-9_-]+)").expect("valid spreadsheet url regex")
});

static BARE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{44}$").expect("valid spreadsheet id regex"));

static A1_CELLS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z]{1,3}\d*(?::[A-Za-z]{1,3}\d*)?|\d+:\d+)$").expect("valid A1 regex")
});

/// How a reference's range is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeSpec {
    /// A whole tab (`None` = first tab), read in row pages.
    WholeSheet(Option<String>),
    /// An explicit A1 range, read in one call.
    Explicit(String),
}

impl SpreadsheetRef {
    pub fn range_spec(&self) -> RangeSpec {
        let range = self.range.trim();
        if range.is_empty() {
            return RangeSpec::WholeSheet(None);
        }
        if range.contains('!') || A1_CELLS_RE.is_match(range) {
            return RangeSpec::Explicit(range.to_string());
        }
        RangeSpec::WholeSheet(Some(unquote_sheet_name(range)))
    }
}

/// Pulls a spreadsheet id out of a Google Sheets URL or a bare id.
pub fn extract_spreadsheet_id(input: &str) -> Option<String> {
    let input = input.trim();
    if let Some(caps) = URL_ID_RE.captures(input) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }
    if BARE_ID_RE.is_match(input) {
        return Some(input.to_string());
    }
    None
}

/// Quotes a tab name for use in A1 notation (`It's` -> `'It''s'`).
pub fn quote_sheet_name(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

fn unquote_sheet_name(name: &str) -> String {
    match name.strip_prefix('\'').and_then(|n| n.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => name.to_string(),
    }
}

/// Row window in A1 notation, 1-based and inclusive (`'Tab'!1:1000`).
pub fn row_window(sheet: Option<&str>, first_row: u32, last_row: u32) -> String {
    match sheet {
        Some(name) => format!("{}!{first_row}:{last_row}", quote_sheet_name(name)),
        None => format!("{first_row}:{last_row}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_range_is_first_tab() {
        let r = SpreadsheetRef::new("id", "");
        assert_eq!(r.range_spec(), RangeSpec::WholeSheet(None));
    }

    #[test]
    fn tab_name_is_whole_sheet() {
        let r = SpreadsheetRef::new("id", "Inventory 2024");
        assert_eq!(r.range_spec(), RangeSpec::WholeSheet(Some("Inventory 2024".into())));
    }

    #[test]
    fn quoted_tab_name_is_unquoted() {
        let r = SpreadsheetRef::new("id", "'Bob''s list'");
        assert_eq!(r.range_spec(), RangeSpec::WholeSheet(Some("Bob's list".into())));
    }

    #[test]
    fn a1_ranges_are_explicit() {
        for range in ["Sheet1!A1:D20", "A1:C9", "B:D", "2:40"] {
            let r = SpreadsheetRef::new("id", range);
            assert_eq!(r.range_spec(), RangeSpec::Explicit(range.into()), "{range}");
        }
    }

    #[test]
    fn row_windows_quote_names() {
        assert_eq!(row_window(Some("It's"), 1, 1000), "'It''s'!1:1000");
        assert_eq!(row_window(None, 1001, 2000), "1001:2000");
    }
}
