use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::NaiveDate;

use super::dates;
use crate::error::SheetError;

/// Headers a sheet must carry before it can be transformed.
pub const REQUIRED_COLUMNS: [&str; 2] = ["manufacture date", "expiry date"];

/// Headers appended to every output sheet, in this order.
pub const COMPUTED_COLUMNS: [&str; 2] = ["total shelf-life months", "remaining months"];

/// Name of the single sheet in every output workbook.
pub const OUTPUT_SHEET_NAME: &str = "TDSheet";

/// A parsed calendar date with no time component.
pub type CanonicalDate = NaiveDate;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Raw value of one decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Spreadsheet date/time serial, kept exactly as decoded.
    DateTime(f64),
    /// Elapsed-time serial in days, e.g. a `[h]:mm:ss` cell.
    Duration(f64),
}

impl CellValue {
    /// A cell is populated unless it is empty or holds the empty string.
    pub fn is_populated(&self) -> bool {
        match self {
            CellValue::Empty => false,
            CellValue::Text(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Length of the value as it would be rendered as text.
    pub fn display_len(&self) -> usize {
        match self {
            CellValue::Empty => 0,
            other => other.to_string().chars().count(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::DateTime(serial) => match dates::serial_to_datetime(*serial) {
                Some(dt) if *serial < 1.0 => write!(f, "{}", dt.format("%H:%M:%S")),
                Some(dt) if serial.fract() == 0.0 => write!(f, "{}", dt.format("%d.%m.%Y")),
                Some(dt) => write!(f, "{}", dt.format("%d.%m.%Y %H:%M")),
                None => write!(f, "{}", serial),
            },
            CellValue::Duration(days) => {
                let seconds = (days * SECONDS_PER_DAY).round() as i64;
                let sign = if seconds < 0 { "-" } else { "" };
                let seconds = seconds.abs();
                write!(f, "{}{}:{:02}:{:02}", sign, seconds / 3600, seconds / 60 % 60, seconds % 60)
            }
        }
    }
}

impl From<Option<i32>> for CellValue {
    fn from(value: Option<i32>) -> Self {
        value.map_or(CellValue::Empty, |n| CellValue::Number(f64::from(n)))
    }
}

/// Inclusive, 0-based rectangle of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetRange {
    pub start_row: u32,
    pub start_col: u32,
    pub end_row: u32,
    pub end_col: u32,
}

impl SheetRange {
    pub fn new(start: (u32, u32), end: (u32, u32)) -> Self {
        Self {
            start_row: start.0,
            start_col: start.1,
            end_row: end.0,
            end_col: end.1,
        }
    }

    pub fn width(&self) -> usize {
        (self.end_col - self.start_col) as usize + 1
    }

    pub fn height(&self) -> usize {
        (self.end_row - self.start_row) as usize + 1
    }
}

/// First sheet of a decoded workbook: sparse cell lookup plus the extent the
/// decoder advertised, which may be wider than what is actually populated.
#[derive(Debug, Clone, Default)]
pub struct Worksheet {
    pub name: String,
    cells: HashMap<(u32, u32), CellValue>,
    advertised: Option<SheetRange>,
}

impl Worksheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_extent(mut self, extent: SheetRange) -> Self {
        self.advertised = Some(extent);
        self
    }

    pub fn set(&mut self, row: u32, col: u32, value: CellValue) {
        self.cells.insert((row, col), value);
    }

    pub fn cell(&self, row: u32, col: u32) -> Option<&CellValue> {
        self.cells.get(&(row, col))
    }

    /// The advertised extent, or the bounding box of stored cells when the
    /// decoder gave no hint.
    pub fn extent(&self) -> Option<SheetRange> {
        if self.advertised.is_some() {
            return self.advertised;
        }
        let mut keys = self.cells.keys();
        let &(r, c) = keys.next()?;
        let (mut min, mut max) = ((r, c), (r, c));
        for &(r, c) in keys {
            min = (min.0.min(r), min.1.min(c));
            max = (max.0.max(r), max.1.max(c));
        }
        Some(SheetRange::new(min, max))
    }
}

/// Column names, index-aligned with the analysed range.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderSet(Vec<String>);

impl HeaderSet {
    pub fn new(names: Vec<String>) -> Self {
        Self(names)
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|h| h == name)
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required.iter().copied().filter(|r| !self.contains(r)).collect()
    }
}

/// One record below the header row, keyed by header in column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataRow {
    entries: Vec<(String, CellValue)>,
}

impl DataRow {
    pub fn builder() -> DataRowBuilder {
        DataRowBuilder::default()
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Replaces the value under `key`, or appends it if the key is new.
    pub fn set(&mut self, key: &str, value: CellValue) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct DataRowBuilder {
    entries: Vec<(String, CellValue)>,
    seen: HashSet<String>,
}

impl DataRowBuilder {
    pub fn push(mut self, key: impl Into<String>, value: CellValue) -> Result<Self, SheetError> {
        let key = key.into();
        if !self.seen.insert(key.clone()) {
            return Err(SheetError::DuplicateKey(key));
        }
        self.entries.push((key, value));
        Ok(self)
    }

    pub fn build(self) -> DataRow {
        DataRow { entries: self.entries }
    }
}

/// Header set plus the data rows keyed by it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub headers: HeaderSet,
    pub rows: Vec<DataRow>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_not_populated() {
        assert!(!CellValue::Empty.is_populated());
        assert!(!CellValue::Text(String::new()).is_populated());
        assert!(CellValue::Text(" ".into()).is_populated());
        assert!(CellValue::Number(0.0).is_populated());
        assert!(CellValue::Bool(false).is_populated());
    }

    #[test]
    fn whole_numbers_render_without_fraction() {
        assert_eq!(CellValue::Number(12.0).to_string(), "12");
        assert_eq!(CellValue::Number(-3.0).to_string(), "-3");
        assert_eq!(CellValue::Number(1.5).to_string(), "1.5");
    }

    #[test]
    fn serials_render_by_kind() {
        assert_eq!(CellValue::DateTime(45723.0).to_string(), "07.03.2025");
        assert_eq!(CellValue::DateTime(45356.5).to_string(), "05.03.2024 12:00");
        assert_eq!(CellValue::DateTime(0.75).to_string(), "18:00:00");
        assert_eq!(CellValue::Duration(1.5).to_string(), "36:00:00");
        assert_eq!(CellValue::Duration(-0.25).to_string(), "-6:00:00");
    }

    #[test]
    fn builder_rejects_duplicate_keys() {
        let err = DataRow::builder()
            .push("SKU", CellValue::Text("A1".into()))
            .unwrap()
            .push("SKU", CellValue::Empty)
            .unwrap_err();
        assert!(matches!(err, SheetError::DuplicateKey(k) if k == "SKU"));
    }

    #[test]
    fn set_replaces_in_place_and_appends_new_keys() {
        let mut row = DataRow::builder()
            .push("a", CellValue::Number(1.0))
            .unwrap()
            .push("b", CellValue::Number(2.0))
            .unwrap()
            .build();
        row.set("a", CellValue::Number(9.0));
        row.set("c", CellValue::Number(3.0));
        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(row.get("a"), Some(&CellValue::Number(9.0)));
    }

    #[test]
    fn extent_falls_back_to_cell_bounds() {
        let mut sheet = Worksheet::new("Sheet1");
        assert_eq!(sheet.extent(), None);
        sheet.set(2, 1, CellValue::Number(1.0));
        sheet.set(4, 3, CellValue::Number(1.0));
        assert_eq!(sheet.extent(), Some(SheetRange::new((2, 1), (4, 3))));

        let hinted = sheet.with_extent(SheetRange::new((0, 0), (9, 9)));
        assert_eq!(hinted.extent(), Some(SheetRange::new((0, 0), (9, 9))));
    }

    #[test]
    fn header_set_reports_missing_in_required_order() {
        let headers = HeaderSet::new(vec!["SKU".into(), "expiry date".into()]);
        assert_eq!(headers.missing(&REQUIRED_COLUMNS), vec!["manufacture date"]);
    }
}
