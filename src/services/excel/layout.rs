use serde::Serialize;
use smallvec::SmallVec;

use super::types::DataRow;

pub const MIN_WIDTH: usize = 15;
pub const MAX_CONTENT_WIDTH: usize = 50;
/// Only this many rows are inspected when sizing a column.
pub const WIDTH_SAMPLE_ROWS: usize = 100;
const WIDTH_PADDING: usize = 2;

const ITEM_NAME_WIDTH: usize = 35;
const DATE_WIDTH: usize = 20;
const MONTHS_WIDTH: usize = 18;

const ITEM_NAME_MARKERS: [&str; 5] = ["item name", "name", "title", "product", "goods"];
const DATE_MARKERS: [&str; 2] = ["date", "shelf-life"];
const MONTHS_MARKERS: [&str; 2] = ["month", "remaining"];

/// Where a computed column will land in the output sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedColumn {
    pub name: String,
    pub index: u32,
    pub position: u32,
    pub letter: String,
}

pub type ColumnPlan = SmallVec<[PlannedColumn; 2]>;

/// Spreadsheet column letter for a 0-based index (0 = A, 26 = AA).
pub fn column_letter(index: i64) -> String {
    if index < 0 {
        return String::new();
    }
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Computed columns go right after the last populated column, in order.
pub fn plan_insertions(last_filled: Option<u32>, computed: &[&str]) -> ColumnPlan {
    let first = last_filled.map_or(0, |c| c + 1);
    computed
        .iter()
        .zip(first..)
        .map(|(name, index)| PlannedColumn {
            name: name.to_string(),
            index,
            position: index + 1,
            letter: column_letter(i64::from(index)),
        })
        .collect()
}

fn width_floor(header: &str) -> usize {
    let lower = header.to_lowercase();
    let has_any = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));
    if has_any(&ITEM_NAME_MARKERS) {
        ITEM_NAME_WIDTH
    } else if has_any(&DATE_MARKERS) {
        DATE_WIDTH
    } else if has_any(&MONTHS_MARKERS) {
        MONTHS_WIDTH
    } else {
        MIN_WIDTH
    }
}

/// Display width per header, from header semantics and sampled content.
pub fn plan_widths(headers: &[String], rows: &[DataRow]) -> Vec<usize> {
    headers
        .iter()
        .map(|header| {
            let longest = rows
                .iter()
                .take(WIDTH_SAMPLE_ROWS)
                .map(|row| row.get(header).map_or(0, |v| v.display_len()))
                .fold(header.chars().count(), usize::max);
            width_floor(header).max((longest + WIDTH_PADDING).min(MAX_CONTENT_WIDTH))
        })
        .collect()
}
