use std::collections::HashSet;
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};

use super::layout::{column_letter, plan_insertions};
use super::types::*;
use crate::error::SheetError;
use crate::models::FileAnalysis;

/// Populated extent of a sheet as found by scanning its cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetStructure {
    /// `None` when no cell in the advertised extent is populated.
    pub range: Option<SheetRange>,
    pub last_filled_column: Option<u32>,
    /// Populated rows below the header row.
    pub data_rows: usize,
}

impl SheetStructure {
    fn empty() -> Self {
        Self {
            range: None,
            last_filled_column: None,
            data_rows: 0,
        }
    }
}

/// Decodes the first sheet of an .xls/.xlsx payload into a cell grid.
pub fn decode_first_sheet(file_data: &[u8]) -> Result<Worksheet, SheetError> {
    let cursor = Cursor::new(file_data.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor)?;

    let name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(SheetError::EmptyInput)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SheetError::EmptyInput)??;

    let mut sheet = Worksheet::new(name);
    let (Some(start), Some(end)) = (range.start(), range.end()) else {
        return Ok(sheet);
    };
    for (row, col, data) in range.cells() {
        let value = cell_value(data);
        if value != CellValue::Empty {
            sheet.set(start.0 + row as u32, start.1 + col as u32, value);
        }
    }
    tracing::debug!("Decoded sheet {} with extent {:?}..{:?}", sheet.name, start, end);
    Ok(sheet.with_extent(SheetRange::new(start, end)))
}

fn cell_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(d) if d.is_duration() => CellValue::Duration(d.as_f64()),
        Data::DateTime(d) => CellValue::DateTime(d.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

/// Re-derives the populated extent by scanning every cell of the advertised
/// extent instead of trusting its bounds.
pub fn analyze_structure(sheet: &Worksheet) -> SheetStructure {
    let Some(extent) = sheet.extent() else {
        return SheetStructure::empty();
    };

    let mut bounds: Option<SheetRange> = None;
    let mut populated_rows = Vec::new();
    for row in extent.start_row..=extent.end_row {
        let mut row_populated = false;
        for col in extent.start_col..=extent.end_col {
            if !sheet.cell(row, col).is_some_and(CellValue::is_populated) {
                continue;
            }
            row_populated = true;
            bounds = Some(match bounds {
                None => SheetRange::new((row, col), (row, col)),
                Some(b) => SheetRange::new(
                    (b.start_row.min(row), b.start_col.min(col)),
                    (b.end_row.max(row), b.end_col.max(col)),
                ),
            });
        }
        if row_populated {
            populated_rows.push(row);
        }
    }

    match bounds {
        None => SheetStructure::empty(),
        Some(range) => SheetStructure {
            range: Some(range),
            last_filled_column: Some(range.end_col),
            data_rows: populated_rows.len().saturating_sub(1),
        },
    }
}

/// Reads the first row of `range` as headers. Blank slots become
/// `Column_<n>` and repeated names get a `_<n>` suffix so that every column
/// keeps a unique, stable key.
pub fn extract_headers(sheet: &Worksheet, range: &SheetRange) -> HeaderSet {
    let mut seen = HashSet::new();
    let names = (range.start_col..=range.end_col)
        .enumerate()
        .map(|(slot, col)| {
            let raw = sheet
                .cell(range.start_row, col)
                .map(|v| v.to_string().trim().to_string())
                .unwrap_or_default();
            let base = if raw.is_empty() {
                format!("Column_{}", slot + 1)
            } else {
                raw
            };
            unique_name(base, &mut seen)
        })
        .collect();
    HeaderSet::new(names)
}

fn unique_name(base: String, seen: &mut HashSet<String>) -> String {
    if seen.insert(base.clone()) {
        return base;
    }
    let mut counter = 1;
    loop {
        let candidate = format!("{}_{}", base, counter);
        if seen.insert(candidate.clone()) {
            tracing::warn!("Duplicate header {:?} renamed to {:?}", base, candidate);
            return candidate;
        }
        counter += 1;
    }
}

/// Rows below the header row, skipping rows with no populated cell.
pub fn extract_rows(sheet: &Worksheet, range: &SheetRange, headers: &HeaderSet) -> Result<Vec<DataRow>, SheetError> {
    let mut rows = Vec::new();
    for row in (range.start_row + 1)..=range.end_row {
        let values: Vec<CellValue> = (range.start_col..=range.end_col)
            .map(|col| sheet.cell(row, col).cloned().unwrap_or(CellValue::Empty))
            .collect();
        if !values.iter().any(CellValue::is_populated) {
            continue;
        }
        let built = headers
            .names()
            .iter()
            .zip(values)
            .try_fold(DataRow::builder(), |b, (h, v)| b.push(h.as_str(), v))?
            .build();
        rows.push(built);
    }
    Ok(rows)
}

/// Structure, headers and rows of a sheet, failing on sheets without data.
pub fn read_table(sheet: &Worksheet) -> Result<(SheetStructure, Table), SheetError> {
    let structure = analyze_structure(sheet);
    let range = structure.range.ok_or(SheetError::EmptyInput)?;
    let headers = extract_headers(sheet, &range);
    let rows = extract_rows(sheet, &range, &headers)?;
    if rows.is_empty() {
        return Err(SheetError::EmptyInput);
    }
    Ok((structure, Table { headers, rows }))
}

pub struct ExcelAnalyzer;

impl ExcelAnalyzer {
    /// Builds the report record for one file without transforming it.
    pub fn analyze_from_bytes(&self, file_name: &str, file_data: &[u8]) -> Result<FileAnalysis, SheetError> {
        let start = std::time::Instant::now();
        tracing::info!("Starting analysis of {}", file_name);

        let sheet = decode_first_sheet(file_data)?;
        let (structure, table) = read_table(&sheet)?;
        let analysis = self.analyze_table(file_name, &structure, &table.headers);

        tracing::info!(
            "Analysis of {} completed in {:?}: {} columns, {} data rows, valid: {}",
            file_name,
            start.elapsed(),
            analysis.total_columns,
            analysis.total_data_rows,
            analysis.is_valid
        );
        Ok(analysis)
    }

    pub fn analyze_table(&self, file_name: &str, structure: &SheetStructure, headers: &HeaderSet) -> FileAnalysis {
        let missing: Vec<String> = headers
            .missing(&REQUIRED_COLUMNS)
            .into_iter()
            .map(String::from)
            .collect();

        // the output is written from column A, so letters count from the range start
        let last_output_column = structure.range.map(|r| r.end_col - r.start_col);

        FileAnalysis {
            file_name: file_name.to_string(),
            total_columns: headers.len(),
            total_data_rows: structure.data_rows,
            existing_headers: headers.names().to_vec(),
            last_filled_column_label: headers.last().map(String::from),
            last_filled_column_letter: last_output_column.map(|c| column_letter(i64::from(c))),
            planned_new_columns: plan_insertions(last_output_column, &COMPUTED_COLUMNS).to_vec(),
            is_valid: missing.is_empty(),
            missing_required_columns: missing,
        }
    }
}
