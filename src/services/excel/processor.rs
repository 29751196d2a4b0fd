use chrono::Local;

use super::analyzer::{decode_first_sheet, read_table};
use super::dates::{months_between, parse};
use super::layout::plan_widths;
use super::types::*;
use super::writer::write_workbook;
use crate::error::SheetError;

/// Appends the computed shelf-life columns to every row of a table.
pub struct RowTransformer<'a> {
    required: [&'a str; 2],
    computed: [&'a str; 2],
    today: CanonicalDate,
}

impl<'a> RowTransformer<'a> {
    /// `today` is the single reference date for every row of one file.
    pub fn new(required: [&'a str; 2], computed: [&'a str; 2], today: CanonicalDate) -> Self {
        Self { required, computed, today }
    }

    pub fn transform(&self, table: &Table) -> Result<Table, SheetError> {
        let missing = table.headers.missing(&self.required);
        if !missing.is_empty() {
            return Err(SheetError::MissingRequiredColumns(
                missing.into_iter().map(String::from).collect(),
            ));
        }

        let [made_col, expiry_col] = self.required;
        let [total_col, remaining_col] = self.computed;

        let rows = table
            .rows
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                let made = self.date_in(row, made_col, idx);
                let expiry = self.date_in(row, expiry_col, idx);

                let mut out = row.clone();
                out.set(total_col, months_between(made, expiry).into());
                out.set(remaining_col, months_between(Some(self.today), expiry).into());
                out
            })
            .collect();

        let mut names = table.headers.names().to_vec();
        for name in self.computed {
            if !table.headers.contains(name) {
                names.push(name.to_string());
            }
        }

        Ok(Table {
            headers: HeaderSet::new(names),
            rows,
        })
    }

    fn date_in(&self, row: &DataRow, column: &str, idx: usize) -> Option<CanonicalDate> {
        let raw = row.get(column)?;
        let parsed = parse(raw);
        if parsed.is_none() && raw.is_populated() {
            tracing::warn!(
                "Could not parse date in column {:?}, data row {}: {:?}",
                column,
                idx + 1,
                raw.to_string()
            );
        }
        parsed
    }
}

pub struct ExcelProcessor {
    today: CanonicalDate,
}

impl Default for ExcelProcessor {
    fn default() -> Self {
        Self::new(Local::now().date_naive())
    }
}

impl ExcelProcessor {
    pub fn new(today: CanonicalDate) -> Self {
        Self { today }
    }

    /// Decodes one workbook, augments its first sheet and encodes the result.
    pub fn process_file(&self, file_name: &str, file_data: &[u8]) -> Result<Vec<u8>, SheetError> {
        let start = std::time::Instant::now();
        tracing::info!("Processing {}", file_name);

        let sheet = decode_first_sheet(file_data)?;
        let (_, table) = read_table(&sheet)?;
        let output = self.transform_table(&table)?;
        let widths = plan_widths(output.headers.names(), &output.rows);
        let bytes = write_workbook(output.headers.names(), &output.rows, &widths)?;

        tracing::info!(
            "Processed {} in {:?}: {} rows, {} bytes",
            file_name,
            start.elapsed(),
            output.rows.len(),
            bytes.len()
        );
        Ok(bytes)
    }

    pub fn transform_table(&self, table: &Table) -> Result<Table, SheetError> {
        RowTransformer::new(REQUIRED_COLUMNS, COMPUTED_COLUMNS, self.today).transform(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn ymd(y: i32, m: u32, d: u32) -> CanonicalDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn table(headers: &[&str], rows: &[&[CellValue]]) -> Table {
        let headers = HeaderSet::new(headers.iter().map(|h| h.to_string()).collect());
        let rows = rows
            .iter()
            .map(|values| {
                headers
                    .names()
                    .iter()
                    .zip(values.iter())
                    .try_fold(DataRow::builder(), |b, (h, v)| b.push(h.as_str(), v.clone()))
                    .unwrap()
                    .build()
            })
            .collect();
        Table { headers, rows }
    }

    #[test]
    fn computed_columns_follow_original_ones() {
        let input = table(
            &["SKU", "manufacture date", "expiry date"],
            &[
                &[text("A1"), text("01.03.2024"), text("01.03.2025")],
                &[text("B2"), text("not a date"), text("01.03.2025")],
            ],
        );
        let out = ExcelProcessor::new(ymd(2024, 9, 15)).transform_table(&input).unwrap();

        assert_eq!(
            out.headers.names(),
            &["SKU", "manufacture date", "expiry date", "total shelf-life months", "remaining months"]
        );
        assert_eq!(out.rows[0].get("total shelf-life months"), Some(&CellValue::Number(12.0)));
        assert_eq!(out.rows[0].get("remaining months"), Some(&CellValue::Number(5.0)));
        assert_eq!(out.rows[1].get("total shelf-life months"), Some(&CellValue::Empty));
        assert_eq!(out.rows[1].get("remaining months"), Some(&CellValue::Number(5.0)));
        assert_eq!(out.rows[1].get("SKU"), Some(&text("B2")));
        // input untouched
        assert_eq!(input.rows[0].len(), 3);
    }

    #[test]
    fn expired_items_report_negative_remaining() {
        let input = table(
            &["manufacture date", "expiry date"],
            &[&[CellValue::Number(44927.0), text("2024-01-10")]],
        );
        let out = ExcelProcessor::new(ymd(2024, 6, 20)).transform_table(&input).unwrap();
        assert_eq!(out.rows[0].get("total shelf-life months"), Some(&CellValue::Number(12.0)));
        assert_eq!(out.rows[0].get("remaining months"), Some(&CellValue::Number(-6.0)));
    }

    #[test]
    fn missing_required_header_fails_whole_table() {
        let input = table(&["SKU", "expiry date"], &[&[text("A"), text("01.01.2026")]]);
        let err = ExcelProcessor::new(ymd(2025, 1, 1)).transform_table(&input).unwrap_err();
        match err {
            SheetError::MissingRequiredColumns(cols) => assert_eq!(cols, vec!["manufacture date".to_string()]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn existing_computed_columns_are_refreshed_in_place() {
        let input = table(
            &["manufacture date", "remaining months", "expiry date"],
            &[&[text("01.01.2024"), CellValue::Number(99.0), text("01.01.2026")]],
        );
        let out = ExcelProcessor::new(ymd(2025, 1, 1)).transform_table(&input).unwrap();
        assert_eq!(
            out.headers.names(),
            &["manufacture date", "remaining months", "expiry date", "total shelf-life months"]
        );
        assert_eq!(out.rows[0].get("remaining months"), Some(&CellValue::Number(12.0)));
        assert_eq!(out.rows[0].keys().collect::<Vec<_>>(), vec![
            "manufacture date",
            "remaining months",
            "expiry date",
            "total shelf-life months",
        ]);
    }

    #[test]
    fn every_row_shares_the_same_reference_date() {
        let rows: Vec<Vec<CellValue>> = (0..50)
            .map(|_| vec![text("01.01.2024"), text("15.08.2026")])
            .collect();
        let row_refs: Vec<&[CellValue]> = rows.iter().map(Vec::as_slice).collect();
        let input = table(&["manufacture date", "expiry date"], &row_refs);
        let out = ExcelProcessor::new(ymd(2025, 8, 15)).transform_table(&input).unwrap();
        assert!(out
            .rows
            .iter()
            .all(|r| r.get("remaining months") == Some(&CellValue::Number(12.0))));
    }
}
