//! Serialises a header list, rows and a width plan into a fresh workbook.

use rust_xlsxwriter::{Format, Workbook, Worksheet};

use super::types::{CellValue, DataRow, OUTPUT_SHEET_NAME};
use crate::error::SheetError;

/// Number formats for serial cells, chosen from the serial's shape.
struct SerialFormats {
    date: Format,
    datetime: Format,
    time: Format,
    duration: Format,
}

impl SerialFormats {
    fn new() -> Self {
        Self {
            date: Format::new().set_num_format("dd.mm.yyyy"),
            datetime: Format::new().set_num_format("dd.mm.yyyy hh:mm"),
            time: Format::new().set_num_format("hh:mm:ss"),
            duration: Format::new().set_num_format("[h]:mm:ss"),
        }
    }

    fn for_datetime(&self, serial: f64) -> &Format {
        if serial < 1.0 {
            &self.time
        } else if serial.fract() == 0.0 {
            &self.date
        } else {
            &self.datetime
        }
    }
}

pub fn write_workbook(headers: &[String], rows: &[DataRow], widths: &[usize]) -> Result<Vec<u8>, SheetError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(OUTPUT_SHEET_NAME)?;

    let header_format = Format::new().set_bold();
    let serial_formats = SerialFormats::new();

    for (col, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, header, &header_format)?;
    }

    for (idx, row) in rows.iter().enumerate() {
        let row_num = idx as u32 + 1;
        for (col, header) in headers.iter().enumerate() {
            if let Some(value) = row.get(header) {
                write_cell(sheet, row_num, col as u16, value, &serial_formats)?;
            }
        }
    }

    for (col, width) in widths.iter().enumerate() {
        sheet.set_column_width(col as u16, *width as f64)?;
    }

    Ok(workbook.save_to_buffer()?)
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, value: &CellValue, formats: &SerialFormats) -> Result<(), SheetError> {
    match value {
        CellValue::Empty => {}
        CellValue::Text(s) => {
            sheet.write_string(row, col, s)?;
        }
        CellValue::Number(n) => {
            sheet.write_number(row, col, *n)?;
        }
        CellValue::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        // the decoded serial goes back unchanged, only its display format is picked here
        CellValue::DateTime(serial) => {
            sheet.write_number_with_format(row, col, *serial, formats.for_datetime(*serial))?;
        }
        CellValue::Duration(days) => {
            sheet.write_number_with_format(row, col, *days, &formats.duration)?;
        }
    }
    Ok(())
}
