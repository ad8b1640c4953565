//! Sheet Reader: uploaded file bytes to a row-oriented grid.
//!
//! The grid front-loads two synthetic rows: row 0 carries spreadsheet
//! column letters, row 1 the detected title row (blank header cells get a
//! positional placeholder). Everything after that is raw data, with
//! date cells rendered as `DD-MM-YYYY` strings for the preview.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use platform_core::error::AppError;
use std::io::Cursor;

/// Preview rendering for date and datetime cells.
pub const PREVIEW_DATE_FORMAT: &str = "%d-%m-%Y";

#[derive(Debug, Clone)]
pub struct SheetGrid {
    /// Index of the detected title row in the uploaded sheet.
    pub title_row_index: usize,
    rows: Vec<Vec<String>>,
}

impl SheetGrid {
    pub fn column_labels(&self) -> &[String] {
        &self.rows[0]
    }

    pub fn header(&self) -> &[String] {
        &self.rows[1]
    }

    /// Raw data rows after the title row, in file order.
    pub fn data_rows(&self) -> &[Vec<String>] {
        &self.rows[2..]
    }

    pub fn width(&self) -> usize {
        self.rows[0].len()
    }

    /// Full grid including the synthetic label and header rows.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }
}

/// Parse an uploaded spreadsheet. The format is chosen from the file
/// name: `.csv` goes through the csv reader, everything else through
/// calamine's auto-detection (xlsx, xls, xlsb, ods).
pub fn read_sheet(file_name: &str, bytes: &[u8]) -> Result<SheetGrid, AppError> {
    let extension = file_name
        .rsplit('.')
        .next()
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let raw = if extension == "csv" {
        read_csv(bytes)?
    } else {
        read_workbook(bytes)?
    };

    grid_from_rows(raw)
}

fn read_workbook(bytes: &[u8]) -> Result<Vec<Vec<String>>, AppError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Unable to read the uploaded file: {}", e)))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let sheet_name = sheet_names
        .first()
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("The uploaded sheet is empty")))?
        .clone();

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Unable to read the uploaded file: {}", e)))?;

    let rows = range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();

    Ok(rows)
}

fn read_csv(bytes: &[u8]) -> Result<Vec<Vec<String>>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| {
            AppError::BadRequest(anyhow::anyhow!("Unable to read the uploaded file: {}", e))
        })?;
        rows.push(record.iter().map(|c| c.to_string()).collect());
    }

    Ok(rows)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            // Excel hands integers back as floats; render 100.0 as "100"
            // so quantity comparisons work on canonical strings.
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format(PREVIEW_DATE_FORMAT).to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) => s
            .split('T')
            .next()
            .and_then(|d| chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .map(|d| d.format(PREVIEW_DATE_FORMAT).to_string())
            .unwrap_or_else(|| s.clone()),
        Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
    }
}

/// Assemble the preview grid from raw cell rows. Shared by both readers,
/// and the seam the unit tests drive directly.
pub(crate) fn grid_from_rows(raw: Vec<Vec<String>>) -> Result<SheetGrid, AppError> {
    let last_populated = raw
        .iter()
        .rposition(|row| row.iter().any(|c| !c.trim().is_empty()))
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("The uploaded sheet is empty")))?;

    let width = raw[..=last_populated]
        .iter()
        .map(|r| r.len())
        .max()
        .unwrap_or(0);
    if width == 0 {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "The uploaded sheet is empty"
        )));
    }

    // The title row is the populated row with the fewest blank cells;
    // ties resolve to the earliest row.
    let title_row_index = raw[..=last_populated]
        .iter()
        .enumerate()
        .filter(|(_, row)| row.iter().any(|c| !c.trim().is_empty()))
        .min_by_key(|(_, row)| {
            let blanks_in_row = row.iter().filter(|c| c.trim().is_empty()).count();
            blanks_in_row + (width - row.len().min(width))
        })
        .map(|(i, _)| i)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("The uploaded sheet is empty")))?;

    let mut rows = Vec::with_capacity(last_populated - title_row_index + 2);
    rows.push((0..width).map(column_letter).collect());

    let header = (0..width)
        .map(|col| {
            let cell = raw[title_row_index]
                .get(col)
                .map(|c| c.trim())
                .unwrap_or("");
            if cell.is_empty() {
                format!("Column {}", col + 1)
            } else {
                cell.to_string()
            }
        })
        .collect();
    rows.push(header);

    for row in &raw[title_row_index + 1..=last_populated] {
        let mut padded: Vec<String> = row.iter().map(|c| c.trim().to_string()).collect();
        padded.resize(width, String::new());
        rows.push(padded);
    }

    Ok(SheetGrid {
        title_row_index,
        rows,
    })
}

/// Spreadsheet-style column label: A..Z, AA..AZ, BA..
fn column_letter(mut index: usize) -> String {
    let mut label = String::new();
    loop {
        label.insert(0, (b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    label
}
