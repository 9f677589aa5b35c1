//! Structured extraction from spreadsheet workbooks.
//!
//! Each sheet is matched against the header vocabularies; a sheet with an
//! identifying column and a price column contributes rows, everything else
//! is skipped silently. A workbook with zero usable sheets yields an empty
//! result, not an error.

use crate::columns::match_columns;
use crate::error::ExtractError;
use crate::record::RawCandidate;
use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info};

/// One sheet reduced to cell strings, ready for column matching.
#[derive(Debug, Clone)]
pub struct SheetData {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

/// Load every sheet of a workbook on disk.
pub fn load_workbook(path: &Path, source_file: &str) -> Result<Vec<SheetData>, ExtractError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| ExtractError::WorkbookError {
        source_file: source_file.to_string(),
        detail: e.to_string(),
    })?;
    collect_sheets(&mut workbook, source_file)
}

/// Load every sheet of a workbook held in memory.
pub fn load_workbook_from_bytes(
    data: &[u8],
    source_file: &str,
) -> Result<Vec<SheetData>, ExtractError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(data.to_vec())).map_err(|e| {
        ExtractError::WorkbookError {
            source_file: source_file.to_string(),
            detail: e.to_string(),
        }
    })?;
    collect_sheets(&mut workbook, source_file)
}

fn collect_sheets<R, RS>(workbook: &mut R, source_file: &str) -> Result<Vec<SheetData>, ExtractError>
where
    R: Reader<RS>,
    RS: std::io::Read + std::io::Seek,
    R::Error: std::fmt::Display,
{
    let names = workbook.sheet_names();
    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ExtractError::WorkbookError {
                source_file: source_file.to_string(),
                detail: format!("sheet {name}: {e}"),
            })?;
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();
        sheets.push(SheetData { name, rows });
    }
    Ok(sheets)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                format!("{f}")
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
    }
}

/// Run the column matcher over each sheet and project the matched columns
/// into raw candidates. `page` is the 1-based sheet position.
pub fn candidates_from_sheets(sheets: &[SheetData]) -> Vec<RawCandidate> {
    let mut candidates = Vec::new();
    for (sheet_idx, sheet) in sheets.iter().enumerate() {
        let Some((header, data_rows)) = sheet.rows.split_first() else {
            debug!("sheet {}: empty, skipped", sheet.name);
            continue;
        };
        let map = match_columns(header);
        if !map.is_usable() {
            debug!("sheet {}: no usable columns, skipped", sheet.name);
            continue;
        }

        let page = Some(sheet_idx as u32 + 1);
        let mut sheet_rows = 0usize;
        for row in data_rows {
            let cell = |idx: Option<usize>| -> Option<String> {
                idx.and_then(|i| row.get(i))
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            };

            let code = cell(map.code);
            // A sheet without a description column names products by code.
            let description = match cell(map.description).or_else(|| code.clone()) {
                Some(d) => d,
                None => continue,
            };
            let Some(price_raw) = cell(map.price) else {
                continue;
            };

            candidates.push(RawCandidate {
                code,
                short_code: cell(map.short_code),
                description,
                price_raw,
                currency: cell(map.currency),
                page,
                section: cell(map.section),
                subsection: cell(map.subsection),
                year: map.price_year,
            });
            sheet_rows += 1;
        }
        info!("sheet {}: {} candidate rows", sheet.name, sheet_rows);
    }
    candidates
}
