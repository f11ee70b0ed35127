//! CSV file reading and writing.
//!
//! Rows are returned as plain string vectors: row 0 is the header row and
//! every later row is positionally addressed through [`HeaderMap`].
//!
//! [`HeaderMap`]: crate::core::headers::HeaderMap

use crate::core::error::{PceError, PceResult};
use std::io::{Read, Write};
use std::path::Path;

pub type Row = Vec<String>;

pub fn read_rows(path: &Path) -> PceResult<Vec<Row>> {
    let file = std::fs::File::open(path).map_err(PceError::IoError)?;
    read_rows_from(file)
}

pub fn read_rows_from<R: Read>(reader: R) -> PceResult<Vec<Row>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect::<Row>());
    }

    match rows.first_mut() {
        None => Err(PceError::validation(1, "CSV file is empty; expected a header row")),
        Some(header) => {
            if let Some(first) = header.first_mut() {
                *first = first.trim_start_matches('\u{feff}').to_string();
            }
            Ok(rows)
        }
    }
}

/// 1-based file line for a data row index (row 0 is the header).
pub fn line_number(row_index: usize) -> usize {
    row_index + 1
}

pub fn is_blank(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}

pub fn write_rows<W: Write>(writer: W, header: &[&str], rows: &[Row]) -> PceResult<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(header)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush().map_err(PceError::IoError)?;
    Ok(())
}

pub fn write_file(path: &Path, header: &[&str], rows: &[Row]) -> PceResult<()> {
    let file = std::fs::File::create(path).map_err(PceError::IoError)?;
    write_rows(file, header, rows)
}
