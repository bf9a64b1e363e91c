//! CSV export parsing

use crate::error::Result;
use crate::normalize::{CellValue, RawRow};
use csv::{ReaderBuilder, Trim};

/// Parse a CSV export into raw rows.
///
/// The first record is the header. Records may be shorter or longer than the
/// header; missing cells become [`CellValue::Empty`] and cells under a blank
/// header are dropped. Fully blank records are skipped.
pub fn parse_csv(text: &str) -> Result<Vec<RawRow>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        let row: RawRow = headers
            .iter()
            .enumerate()
            .filter(|(_, header)| !header.is_empty())
            .map(|(idx, header)| {
                let cell = record.get(idx).map(CellValue::from).unwrap_or_default();
                (header.clone(), cell)
            })
            .collect();
        rows.push(row);
    }

    Ok(rows)
}
