//! Raw file reader
//!
//! Decodes uploaded bytes with the file config's encoding, splits them with
//! its delimiter and yields one `RawRecord` per data row. Headers are
//! trimmed and upper-cased so configs can name columns case-insensitively.

use csv::ReaderBuilder;
use encoding_rs::Encoding;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{FieldValue, FileConfig, RawRecord};

/// Decoded file: normalized header names and the data rows
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub headers: Vec<String>,
    pub rows: Vec<RawRecord>,
}

/// Decode raw bytes using an encoding label such as `utf-8` or `windows-1252`
pub fn decode(bytes: &[u8], label: &str) -> Result<String> {
    let encoding = Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| Error::Config(format!("Unknown encoding '{}'", label)))?;

    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(Error::Parse(format!(
            "File is not valid {}",
            used.name()
        )));
    }
    Ok(text.into_owned())
}

fn delimiter_byte(delimiter: char) -> Result<u8> {
    if delimiter.is_ascii() {
        Ok(delimiter as u8)
    } else {
        Err(Error::Config(format!(
            "Delimiter '{}' must be a single ASCII character",
            delimiter
        )))
    }
}

/// Parse an uploaded file according to its config
///
/// Fails with `Error::Parse` when the file has no header or lacks one of the
/// config's expected columns. Short rows are kept; their missing cells are
/// simply absent from the record.
pub fn read_records(bytes: &[u8], config: &FileConfig) -> Result<ParsedFile> {
    let text = decode(bytes, &config.encoding)?;
    if text.trim().is_empty() {
        return Err(Error::Parse("File is empty".into()));
    }

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter_byte(config.delimiter)?)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| Error::Parse(format!("Unreadable header: {}", e)))?
        .iter()
        .map(|h| h.trim().to_uppercase())
        .collect();

    let missing: Vec<&str> = config
        .expected_columns
        .iter()
        .map(String::as_str)
        .filter(|col| !headers.iter().any(|h| h == col))
        .collect();
    if !missing.is_empty() {
        return Err(Error::Parse(format!(
            "Missing expected columns: {}",
            missing.join(", ")
        )));
    }

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| Error::Parse(format!("Unreadable row: {}", e)))?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 2);

        let mut row = RawRecord::new(line);
        for (header, value) in headers.iter().zip(record.iter()) {
            if header.is_empty() {
                continue;
            }
            row.set(header, FieldValue::Text(value.to_string()));
        }
        rows.push(row);
    }

    debug!(
        rows = rows.len(),
        columns = headers.len(),
        "Parsed uploaded file"
    );
    Ok(ParsedFile { headers, rows })
}
