use serde::Deserialize;
use std::path::Path;

use crate::{BatchError, Result};

/// Columns every table must carry; extra columns are ignored
pub const REQUIRED_COLUMNS: [&str; 3] = ["url", "person", "start_minute"];

/// One record from the input table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Row {
    /// Media-source link handed to the extraction delegate
    pub url: String,

    /// Person the extracted clip belongs to
    pub person: String,

    /// Offset into the media, in minutes; interpreted by the delegate
    pub start_minute: String,
}

/// Read all rows of a CSV table, in file order.
///
/// Fails with [`BatchError::File`] when the table cannot be read and with
/// [`BatchError::Schema`] when required columns are missing or a record is
/// malformed. Values are not validated here.
pub fn read_rows(path: &Path) -> Result<Vec<Row>> {
    // On Linux a directory opens fine and only the first read fails,
    // which would misreport the problem as a header parse error.
    if path.is_dir() {
        return Err(BatchError::File {
            path: path.to_path_buf(),
            source: std::io::Error::other("is a directory"),
        }
        .into());
    }

    let file = fs_err::File::open(path).map_err(|source| BatchError::File {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = csv::Reader::from_reader(file);

    let missing: Vec<&str> = {
        let headers = reader.headers().map_err(|err| BatchError::Schema {
            path: path.to_path_buf(),
            detail: format!("failed to read header row: {}", err),
        })?;

        REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|column| !headers.iter().any(|header| header == *column))
            .collect()
    };

    if !missing.is_empty() {
        return Err(BatchError::Schema {
            path: path.to_path_buf(),
            detail: format!("missing required column(s): {}", missing.join(", ")),
        }
        .into());
    }

    let mut rows = Vec::new();
    for (index, record) in reader.deserialize::<Row>().enumerate() {
        // Line 1 is the header row, so the first record sits on line 2.
        let row = record.map_err(|err| BatchError::Schema {
            path: path.to_path_buf(),
            detail: format!("malformed record on line {}: {}", index + 2, err),
        })?;
        rows.push(row);
    }

    tracing::debug!("Read {} row(s) from {}", rows.len(), path.display());

    Ok(rows)
}
