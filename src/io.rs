use csv::ReaderBuilder;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::dataset::Dataset;
use crate::error::{KMeansError, Result};

/// A numeric table read from delimited text.
#[derive(Debug, Clone)]
pub struct Table {
    pub dataset: Dataset,
    pub headers: Option<Vec<String>>,
}

/// Read a delimited numeric table. Every record must have the same width
/// and every cell must parse as a number.
pub fn read_table<R: Read>(reader: R, delimiter: u8, has_headers: bool) -> Result<Table> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(has_headers)
        .from_reader(reader);

    let headers = if has_headers {
        Some(rdr.headers()?.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    } else {
        None
    };

    let mut records: Vec<Vec<f64>> = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let record = result?;
        let row = record
            .iter()
            .enumerate()
            .map(|(j, x)| {
                x.trim().parse::<f64>().map_err(|_| {
                    KMeansError::invalid(format!("record {} column {}: {:?} is not a number", i, j, x))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        records.push(row);
    }

    if records.is_empty() {
        return Err(KMeansError::invalid("no data lines found"));
    }

    let dataset = Dataset::from_rows(records[0].len(), &records)?;
    Ok(Table { dataset, headers })
}

impl Dataset {
    /// Read a tab separated file with a header line into a dataset.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        let table = read_table(file, b'\t', true)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            rows = table.dataset.size(),
            cols = table.dataset.dimension(),
            "loaded table"
        );
        Ok(table.dataset)
    }
}
