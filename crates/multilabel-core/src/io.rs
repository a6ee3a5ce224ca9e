//! Delimited text reader producing typed tables.
//!
//! Column types are inferred from the non-missing values: all integers gives an
//! integer column, all numbers a double column, anything else a string column.
//! String columns get their domain from the values present.
use std::io::Read;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use csv::StringRecord;

use crate::table::{Cell, ColumnSpec, ColumnType, Table, TableSpec};

/// Configuration for reading delimited files.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub delimiter: u8,
    /// Raw values read as missing cells.
    pub missing_tokens: Vec<String>,
    /// Columns always read as strings, e.g. label columns written as 0/1.
    pub string_columns: Vec<String>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            missing_tokens: vec![String::new(), "?".to_string()],
            string_columns: Vec::new(),
        }
    }
}

impl ReaderConfig {
    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            ..Self::default()
        }
    }

    fn is_missing(&self, raw: &str) -> bool {
        self.missing_tokens.iter().any(|t| t == raw.trim())
    }
}

/// Read a delimited file with a header row into a table.
pub fn read_table<P: AsRef<Path>>(path: P, config: &ReaderConfig) -> Result<Table> {
    let file = std::fs::File::open(&path)
        .with_context(|| format!("Failed to open table: {}", path.as_ref().display()))?;
    read_table_from(file, config)
        .with_context(|| format!("Failed to read table: {}", path.as_ref().display()))
}

pub fn read_table_from<R: Read>(input: R, config: &ReaderConfig) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter)
        .has_headers(true)
        .from_reader(input);

    let headers = reader
        .headers()
        .context("Failed to read header row")?
        .clone();
    if headers.is_empty() {
        return Err(anyhow!("Header row has no columns"));
    }

    let mut records: Vec<StringRecord> = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;
        if record.len() != headers.len() {
            return Err(anyhow!(
                "Row {} has {} fields, expected {}",
                row_idx + 1,
                record.len(),
                headers.len()
            ));
        }
        records.push(record);
    }

    let types: Vec<ColumnType> = headers
        .iter()
        .enumerate()
        .map(|(c, name)| {
            if config.string_columns.iter().any(|s| s == name) {
                ColumnType::String
            } else {
                infer_type(records.iter().filter_map(|r| r.get(c)), config)
            }
        })
        .collect();

    let rows = records
        .iter()
        .map(|record| {
            record
                .iter()
                .zip(&types)
                .map(|(raw, ty)| parse_cell(raw, ty, config))
                .collect()
        })
        .collect();

    let spec = TableSpec::new(
        headers
            .iter()
            .zip(types)
            .map(|(name, ty)| ColumnSpec::new(name.trim(), ty))
            .collect(),
    );
    log::debug!(
        "Read table with {} columns and {} rows",
        spec.num_columns(),
        records.len()
    );
    Ok(Table::new(spec, rows).with_computed_domains())
}

fn infer_type<'a>(values: impl Iterator<Item = &'a str>, config: &ReaderConfig) -> ColumnType {
    let mut ty = ColumnType::Integer;
    for raw in values.filter(|v| !config.is_missing(v)) {
        let raw = raw.trim();
        if ty == ColumnType::Integer && raw.parse::<i64>().is_err() {
            ty = ColumnType::Double;
        }
        if ty == ColumnType::Double && raw.parse::<f64>().is_err() {
            return ColumnType::String;
        }
    }
    ty
}

fn parse_cell(raw: &str, ty: &ColumnType, config: &ReaderConfig) -> Cell {
    if config.is_missing(raw) {
        return Cell::Missing;
    }
    let raw = raw.trim();
    match ty {
        ColumnType::Integer => raw.parse().map(Cell::Int).unwrap_or(Cell::Missing),
        ColumnType::Double => raw.parse().map(Cell::Double).unwrap_or(Cell::Missing),
        _ => Cell::from(raw),
    }
}
