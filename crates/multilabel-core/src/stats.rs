//! Labelset statistics over a train/test split.
//!
//! A cell is treated as a label cell when it is a string cell or sits at or
//! before the last target column. A label cell is an occurrence unless it is
//! missing or renders as "0". A row's signature is built from its label cells
//! and identifies its labelset.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::table::{Cell, TableSpec};

/// Separator between cells of a delimited signature (ASCII unit separator).
pub const SIGNATURE_DELIMITER: char = '\u{1f}';

/// How a row's label cells are joined into a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureMode {
    /// Cells joined with [`SIGNATURE_DELIMITER`]; "1","11" and "11","1" differ.
    #[default]
    Delimited,
    /// Cells concatenated without separator. Distinct labelsets may collide.
    Concatenated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitStatistics {
    pub rows: usize,
    /// Total label occurrences.
    pub labels_number: usize,
    pub unique_labelsets: usize,
    /// Label occurrences per row; 0 for an empty split.
    pub cardinality: f64,
    /// Cardinality divided by the number of label columns.
    pub density: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelsetReport {
    pub train: SplitStatistics,
    pub test: SplitStatistics,
    pub combined: SplitStatistics,
}

struct Accumulated {
    rows: usize,
    labels: usize,
    signatures: HashSet<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct LabelsetStatistics {
    last_target: usize,
    mode: SignatureMode,
}

impl LabelsetStatistics {
    pub fn new(last_target: usize, mode: SignatureMode) -> Self {
        Self { last_target, mode }
    }

    /// Statistics whose label columns end at column `target` of `spec`.
    pub fn for_target(spec: &TableSpec, target: &str, mode: SignatureMode) -> Result<Self, SchemaError> {
        let idx = spec
            .find_column(target)
            .ok_or_else(|| SchemaError::MissingTarget(target.to_string()))?;
        Ok(Self::new(idx, mode))
    }

    fn num_label_columns(&self) -> usize {
        self.last_target + 1
    }

    fn is_label_cell(&self, idx: usize, cell: &Cell) -> bool {
        idx <= self.last_target || matches!(cell, Cell::Str(_))
    }

    fn signature(&self, row: &[Cell]) -> String {
        let parts = row
            .iter()
            .enumerate()
            .filter(|(i, c)| self.is_label_cell(*i, c))
            .map(|(_, c)| c.to_string());
        match self.mode {
            SignatureMode::Delimited => parts.collect::<Vec<_>>().join(&SIGNATURE_DELIMITER.to_string()),
            SignatureMode::Concatenated => parts.collect(),
        }
    }

    fn accumulate<'r, I>(&self, rows: I) -> Accumulated
    where
        I: IntoIterator<Item = &'r [Cell]>,
    {
        let mut acc = Accumulated {
            rows: 0,
            labels: 0,
            signatures: HashSet::new(),
        };
        for row in rows {
            acc.rows += 1;
            acc.labels += row
                .iter()
                .enumerate()
                .filter(|(i, c)| self.is_label_cell(*i, c))
                .filter(|(_, c)| !c.is_missing() && c.to_string() != "0")
                .count();
            acc.signatures.insert(self.signature(row));
        }
        acc
    }

    fn finish(&self, rows: usize, labels: usize, unique: usize) -> SplitStatistics {
        let cardinality = if rows == 0 {
            0.0
        } else {
            labels as f64 / rows as f64
        };
        SplitStatistics {
            rows,
            labels_number: labels,
            unique_labelsets: unique,
            cardinality,
            density: cardinality / self.num_label_columns() as f64,
        }
    }

    pub fn compute<'r, A, B>(&self, train: A, test: B) -> LabelsetReport
    where
        A: IntoIterator<Item = &'r [Cell]>,
        B: IntoIterator<Item = &'r [Cell]>,
    {
        let train = self.accumulate(train);
        let test = self.accumulate(test);
        let unique_combined = train.signatures.union(&test.signatures).count();

        let report = LabelsetReport {
            train: self.finish(train.rows, train.labels, train.signatures.len()),
            test: self.finish(test.rows, test.labels, test.signatures.len()),
            combined: self.finish(
                train.rows + test.rows,
                train.labels + test.labels,
                unique_combined,
            ),
        };
        log::debug!(
            "Labelsets: {} train, {} test, {} combined",
            report.train.unique_labelsets,
            report.test.unique_labelsets,
            report.combined.unique_labelsets
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(cells: &[[&str; 2]]) -> Vec<Vec<Cell>> {
        cells
            .iter()
            .map(|r| r.iter().map(|&c| Cell::from(c)).collect())
            .collect()
    }

    #[test]
    fn delimited_signatures_do_not_collide() {
        let data = rows(&[["1", "11"], ["11", "1"]]);
        let it = || data.iter().map(|r| r.as_slice());

        let delimited = LabelsetStatistics::new(1, SignatureMode::Delimited);
        assert_eq!(delimited.compute(it(), std::iter::empty()).train.unique_labelsets, 2);

        let concatenated = LabelsetStatistics::new(1, SignatureMode::Concatenated);
        assert_eq!(concatenated.compute(it(), std::iter::empty()).train.unique_labelsets, 1);
    }

    #[test]
    fn empty_split_has_zero_cardinality() {
        let stats = LabelsetStatistics::new(0, SignatureMode::Delimited);
        let report = stats.compute(std::iter::empty(), std::iter::empty());
        assert_eq!(report.train.cardinality, 0.0);
        assert_eq!(report.combined.density, 0.0);
        assert_eq!(report.test.unique_labelsets, 0);
    }

    #[test]
    fn combined_uses_union_of_signatures() {
        let train = rows(&[["1", "0"], ["0", "1"]]);
        let test = rows(&[["1", "0"], ["1", "1"]]);
        let stats = LabelsetStatistics::new(1, SignatureMode::Delimited);
        let report = stats.compute(
            train.iter().map(|r| r.as_slice()),
            test.iter().map(|r| r.as_slice()),
        );
        assert_eq!(report.combined.unique_labelsets, 3);
        assert_eq!(report.combined.labels_number, 5);
        assert!((report.combined.cardinality - 1.25).abs() < 1e-12);
        assert!((report.combined.density - 0.625).abs() < 1e-12);
    }
}
