//! Tabular data model handed over by the host: typed columns with optional
//! known value domains, and rows of cells.
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// One cell of a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Cell {
    Missing,
    Int(i64),
    Double(f64),
    Str(String),
}

impl Cell {
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    /// Numeric view of integer and double cells.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(v) => Some(*v as f64),
            Cell::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Cell::Missing => "missing",
            Cell::Int(_) => "integer",
            Cell::Double(_) => "double",
            Cell::Str(_) => "string",
        }
    }

    /// Natural order used to sort nominal domains: missing first, then
    /// numbers by value, then strings lexicographically.
    pub fn total_cmp(&self, other: &Cell) -> Ordering {
        fn rank(c: &Cell) -> u8 {
            match c {
                Cell::Missing => 0,
                Cell::Int(_) | Cell::Double(_) => 1,
                Cell::Str(_) => 2,
            }
        }
        match (self, other) {
            (Cell::Int(a), Cell::Int(b)) => a.cmp(b),
            (Cell::Str(a), Cell::Str(b)) => a.cmp(b),
            (a, b) if rank(a) == 1 && rank(b) == 1 => {
                let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                x.total_cmp(&y)
            }
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Cell::Missing, Cell::Missing) => true,
            (Cell::Int(a), Cell::Int(b)) => a == b,
            (Cell::Double(a), Cell::Double(b)) => a.to_bits() == b.to_bits(),
            (Cell::Str(a), Cell::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Cell {}

impl Hash for Cell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Cell::Missing => {}
            Cell::Int(v) => v.hash(state),
            Cell::Double(v) => v.to_bits().hash(state),
            Cell::Str(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Missing => write!(f, "?"),
            Cell::Int(v) => write!(f, "{}", v),
            Cell::Double(v) => write!(f, "{}", v),
            Cell::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Str(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Str(s)
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Double(v)
    }
}

/// Declared column type. `Other` carries the host's type name for columns the
/// core cannot convert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,
    Double,
    String,
    Other(String),
}

impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Double)
    }

    pub fn name(&self) -> &str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Double => "double",
            ColumnType::String => "string",
            ColumnType::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    /// Known possible values, if the host computed them.
    pub domain: Option<Vec<Cell>>,
}

impl ColumnSpec {
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            domain: None,
        }
    }

    pub fn integer(name: &str) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub fn double(name: &str) -> Self {
        Self::new(name, ColumnType::Double)
    }

    pub fn string(name: &str) -> Self {
        Self::new(name, ColumnType::String)
    }

    pub fn with_domain<I, C>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Cell>,
    {
        self.domain = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn has_domain(&self) -> bool {
        self.domain.as_ref().map_or(false, |d| !d.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableSpec {
    columns: Vec<ColumnSpec>,
}

impl TableSpec {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, idx: usize) -> &ColumnSpec {
        &self.columns[idx]
    }

    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// An in-memory table: a spec plus rows of cells aligned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    spec: TableSpec,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(spec: TableSpec, rows: Vec<Vec<Cell>>) -> Self {
        Self { spec, rows }
    }

    pub fn spec(&self) -> &TableSpec {
        &self.spec
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, idx: usize) -> &[Cell] {
        &self.rows[idx]
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[Cell]> + '_ {
        self.rows.iter().map(|r| r.as_slice())
    }

    /// Fill in the domain of every string column that has none, from the
    /// distinct non-missing values present in the rows.
    pub fn with_computed_domains(mut self) -> Self {
        for c in 0..self.spec.columns.len() {
            let col = &self.spec.columns[c];
            if col.column_type != ColumnType::String || col.has_domain() {
                continue;
            }
            let mut seen = HashSet::new();
            let mut values = Vec::new();
            for row in &self.rows {
                if let Some(cell) = row.get(c) {
                    if !cell.is_missing() && seen.insert(cell.clone()) {
                        values.push(cell.clone());
                    }
                }
            }
            self.spec.columns[c].domain = Some(values);
        }
        self
    }

    pub fn select_rows(&self, indices: &[usize]) -> Table {
        Table {
            spec: self.spec.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Shuffle the rows with a seeded generator and split them into a
    /// training part holding `fraction` of the rows and a test part.
    pub fn split(&self, fraction: f64, seed: u64) -> (Table, Table) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut indices: Vec<usize> = (0..self.rows.len()).collect();
        indices.shuffle(&mut rng);

        let n_train = ((self.rows.len() as f64) * fraction.clamp(0.0, 1.0)) as usize;
        let (train, test) = indices.split_at(n_train);
        (self.select_rows(train), self.select_rows(test))
    }
}
