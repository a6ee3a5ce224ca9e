//! Row Converter: rows of cells to fixed-width feature vectors.
//!
//! Slot `i` of a feature vector belongs to attribute `i`. Numeric attributes
//! hold the cell value, nominal attributes hold the index of the cell's token
//! in the attribute's value list, and missing cells hold [`MISSING`].
//!
//! Two converters exist. [`TrainingConverter`] may assign new tokens and grow
//! open nominal attributes. [`PredictionConverter`] only reads the mapper and
//! schema of a trained model, so an unseen value is an error rather than a
//! silently shifted index.
use std::sync::Arc;

use crate::error::{CoreError, EncodingError, Result};
use crate::mapper::ValueMapper;
use crate::math::Array2;
use crate::progress::{CancellationSource, ProgressMonitor};
use crate::schema::{Attribute, Schema};
use crate::table::Cell;

/// Sentinel stored in a slot whose source cell is missing.
pub const MISSING: f64 = f64::NAN;

pub fn is_missing(value: f64) -> bool {
    value.is_nan()
}

/// Locate the source cell of slot `slot`. `None` means the slot stays missing.
/// Entries of `order` past the last slot are never read.
fn source_cell<'r>(row: &'r [Cell], order: Option<&[isize]>, slot: usize) -> Option<&'r Cell> {
    let idx = match order {
        None => slot,
        Some(order) => match order.get(slot) {
            Some(&pos) if pos >= 0 => pos as usize,
            _ => return None,
        },
    };
    row.get(idx).filter(|c| !c.is_missing())
}

fn encode_numeric(attr: &Attribute, cell: &Cell) -> std::result::Result<f64, EncodingError> {
    cell.as_f64().ok_or_else(|| EncodingError::TypeMismatch {
        column: attr.name.clone(),
        expected: "numeric",
        value: cell.to_string(),
    })
}

fn expect_string(attr: &Attribute, cell: &Cell) -> std::result::Result<(), EncodingError> {
    match cell {
        Cell::Str(_) => Ok(()),
        other => Err(EncodingError::TypeMismatch {
            column: attr.name.clone(),
            expected: "string",
            value: other.to_string(),
        }),
    }
}

fn unknown_value(attr: &Attribute, cell: &Cell) -> EncodingError {
    EncodingError::UnknownValue {
        column: attr.name.clone(),
        value: cell.to_string(),
    }
}

/// Converts rows while a model is being trained.
pub struct TrainingConverter<'a> {
    schema: &'a mut Schema,
    mapper: &'a mut ValueMapper,
}

impl<'a> TrainingConverter<'a> {
    pub fn new(schema: &'a mut Schema, mapper: &'a mut ValueMapper) -> Self {
        Self { schema, mapper }
    }

    pub fn convert_row(
        &mut self,
        row: &[Cell],
        order: Option<&[isize]>,
    ) -> std::result::Result<Vec<f64>, EncodingError> {
        let mut instance = vec![MISSING; self.schema.len()];
        for (slot, value) in instance.iter_mut().enumerate() {
            let Some(cell) = source_cell(row, order, slot) else {
                continue;
            };
            *value = self.encode(slot, cell)?;
        }
        Ok(instance)
    }

    fn encode(&mut self, slot: usize, cell: &Cell) -> std::result::Result<f64, EncodingError> {
        let attr = self.schema.attribute(slot);
        if attr.is_numeric() {
            return encode_numeric(attr, cell);
        }
        expect_string(attr, cell)?;

        if !attr.is_open() {
            return self
                .mapper
                .token_of(cell)
                .and_then(|token| attr.index_of(token))
                .map(|idx| idx as f64)
                .ok_or_else(|| unknown_value(attr, cell));
        }

        let token = self.mapper.encode(cell).to_string();
        if let Some(idx) = self.schema.attribute(slot).index_of(&token) {
            return Ok(idx as f64);
        }
        let attr_name = self.schema.attribute(slot).name.clone();
        match self.schema.grow_nominal(slot, &token) {
            Some(idx) => {
                log::trace!("Added value '{}' to open attribute '{}'", token, attr_name);
                Ok(idx as f64)
            }
            None => Err(EncodingError::UnknownValue {
                column: attr_name,
                value: cell.to_string(),
            }),
        }
    }
}

/// Converts rows against a trained model's frozen schema and mapper. Safe to
/// share across threads.
#[derive(Clone, Copy)]
pub struct PredictionConverter<'a> {
    schema: &'a Schema,
    mapper: &'a ValueMapper,
}

impl<'a> PredictionConverter<'a> {
    pub fn new(schema: &'a Schema, mapper: &'a ValueMapper) -> Self {
        Self { schema, mapper }
    }

    pub fn convert_row(
        &self,
        row: &[Cell],
        order: Option<&[isize]>,
    ) -> std::result::Result<Vec<f64>, EncodingError> {
        let mut instance = vec![MISSING; self.schema.len()];
        for (slot, value) in instance.iter_mut().enumerate() {
            let Some(cell) = source_cell(row, order, slot) else {
                continue;
            };
            let attr = self.schema.attribute(slot);
            *value = if attr.is_numeric() {
                encode_numeric(attr, cell)?
            } else {
                expect_string(attr, cell)?;
                self.mapper
                    .token_of(cell)
                    .and_then(|token| attr.index_of(token))
                    .map(|idx| idx as f64)
                    .ok_or_else(|| unknown_value(attr, cell))?
            };
        }
        Ok(instance)
    }
}

/// Convert a sequence of rows into a feature matrix of width `width`,
/// reporting progress and checking `cancel` after every row.
pub fn convert_rows<'r, I, F>(
    rows: I,
    width: usize,
    row_count: Option<usize>,
    monitor: &dyn ProgressMonitor,
    cancel: &dyn CancellationSource,
    mut convert: F,
) -> Result<Array2<f64>>
where
    I: IntoIterator<Item = &'r [Cell]>,
    F: FnMut(&[Cell]) -> std::result::Result<Vec<f64>, EncodingError>,
{
    let mut features = Array2::empty(width);
    for (idx, row) in rows.into_iter().enumerate() {
        let instance = convert(row).map_err(|e| CoreError::encoding(idx, e))?;
        features.push_row(instance)?;

        let done = idx + 1;
        if let Some(total) = row_count.filter(|&t| t > 0) {
            monitor.set_progress(
                done as f64 / total as f64,
                &format!("Converting instances: {} of {}", done, total),
            );
        }
        if cancel.is_cancel_requested() {
            log::info!("Conversion cancelled after {} rows", done);
            return Err(CoreError::Cancelled);
        }
    }
    Ok(features)
}

/// A converted table: the feature matrix, the schema it was encoded against
/// and the attribute indices of the label columns.
#[derive(Debug, Clone)]
pub struct Dataset {
    schema: Arc<Schema>,
    features: Array2<f64>,
    targets: Vec<usize>,
}

impl Dataset {
    pub fn new(schema: Arc<Schema>, features: Array2<f64>, targets: Vec<usize>) -> Result<Self> {
        if features.ncols() != schema.len() {
            return Err(CoreError::InvalidInput(format!(
                "feature matrix has {} columns but the schema has {} attributes",
                features.ncols(),
                schema.len()
            )));
        }
        if let Some(&bad) = targets.iter().find(|&&t| t >= schema.len()) {
            return Err(CoreError::InvalidInput(format!(
                "target index {} out of range for {} attributes",
                bad,
                schema.len()
            )));
        }
        Ok(Self {
            schema,
            features,
            targets,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn targets(&self) -> &[usize] {
        &self.targets
    }

    pub fn num_rows(&self) -> usize {
        self.features.nrows()
    }

    pub fn num_labels(&self) -> usize {
        self.targets.len()
    }

    /// Attribute indices that are not labels, in schema order.
    pub fn input_indices(&self) -> Vec<usize> {
        (0..self.schema.len())
            .filter(|i| !self.targets.contains(i))
            .collect()
    }

    /// Feature columns without the labels.
    pub fn input_matrix(&self) -> Array2<f64> {
        self.features.select_columns(&self.input_indices())
    }

    /// Label values per row and target; `None` where the label is missing.
    pub fn labels(&self) -> Array2<Option<bool>> {
        let mut data = Vec::with_capacity(self.num_rows() * self.num_labels());
        for row in self.features.rows() {
            for &t in &self.targets {
                data.push(self.schema.attribute(t).label_positive(row[t]));
            }
        }
        Array2::from_shape_vec((self.num_rows(), self.num_labels()), data)
            .unwrap_or_else(|_| Array2::empty(self.num_labels()))
    }

    /// Binary ground truth; missing labels count as negative.
    pub fn label_truth(&self) -> Array2<u8> {
        self.labels().mapv(|l| u8::from(l.unwrap_or(false)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{NeverCancel, NoProgress};
    use crate::schema::{NominalPolicy, SchemaTranslator};
    use crate::table::{ColumnSpec, TableSpec};

    fn spec() -> TableSpec {
        TableSpec::new(vec![
            ColumnSpec::double("x"),
            ColumnSpec::string("s").with_domain(["c", "a", "b"]),
        ])
    }

    #[test]
    fn converts_numeric_and_nominal() {
        let mut mapper = ValueMapper::new();
        let schema = SchemaTranslator::default().translate(&spec(), &mut mapper).unwrap();
        let conv = PredictionConverter::new(&schema, &mapper);

        let v = conv.convert_row(&[Cell::Double(2.5), Cell::from("b")], None).unwrap();
        assert_eq!(v, vec![2.5, 1.0]);
    }

    #[test]
    fn missing_cells_and_short_rows_become_missing() {
        let mut mapper = ValueMapper::new();
        let schema = SchemaTranslator::default().translate(&spec(), &mut mapper).unwrap();
        let conv = PredictionConverter::new(&schema, &mapper);

        let v = conv.convert_row(&[Cell::Missing, Cell::from("a")], None).unwrap();
        assert!(is_missing(v[0]));
        assert_eq!(v[1], 0.0);

        let v = conv.convert_row(&[Cell::Int(3)], None).unwrap();
        assert_eq!(v[0], 3.0);
        assert!(is_missing(v[1]));
    }

    #[test]
    fn order_permutes_and_marks_unfilled() {
        let mut mapper = ValueMapper::new();
        let schema = SchemaTranslator::default().translate(&spec(), &mut mapper).unwrap();
        let conv = PredictionConverter::new(&schema, &mapper);
        let row = [Cell::from("c"), Cell::Double(1.5)];

        let v = conv.convert_row(&row, Some(&[1, 0])).unwrap();
        assert_eq!(v, vec![1.5, 2.0]);

        let v = conv.convert_row(&row, Some(&[-1, 7])).unwrap();
        assert!(v.iter().all(|&x| is_missing(x)));

        // Trailing entries beyond the schema width are ignored.
        let v = conv.convert_row(&row, Some(&[1, 0, 5, -1])).unwrap();
        assert_eq!(v, vec![1.5, 2.0]);
    }

    #[test]
    fn prediction_rejects_unknown_values() {
        let mut mapper = ValueMapper::new();
        let schema = SchemaTranslator::default().translate(&spec(), &mut mapper).unwrap();
        let before = mapper.clone();
        let conv = PredictionConverter::new(&schema, &mapper);

        let err = conv.convert_row(&[Cell::Double(0.0), Cell::from("zzz")], None).unwrap_err();
        assert_eq!(
            err,
            EncodingError::UnknownValue {
                column: "s".into(),
                value: "zzz".into()
            }
        );
        assert_eq!(mapper, before);
    }

    #[test]
    fn type_mismatch_is_reported() {
        let mut mapper = ValueMapper::new();
        let schema = SchemaTranslator::default().translate(&spec(), &mut mapper).unwrap();
        let conv = PredictionConverter::new(&schema, &mapper);

        let err = conv.convert_row(&[Cell::from("a"), Cell::from("a")], None).unwrap_err();
        assert!(matches!(err, EncodingError::TypeMismatch { expected: "numeric", .. }));
    }

    #[test]
    fn open_attributes_grow_only_during_training() {
        let spec = TableSpec::new(vec![ColumnSpec::string("s")]);
        let mut mapper = ValueMapper::new();
        let mut schema = SchemaTranslator::new(NominalPolicy::Open)
            .translate(&spec, &mut mapper)
            .unwrap();

        {
            let mut conv = TrainingConverter::new(&mut schema, &mut mapper);
            assert_eq!(conv.convert_row(&[Cell::from("q")], None).unwrap(), vec![0.0]);
            assert_eq!(conv.convert_row(&[Cell::from("p")], None).unwrap(), vec![1.0]);
            assert_eq!(conv.convert_row(&[Cell::from("q")], None).unwrap(), vec![0.0]);
        }
        assert_eq!(schema.attribute(0).values(), &["q", "p"]);

        let conv = PredictionConverter::new(&schema, &mapper);
        assert!(conv.convert_row(&[Cell::from("new")], None).is_err());
        assert_eq!(schema.attribute(0).num_values(), 2);
    }

    #[test]
    fn convert_rows_reports_row_of_failure() {
        let mut mapper = ValueMapper::new();
        let schema = SchemaTranslator::default().translate(&spec(), &mut mapper).unwrap();
        let conv = PredictionConverter::new(&schema, &mapper);
        let rows = vec![
            vec![Cell::Double(1.0), Cell::from("a")],
            vec![Cell::Double(2.0), Cell::from("nope")],
        ];

        let err = convert_rows(
            rows.iter().map(|r| r.as_slice()),
            schema.len(),
            Some(rows.len()),
            &NoProgress,
            &NeverCancel,
            |row| conv.convert_row(row, None),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Encoding { row: 1, .. }));
    }
}
