//! Attribute schema and the Schema Translator.
//!
//! A `Schema` is index-aligned with the table spec it was built from: column
//! `i` becomes attribute `i`. Integer and double columns become numeric
//! attributes; string columns become nominal attributes whose value list is
//! the column's domain, deduplicated, sorted by the natural cell order and
//! mapped to tokens. Once built, a schema is shared read-only.
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::mapper::ValueMapper;
use crate::table::{Cell, ColumnType, TableSpec};

/// Nominal label values that count as "label absent".
const NEGATIVE_LABEL_VALUES: [&str; 3] = ["0", "false", "no"];

pub(crate) fn is_negative_label(value: &str) -> bool {
    NEGATIVE_LABEL_VALUES
        .iter()
        .any(|neg| neg.eq_ignore_ascii_case(value))
}

/// How string columns without a known domain are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NominalPolicy {
    /// A string column must carry its domain; otherwise translation fails.
    #[default]
    Closed,
    /// The attribute starts empty and grows during training-time conversion.
    Open,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeKind {
    Numeric,
    Nominal { values: Vec<String>, open: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub kind: AttributeKind,
}

impl Attribute {
    pub fn numeric(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: AttributeKind::Numeric,
        }
    }

    pub fn nominal(name: &str, values: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            kind: AttributeKind::Nominal {
                values,
                open: false,
            },
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, AttributeKind::Numeric)
    }

    pub fn is_nominal(&self) -> bool {
        !self.is_numeric()
    }

    pub fn is_open(&self) -> bool {
        matches!(self.kind, AttributeKind::Nominal { open: true, .. })
    }

    /// Nominal value tokens, empty for numeric attributes.
    pub fn values(&self) -> &[String] {
        match &self.kind {
            AttributeKind::Numeric => &[],
            AttributeKind::Nominal { values, .. } => values,
        }
    }

    pub fn num_values(&self) -> usize {
        self.values().len()
    }

    pub fn index_of(&self, token: &str) -> Option<usize> {
        self.values().iter().position(|v| v == token)
    }

    pub fn value(&self, index: usize) -> Option<&str> {
        self.values().get(index).map(String::as_str)
    }

    /// Interpret an encoded slot of this attribute as a binary label.
    /// `None` for the missing sentinel or an index outside the value list.
    pub fn label_positive(&self, encoded: f64) -> Option<bool> {
        if encoded.is_nan() {
            return None;
        }
        match &self.kind {
            AttributeKind::Numeric => Some(encoded > 0.0),
            AttributeKind::Nominal { values, .. } => {
                if encoded < 0.0 {
                    return None;
                }
                values
                    .get(encoded as usize)
                    .map(|token| !is_negative_label(token))
            }
        }
    }

    fn push_value(&mut self, token: &str) -> Option<usize> {
        match &mut self.kind {
            AttributeKind::Nominal { values, open: true } => {
                values.push(token.to_string());
                Some(values.len() - 1)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    attributes: Vec<Attribute>,
}

impl Schema {
    pub fn new(attributes: Vec<Attribute>) -> Self {
        Self { attributes }
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, idx: usize) -> &Attribute {
        &self.attributes[idx]
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    /// Append a token to an open nominal attribute. Only training-time
    /// conversion calls this.
    pub(crate) fn grow_nominal(&mut self, idx: usize, token: &str) -> Option<usize> {
        self.attributes.get_mut(idx)?.push_value(token)
    }
}

/// Builds attribute schemas from table specs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaTranslator {
    policy: NominalPolicy,
}

impl SchemaTranslator {
    pub fn new(policy: NominalPolicy) -> Self {
        Self { policy }
    }

    /// Reject any column whose type is not integer, double or string.
    pub fn validate_column_types(spec: &TableSpec) -> Result<(), SchemaError> {
        for col in spec.columns() {
            if let ColumnType::Other(type_name) = &col.column_type {
                return Err(SchemaError::UnsupportedColumnType {
                    column: col.name.clone(),
                    type_name: type_name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Reject NaN and infinite doubles in any column domain. Domains are
    /// persisted with the trained model and must survive serialization.
    pub fn validate_domains(spec: &TableSpec) -> Result<(), SchemaError> {
        for col in spec.columns() {
            let non_finite = col
                .domain
                .iter()
                .flatten()
                .find(|c| matches!(c, Cell::Double(v) if !v.is_finite()));
            if let Some(cell) = non_finite {
                return Err(SchemaError::NonFiniteDomainValue {
                    column: col.name.clone(),
                    value: cell.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn translate(
        &self,
        spec: &TableSpec,
        mapper: &mut ValueMapper,
    ) -> Result<Schema, SchemaError> {
        if spec.num_columns() == 0 {
            return Err(SchemaError::NoColumns);
        }
        Self::validate_column_types(spec)?;
        Self::validate_domains(spec)?;

        let mut attributes = Vec::with_capacity(spec.num_columns());
        for col in spec.columns() {
            let attribute = match &col.column_type {
                ColumnType::Integer | ColumnType::Double => Attribute::numeric(&col.name),
                ColumnType::String => match col.domain.as_ref().filter(|d| !d.is_empty()) {
                    Some(domain) => {
                        let mut values: Vec<&Cell> =
                            domain.iter().filter(|c| !c.is_missing()).collect();
                        values.sort_by(|a, b| a.total_cmp(b));
                        values.dedup();
                        let tokens = values
                            .into_iter()
                            .map(|v| mapper.encode(v).to_string())
                            .collect();
                        Attribute::nominal(&col.name, tokens)
                    }
                    None => match self.policy {
                        NominalPolicy::Closed => {
                            return Err(SchemaError::MissingDomain(col.name.clone()))
                        }
                        NominalPolicy::Open => Attribute {
                            name: col.name.clone(),
                            kind: AttributeKind::Nominal {
                                values: Vec::new(),
                                open: true,
                            },
                        },
                    },
                },
                ColumnType::Other(_) => unreachable!("column types validated above"),
            };
            attributes.push(attribute);
        }

        log::debug!(
            "Translated {} columns into {} numeric and {} nominal attributes",
            spec.num_columns(),
            attributes.iter().filter(|a| a.is_numeric()).count(),
            attributes.iter().filter(|a| a.is_nominal()).count()
        );
        Ok(Schema::new(attributes))
    }
}

/// Resolve target column names to column indices.
///
/// An empty target list falls back to the last column. Every named target
/// must exist exactly once.
pub fn resolve_targets(spec: &TableSpec, targets: &[String]) -> Result<Vec<usize>, SchemaError> {
    if spec.num_columns() == 0 {
        return Err(SchemaError::NoColumns);
    }
    if targets.is_empty() {
        let last = spec.num_columns() - 1;
        log::warn!(
            "No target columns specified. Target column was set to '{}'",
            spec.column(last).name
        );
        return Ok(vec![last]);
    }

    let mut indices = Vec::with_capacity(targets.len());
    for name in targets {
        let idx = spec
            .find_column(name)
            .ok_or_else(|| SchemaError::MissingTarget(name.clone()))?;
        if indices.contains(&idx) {
            return Err(SchemaError::DuplicateTarget(name.clone()));
        }
        indices.push(idx);
    }
    Ok(indices)
}

/// Check that, for every column the test spec shares with the training spec,
/// the test domain is contained in the training domain.
pub fn check_domain_subset(test: &TableSpec, training: &TableSpec) -> Result<(), SchemaError> {
    for test_col in test.columns() {
        let Some(idx) = training.find_column(&test_col.name) else {
            continue;
        };
        let Some(test_values) = test_col.domain.as_ref().filter(|d| !d.is_empty()) else {
            continue;
        };
        let training_col = training.column(idx);
        let Some(training_values) = training_col.domain.as_ref().filter(|d| !d.is_empty()) else {
            return Err(SchemaError::TrainingDomainMissing(training_col.name.clone()));
        };
        if !test_values.iter().all(|v| training_values.contains(v)) {
            return Err(SchemaError::DomainNotSubset(training_col.name.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnSpec;

    fn spec() -> TableSpec {
        TableSpec::new(vec![
            ColumnSpec::double("x"),
            ColumnSpec::string("colour").with_domain(["red", "blue", "green", "blue"]),
            ColumnSpec::integer("label"),
        ])
    }

    #[test]
    fn nominal_values_are_sorted_and_deduplicated() {
        let mut mapper = ValueMapper::new();
        let schema = SchemaTranslator::default().translate(&spec(), &mut mapper).unwrap();
        assert!(schema.attribute(0).is_numeric());
        assert_eq!(schema.attribute(1).values(), &["blue", "green", "red"]);
        assert!(schema.attribute(2).is_numeric());
    }

    #[test]
    fn closed_policy_requires_domain() {
        let spec = TableSpec::new(vec![ColumnSpec::string("s")]);
        let err = SchemaTranslator::new(NominalPolicy::Closed)
            .translate(&spec, &mut ValueMapper::new())
            .unwrap_err();
        assert_eq!(err, SchemaError::MissingDomain("s".into()));

        let schema = SchemaTranslator::new(NominalPolicy::Open)
            .translate(&spec, &mut ValueMapper::new())
            .unwrap();
        assert!(schema.attribute(0).is_open());
        assert_eq!(schema.attribute(0).num_values(), 0);
    }

    #[test]
    fn unsupported_type_is_rejected() {
        let spec = TableSpec::new(vec![
            ColumnSpec::double("x"),
            ColumnSpec::new("when", ColumnType::Other("date".into())),
        ]);
        let err = SchemaTranslator::default()
            .translate(&spec, &mut ValueMapper::new())
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedColumnType { ref column, .. } if column == "when"));
    }

    #[test]
    fn non_finite_domain_values_are_rejected() {
        let spec = TableSpec::new(vec![
            ColumnSpec::string("s").with_domain(["a"]),
            ColumnSpec::double("x").with_domain([Cell::Double(0.5), Cell::Double(f64::NAN)]),
        ]);
        let mut mapper = ValueMapper::new();
        let err = SchemaTranslator::default().translate(&spec, &mut mapper).unwrap_err();
        assert!(matches!(err, SchemaError::NonFiniteDomainValue { ref column, .. } if column == "x"));
        assert!(mapper.is_empty());

        let spec = TableSpec::new(vec![
            ColumnSpec::string("s").with_domain([Cell::from("a"), Cell::Double(f64::INFINITY)]),
        ]);
        assert!(SchemaTranslator::default().translate(&spec, &mut mapper).is_err());
    }

    #[test]
    fn label_positivity() {
        let numeric = Attribute::numeric("n");
        assert_eq!(numeric.label_positive(1.0), Some(true));
        assert_eq!(numeric.label_positive(-1.0), Some(false));
        assert_eq!(numeric.label_positive(f64::NAN), None);

        let nominal = Attribute::nominal("l", vec!["0".into(), "1".into()]);
        assert_eq!(nominal.label_positive(0.0), Some(false));
        assert_eq!(nominal.label_positive(1.0), Some(true));
        assert_eq!(nominal.label_positive(5.0), None);
    }

    #[test]
    fn resolve_targets_defaults_to_last_column() {
        assert_eq!(resolve_targets(&spec(), &[]).unwrap(), vec![2]);
        assert_eq!(
            resolve_targets(&spec(), &["label".into(), "x".into()]).unwrap(),
            vec![2, 0]
        );
        assert_eq!(
            resolve_targets(&spec(), &["label".into(), "nope".into()]).unwrap_err(),
            SchemaError::MissingTarget("nope".into())
        );
        assert_eq!(
            resolve_targets(&spec(), &["x".into(), "x".into()]).unwrap_err(),
            SchemaError::DuplicateTarget("x".into())
        );
    }

    #[test]
    fn test_domain_must_be_subset() {
        let training = spec();
        let ok = TableSpec::new(vec![ColumnSpec::string("colour").with_domain(["red"])]);
        assert!(check_domain_subset(&ok, &training).is_ok());

        let bigger = TableSpec::new(vec![ColumnSpec::string("colour").with_domain(["red", "pink"])]);
        assert_eq!(
            check_domain_subset(&bigger, &training).unwrap_err(),
            SchemaError::DomainNotSubset("colour".into())
        );

        let no_training_domain =
            TableSpec::new(vec![ColumnSpec::string("x").with_domain(["a"])]);
        assert_eq!(
            check_domain_subset(&no_training_domain, &training).unwrap_err(),
            SchemaError::TrainingDomainMissing("x".into())
        );
    }
}
