//! What an algorithm accepts, and the per-column Capability Checker.
//!
//! The checker runs before training and only produces diagnostics. The same
//! tests run again inside `fit` through [`Capabilities::test_dataset`], where
//! a failure becomes a classified `FitError`.
use serde::{Deserialize, Serialize};

use crate::convert::{is_missing, Dataset};
use crate::error::FitError;
use crate::schema::{Attribute, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub numeric_attributes: bool,
    pub nominal_attributes: bool,
    pub missing_values: bool,
    pub numeric_class: bool,
    pub binary_class: bool,
    /// Nominal labels with more than two values.
    pub multi_valued_class: bool,
    pub missing_class_values: bool,
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            numeric_attributes: true,
            nominal_attributes: true,
            missing_values: true,
            numeric_class: true,
            binary_class: true,
            multi_valued_class: true,
            missing_class_values: true,
        }
    }

    /// Test one attribute, as input or as label. `Err` carries the reason.
    pub fn test_attribute(&self, attr: &Attribute, is_class: bool) -> Result<(), String> {
        if is_class {
            if attr.is_numeric() && !self.numeric_class {
                return Err(format!("Cannot handle numeric class '{}'", attr.name));
            }
            if attr.is_nominal() {
                if attr.num_values() > 2 && !self.multi_valued_class {
                    return Err(format!(
                        "Cannot handle multi-valued nominal class '{}' ({} values)",
                        attr.name,
                        attr.num_values()
                    ));
                }
                if attr.num_values() <= 2 && !self.binary_class {
                    return Err(format!("Cannot handle binary class '{}'", attr.name));
                }
            }
            return Ok(());
        }

        if attr.is_numeric() && !self.numeric_attributes {
            return Err(format!("Cannot handle numeric attribute '{}'", attr.name));
        }
        if attr.is_nominal() && !self.nominal_attributes {
            return Err(format!("Cannot handle nominal attribute '{}'", attr.name));
        }
        Ok(())
    }

    /// Full test of a converted training set, as run at the start of `fit`.
    pub fn test_dataset(&self, data: &Dataset) -> Result<(), FitError> {
        let schema = data.schema();
        for &t in data.targets() {
            self.test_attribute(schema.attribute(t), true)
                .map_err(FitError::UnsupportedClassType)?;
        }
        for i in data.input_indices() {
            self.test_attribute(schema.attribute(i), false)
                .map_err(FitError::UnsupportedAttributeType)?;
        }

        if !self.missing_values {
            let features = data.features();
            for i in data.input_indices() {
                if features.rows().any(|row| is_missing(row[i])) {
                    return Err(FitError::UnsupportedAttributeType(format!(
                        "Cannot handle missing values in attribute '{}'",
                        schema.attribute(i).name
                    )));
                }
            }
        }
        if !self.missing_class_values
            && data.labels().as_slice().iter().any(|label| label.is_none())
        {
            return Err(FitError::Other(anyhow::anyhow!(
                "Cannot handle missing class values"
            )));
        }
        Ok(())
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::all()
    }
}

/// Result of testing one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDiagnostic {
    pub column: String,
    pub is_target: bool,
    /// `None` if the algorithm accepts the column.
    pub problem: Option<String>,
}

impl ColumnDiagnostic {
    pub fn is_ok(&self) -> bool {
        self.problem.is_none()
    }
}

/// Test every attribute of `schema` against `capabilities`, one diagnostic per
/// column, index-aligned with the schema.
pub fn check_columns(
    schema: &Schema,
    targets: &[usize],
    capabilities: &Capabilities,
) -> Vec<ColumnDiagnostic> {
    schema
        .attributes()
        .iter()
        .enumerate()
        .map(|(i, attr)| {
            let is_target = targets.contains(&i);
            let problem = capabilities.test_attribute(attr, is_target).err();
            if let Some(reason) = &problem {
                log::warn!("Column '{}' is not supported: {}", attr.name, reason);
            }
            ColumnDiagnostic {
                column: attr.name.clone(),
                is_target,
                problem,
            }
        })
        .collect()
}

pub fn all_compatible(diagnostics: &[ColumnDiagnostic]) -> bool {
    diagnostics.iter().all(ColumnDiagnostic::is_ok)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            Attribute::numeric("x"),
            Attribute::nominal("colour", vec!["a".into(), "b".into(), "c".into()]),
            Attribute::nominal("l1", vec!["0".into(), "1".into()]),
            Attribute::nominal("l2", vec!["a".into(), "b".into(), "c".into()]),
        ])
    }

    #[test]
    fn one_diagnostic_per_column() {
        let caps = Capabilities {
            nominal_attributes: false,
            multi_valued_class: false,
            ..Capabilities::all()
        };
        let diags = check_columns(&schema(), &[2, 3], &caps);
        assert_eq!(diags.len(), 4);
        assert!(diags[0].is_ok());
        assert!(diags[1].problem.as_deref().unwrap().contains("nominal attribute"));
        assert!(diags[2].is_ok());
        assert!(diags[3].is_target);
        assert!(diags[3].problem.as_deref().unwrap().contains("multi-valued"));
        assert!(!all_compatible(&diags));
    }

    #[test]
    fn everything_passes_with_all() {
        let diags = check_columns(&schema(), &[2], &Capabilities::all());
        assert!(all_compatible(&diags));
    }
}
