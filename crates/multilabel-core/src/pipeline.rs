//! Training and prediction over tables.
//!
//! [`Trainer`] turns a table into a [`TrainedModel`]: resolve targets,
//! translate the schema, check capabilities, convert rows and run the
//! supervised fit. A `TrainedModel` bundles everything needed to encode new
//! rows the same way; [`Predictor`] re-aligns a test table to the training
//! column order and scores it in parallel.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::capabilities::{check_columns, ColumnDiagnostic};
use crate::config::{CoreConfig, ModelConfig};
use crate::convert::{convert_rows, Dataset, PredictionConverter, TrainingConverter};
use crate::error::{CoreError, Result, SchemaError};
use crate::mapper::ValueMapper;
use crate::math::Array2;
use crate::models::{AlgorithmRegistry, MultiLabelClassifier};
use crate::progress::{CancellationSource, ProgressMonitor};
use crate::schema::{check_domain_subset, is_negative_label, resolve_targets, Schema, SchemaTranslator};
use crate::supervisor::{TrainingOutcome, TrainingSupervisor};
use crate::table::{Cell, Table, TableSpec};
use crate::threshold::{binarize, calibrate, evaluate, EvaluationSummary, PolicyKind, ThresholdPolicy};

const FORMAT_VERSION: u32 = 1;

/// Result of [`Trainer::train`].
#[derive(Debug)]
pub struct TrainingResult {
    pub outcome: TrainingOutcome<TrainedModel>,
    /// Capability Checker output, one entry per column.
    pub diagnostics: Vec<ColumnDiagnostic>,
    /// The converted training set; `None` if conversion was cancelled.
    pub dataset: Option<Arc<Dataset>>,
    pub elapsed: Duration,
}

pub struct Trainer {
    config: CoreConfig,
    registry: Arc<AlgorithmRegistry>,
}

impl Trainer {
    pub fn new(config: CoreConfig) -> Self {
        Self::with_registry(config, Arc::new(AlgorithmRegistry::with_defaults()))
    }

    pub fn with_registry(config: CoreConfig, registry: Arc<AlgorithmRegistry>) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Train on `table`. Schema and encoding problems are errors; everything
    /// that happens inside the algorithm, cancellation included, is reported
    /// through the outcome.
    pub fn train(
        &self,
        table: &Table,
        monitor: &dyn ProgressMonitor,
        cancel: &dyn CancellationSource,
    ) -> Result<TrainingResult> {
        let started = Instant::now();
        let model_config = self.config.model.clone();
        model_config
            .model_type
            .validate()
            .map_err(CoreError::InvalidInput)?;

        let spec = table.spec();
        let targets = resolve_targets(spec, &self.config.targets)?;
        let mut mapper = ValueMapper::new();
        let mut schema =
            SchemaTranslator::new(self.config.nominal_policy).translate(spec, &mut mapper)?;

        let algorithm = model_config.model_type.name();
        let classifier = self.registry.create(algorithm, model_config.clone())?;
        let diagnostics = check_columns(&schema, &targets, &classifier.capabilities());

        let features = {
            let mut converter = TrainingConverter::new(&mut schema, &mut mapper);
            convert_rows(
                table.rows(),
                spec.num_columns(),
                Some(table.len()),
                monitor,
                cancel,
                |row| converter.convert_row(row, None),
            )
        };
        let features = match features {
            Ok(features) => features,
            Err(CoreError::Cancelled) => {
                return Ok(TrainingResult {
                    outcome: TrainingOutcome::Cancelled,
                    diagnostics,
                    dataset: None,
                    elapsed: started.elapsed(),
                })
            }
            Err(e) => return Err(e),
        };
        log::info!(
            "Converted {} rows with {} attributes ({} labels)",
            features.nrows(),
            schema.len(),
            targets.len()
        );

        let schema = Arc::new(schema);
        let data = Arc::new(Dataset::new(Arc::clone(&schema), features, targets.clone())?);
        let report =
            TrainingSupervisor::new(self.config.supervisor).run(classifier, Arc::clone(&data), cancel);

        let training_spec = spec.clone();
        let outcome = report.outcome.map(|classifier| TrainedModel {
            training_spec,
            targets,
            schema,
            mapper: Arc::new(mapper),
            model_config,
            classifier,
            threshold: None,
        });
        Ok(TrainingResult {
            outcome,
            diagnostics,
            dataset: Some(data),
            elapsed: started.elapsed(),
        })
    }
}

#[derive(Serialize)]
struct PersistedModelRef<'a> {
    version: u32,
    algorithm: &'a str,
    model: &'a ModelConfig,
    training_spec: &'a TableSpec,
    targets: &'a [usize],
    schema: &'a Schema,
    mapper: &'a ValueMapper,
    threshold: Option<&'a ThresholdPolicy>,
    state: serde_json::Value,
}

#[derive(Deserialize)]
struct PersistedModel {
    version: u32,
    algorithm: String,
    model: ModelConfig,
    training_spec: TableSpec,
    targets: Vec<usize>,
    schema: Schema,
    mapper: ValueMapper,
    #[serde(default)]
    threshold: Option<ThresholdPolicy>,
    state: serde_json::Value,
}

/// A fitted classifier together with the schema, value mapper and training
/// spec it was fitted against.
pub struct TrainedModel {
    training_spec: TableSpec,
    targets: Vec<usize>,
    schema: Arc<Schema>,
    mapper: Arc<ValueMapper>,
    model_config: ModelConfig,
    classifier: Box<dyn MultiLabelClassifier>,
    threshold: Option<ThresholdPolicy>,
}

impl TrainedModel {
    pub fn training_spec(&self) -> &TableSpec {
        &self.training_spec
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn mapper(&self) -> &ValueMapper {
        &self.mapper
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.model_config
    }

    pub fn classifier(&self) -> &dyn MultiLabelClassifier {
        self.classifier.as_ref()
    }

    /// Attribute indices of the label columns.
    pub fn targets(&self) -> &[usize] {
        &self.targets
    }

    pub fn target_names(&self) -> Vec<&str> {
        self.targets
            .iter()
            .map(|&t| self.schema.attribute(t).name.as_str())
            .collect()
    }

    pub fn summary(&self) -> Option<String> {
        self.classifier.summary()
    }

    /// Threshold policy stored with the model, if one was calibrated.
    pub fn threshold_policy(&self) -> Option<&ThresholdPolicy> {
        self.threshold.as_ref()
    }

    pub fn set_threshold_policy(&mut self, policy: ThresholdPolicy) {
        self.threshold = Some(policy);
    }

    /// Original cell of value `index` of the `label`-th target.
    pub fn decode_label(&self, label: usize, index: usize) -> Option<&Cell> {
        let attr = self.schema.attribute(*self.targets.get(label)?);
        self.mapper.decode(attr.value(index)?)
    }

    /// Original cell naming the predicted state of a nominal label: its first
    /// value whose positivity equals `positive`.
    pub fn decode_decision(&self, label: usize, positive: bool) -> Option<&Cell> {
        let attr = self.schema.attribute(*self.targets.get(label)?);
        let index = attr
            .values()
            .iter()
            .position(|token| is_negative_label(token) != positive)?;
        self.decode_label(label, index)
    }

    pub fn predictor(&self) -> Predictor<'_> {
        Predictor { model: self }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let persisted = PersistedModelRef {
            version: FORMAT_VERSION,
            algorithm: self.classifier.name(),
            model: &self.model_config,
            training_spec: &self.training_spec,
            targets: &self.targets,
            schema: &self.schema,
            mapper: &self.mapper,
            threshold: self.threshold.as_ref(),
            state: self.classifier.save_state()?,
        };
        Ok(serde_json::to_vec(&persisted)?)
    }

    /// Restore a model written by [`TrainedModel::to_bytes`]. The algorithm is
    /// looked up by name in `registry`.
    pub fn from_bytes(bytes: &[u8], registry: &AlgorithmRegistry) -> Result<Self> {
        let persisted: PersistedModel = serde_json::from_slice(bytes)?;
        if persisted.version != FORMAT_VERSION {
            return Err(CoreError::InvalidInput(format!(
                "unsupported model format version {}",
                persisted.version
            )));
        }
        if persisted.schema.len() != persisted.training_spec.num_columns()
            || persisted.targets.iter().any(|&t| t >= persisted.schema.len())
        {
            return Err(CoreError::InvalidInput(
                "persisted schema does not match its training spec".to_string(),
            ));
        }
        let mut classifier = registry.create(&persisted.algorithm, persisted.model.clone())?;
        classifier.load_state(persisted.state)?;
        log::debug!("Restored '{}' model", persisted.algorithm);

        Ok(Self {
            training_spec: persisted.training_spec,
            targets: persisted.targets,
            schema: Arc::new(persisted.schema),
            mapper: Arc::new(persisted.mapper),
            model_config: persisted.model,
            classifier,
            threshold: persisted.threshold,
        })
    }

    /// Calibrate a threshold policy on `table`, which must carry the targets.
    pub fn calibrate(&self, table: &Table, kind: PolicyKind) -> Result<crate::threshold::Calibration> {
        let predictions = self.predictor().predict_table(
            table,
            &crate::progress::NoProgress,
            &crate::progress::NeverCancel,
        )?;
        let truth = predictions.truth.as_ref().ok_or_else(|| {
            CoreError::InvalidInput("calibration table does not contain the target columns".to_string())
        })?;
        calibrate(&predictions.scores, truth, kind)
    }

    /// Calibrate on `calibration`, then binarise and, if possible, evaluate
    /// the scores of `test`.
    pub fn rank(&self, calibration: &Table, test: &Table, kind: PolicyKind) -> Result<Ranking> {
        let policy = self.calibrate(calibration, kind)?.policy;
        let predictions = self.predictor().predict_table(
            test,
            &crate::progress::NoProgress,
            &crate::progress::NeverCancel,
        )?;
        let decisions = predictions.binarize(&policy);
        let evaluation = match &predictions.truth {
            Some(truth) => Some(evaluate(truth, &decisions)?),
            None => None,
        };
        Ok(Ranking {
            policy,
            scores: predictions.scores,
            decisions,
            evaluation,
        })
    }
}

/// Output of [`TrainedModel::rank`].
#[derive(Debug, Clone)]
pub struct Ranking {
    pub policy: ThresholdPolicy,
    pub scores: Array2<f64>,
    pub decisions: Array2<u8>,
    pub evaluation: Option<EvaluationSummary>,
}

/// How a test table maps onto the training columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    /// `order[i]` is the test column feeding attribute `i`, or -1.
    pub order: Vec<isize>,
    /// All target columns are present, so ground truth is available.
    pub evaluate: bool,
}

/// Scores and, when the targets were present, ground truth of a test table.
#[derive(Debug, Clone)]
pub struct PredictionTable {
    pub label_names: Vec<String>,
    pub scores: Array2<f64>,
    pub truth: Option<Array2<u8>>,
}

impl PredictionTable {
    pub fn binarize(&self, policy: &ThresholdPolicy) -> Array2<u8> {
        binarize(&self.scores, policy)
    }

    pub fn evaluate(&self, policy: &ThresholdPolicy) -> Option<Result<EvaluationSummary>> {
        self.truth
            .as_ref()
            .map(|truth| evaluate(truth, &self.binarize(policy)))
    }
}

pub struct Predictor<'m> {
    model: &'m TrainedModel,
}

impl<'m> Predictor<'m> {
    /// Check domains and map the training columns onto `test`. Every input
    /// column must be present; target columns are optional.
    pub fn align(&self, test: &TableSpec) -> Result<Alignment> {
        let training = &self.model.training_spec;
        check_domain_subset(test, training)?;

        let evaluate = self
            .model
            .targets
            .iter()
            .all(|&t| test.find_column(&training.column(t).name).is_some());
        if !evaluate {
            log::info!("Test table lacks target columns; predictions will not be evaluated");
        }

        let mut order = Vec::with_capacity(training.num_columns());
        for (i, col) in training.columns().iter().enumerate() {
            let is_target = self.model.targets.contains(&i);
            match test.find_column(&col.name) {
                Some(pos) if evaluate || !is_target => order.push(pos as isize),
                None if is_target => order.push(-1),
                Some(_) => order.push(-1),
                None => return Err(SchemaError::MissingColumn(col.name.clone()).into()),
            }
        }
        Ok(Alignment { order, evaluate })
    }

    /// Score one row given in training column order.
    pub fn predict_row(&self, row: &[Cell]) -> Result<Vec<f64>> {
        let converter = PredictionConverter::new(&self.model.schema, &self.model.mapper);
        let instance = converter
            .convert_row(row, None)
            .map_err(|e| CoreError::encoding(0, e))?;
        self.model.classifier.predict_proba(&instance)
    }

    /// Score every row of `table` in parallel.
    pub fn predict_table(
        &self,
        table: &Table,
        monitor: &dyn ProgressMonitor,
        cancel: &dyn CancellationSource,
    ) -> Result<PredictionTable> {
        let alignment = self.align(table.spec())?;
        let converter = PredictionConverter::new(&self.model.schema, &self.model.mapper);
        let schema = &self.model.schema;
        let targets = &self.model.targets;
        let classifier = &self.model.classifier;
        let total = table.len();
        let done = AtomicUsize::new(0);

        let rows: Vec<&[Cell]> = table.rows().collect();
        let results: Vec<(Vec<f64>, Vec<u8>)> = rows
            .into_par_iter()
            .enumerate()
            .map(|(idx, row)| {
                if cancel.is_cancel_requested() {
                    return Err(CoreError::Cancelled);
                }
                let instance = converter
                    .convert_row(row, Some(&alignment.order))
                    .map_err(|e| CoreError::encoding(idx, e))?;
                let scores = classifier.predict_proba(&instance)?;
                let truth: Vec<u8> = targets
                    .iter()
                    .map(|&t| u8::from(schema.attribute(t).label_positive(instance[t]).unwrap_or(false)))
                    .collect();

                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                monitor.set_progress(n as f64 / total as f64, &format!("Predicting: {} of {}", n, total));
                Ok((scores, truth))
            })
            .collect::<Result<_>>()?;

        let labels = targets.len();
        let mut scores = Array2::empty(labels);
        let mut truth = Array2::empty(labels);
        for (s, t) in results {
            if s.len() != labels {
                return Err(CoreError::InvalidInput(format!(
                    "classifier returned {} scores for {} labels",
                    s.len(),
                    labels
                )));
            }
            scores.push_row(s)?;
            truth.push_row(t)?;
        }

        Ok(PredictionTable {
            label_names: self.model.target_names().into_iter().map(String::from).collect(),
            scores,
            truth: alignment.evaluate.then_some(truth),
        })
    }
}
