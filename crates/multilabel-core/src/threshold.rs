//! Threshold calibration and binarisation of label scores.
//!
//! `PCut1` picks one global threshold so that the predicted label cardinality
//! comes as close as possible to the ground truth cardinality. `PCutL` does the
//! same per label against each label's positive rate. Both sweep the distinct
//! observed scores from high to low; on a tie the higher threshold wins.
//!
//! Scores are probabilities in `[0, 1]`, so the ceiling threshold `1.0`
//! predicts nothing. Degenerate calibrations fall back to it.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::math::Array2;

const TIE_EPSILON: f64 = 1e-12;

/// The never-positive threshold.
pub const CEILING: f64 = 1.0;

/// Largest threshold below the ceiling; selects scores of exactly 1.0.
const BELOW_CEILING: f64 = 1.0 - f64::EPSILON / 2.0;

/// Whether `score` predicts the label present under threshold `t`.
#[inline]
pub fn is_positive(score: f64, t: f64) -> bool {
    t < CEILING && score >= t
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PolicyKind {
    #[default]
    PCut1,
    PCutL,
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pcut1" => Ok(PolicyKind::PCut1),
            "pcutl" => Ok(PolicyKind::PCutL),
            _ => Err(format!(
                "Unknown threshold policy: {}. Expected 'PCut1' or 'PCutL'",
                s
            )),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::PCut1 => f.write_str("PCut1"),
            PolicyKind::PCutL => f.write_str("PCutL"),
        }
    }
}

/// A score `>= threshold` predicts the label present, except at [`CEILING`]
/// which never does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ThresholdPolicy {
    Global(f64),
    PerLabel(Vec<f64>),
}

impl ThresholdPolicy {
    /// Threshold of label `label`. A per-label policy shorter than the label
    /// count falls back to 0.5.
    pub fn threshold_for(&self, label: usize) -> f64 {
        match self {
            ThresholdPolicy::Global(t) => *t,
            ThresholdPolicy::PerLabel(ts) => ts.get(label).copied().unwrap_or(0.5),
        }
    }

    pub fn to_vec(&self, num_labels: usize) -> Vec<f64> {
        (0..num_labels).map(|j| self.threshold_for(j)).collect()
    }
}

impl fmt::Display for ThresholdPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdPolicy::Global(t) => write!(f, "{}", t),
            ThresholdPolicy::PerLabel(ts) => {
                let parts: Vec<String> = ts.iter().map(|t| t.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Parses "0.5" or "[0.3, 0.7]".
impl FromStr for ThresholdPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let parse = |v: &str| {
            let v = v.trim();
            v.parse::<f64>()
                .ok()
                .filter(|t| t.is_finite())
                .ok_or_else(|| format!("Invalid threshold value: '{}'", v))
        };
        match s.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            Some(inner) if inner.trim().is_empty() => Ok(ThresholdPolicy::PerLabel(Vec::new())),
            Some(inner) => inner
                .split(',')
                .map(parse)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(ThresholdPolicy::PerLabel),
            None => parse(s).map(ThresholdPolicy::Global),
        }
    }
}

/// Why a calibration fell back to the 1.0 threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Degeneracy {
    EmptyMatrix,
    NoPositiveLabels,
    LabelWithoutPositives(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    pub policy: ThresholdPolicy,
    /// Binarised calibration scores under `policy`.
    pub predictions: Array2<u8>,
    pub degenerate: Vec<Degeneracy>,
}

/// Average number of positive labels per row.
pub fn label_cardinality(y: &Array2<u8>) -> f64 {
    if y.nrows() == 0 {
        return 0.0;
    }
    y.as_slice().iter().filter(|&&v| v != 0).count() as f64 / y.nrows() as f64
}

/// Score cut whose "fraction of `rows` predicted positive" is closest to
/// `target`. Candidates are the ceiling (no positives) followed by the
/// distinct scores from high to low. Scores at or above 1.0 form one group
/// cut just below the ceiling.
fn sweep(mut scores: Vec<f64>, rows: usize, target: f64) -> f64 {
    scores.retain(|v| !v.is_nan());
    scores.sort_by(|a, b| b.total_cmp(a));

    let rate = |count: usize| count as f64 / rows as f64;
    let mut best = (CEILING, target.abs());

    let at_or_above_one = scores.iter().take_while(|&&v| v >= CEILING).count();
    if at_or_above_one > 0 {
        let gap = (rate(at_or_above_one) - target).abs();
        if gap < best.1 - TIE_EPSILON {
            best = (BELOW_CEILING, gap);
        }
    }

    let mut i = 0;
    while i < scores.len() {
        let v = scores[i];
        let mut end = i;
        while end < scores.len() && scores[end] == v {
            end += 1;
        }
        if v < CEILING {
            let gap = (rate(end) - target).abs();
            if gap < best.1 - TIE_EPSILON {
                best = (v, gap);
            }
        }
        i = end;
    }
    best.0
}

fn check_shapes(scores: &Array2<f64>, truth: &Array2<u8>) -> Result<()> {
    if scores.shape() != truth.shape() {
        return Err(CoreError::InvalidInput(format!(
            "score matrix {:?} and ground truth {:?} differ in shape",
            scores.shape(),
            truth.shape()
        )));
    }
    Ok(())
}

/// Calibrate thresholds on `scores` against `truth` and binarise the scores.
pub fn calibrate(scores: &Array2<f64>, truth: &Array2<u8>, kind: PolicyKind) -> Result<Calibration> {
    check_shapes(scores, truth)?;
    let (rows, labels) = scores.shape();
    let mut degenerate = Vec::new();

    let policy = if rows == 0 || labels == 0 {
        degenerate.push(Degeneracy::EmptyMatrix);
        match kind {
            PolicyKind::PCut1 => ThresholdPolicy::Global(1.0),
            PolicyKind::PCutL => ThresholdPolicy::PerLabel(vec![1.0; labels]),
        }
    } else {
        match kind {
            PolicyKind::PCut1 => {
                let cardinality = label_cardinality(truth);
                if cardinality == 0.0 {
                    degenerate.push(Degeneracy::NoPositiveLabels);
                    ThresholdPolicy::Global(1.0)
                } else {
                    let t = sweep(scores.as_slice().to_vec(), rows, cardinality);
                    ThresholdPolicy::Global(t)
                }
            }
            PolicyKind::PCutL => {
                let thresholds = (0..labels)
                    .map(|j| {
                        let positives = truth.column(j).iter().filter(|&&v| v != 0).count();
                        if positives == 0 {
                            degenerate.push(Degeneracy::LabelWithoutPositives(j));
                            1.0
                        } else {
                            sweep(scores.column(j), rows, positives as f64 / rows as f64)
                        }
                    })
                    .collect();
                ThresholdPolicy::PerLabel(thresholds)
            }
        }
    };

    for d in &degenerate {
        log::warn!("Threshold calibration is degenerate ({:?}); using 1.0", d);
    }
    log::debug!("Calibrated {} thresholds: {}", kind, policy);

    Ok(Calibration {
        predictions: binarize(scores, &policy),
        policy,
        degenerate,
    })
}

/// Apply `policy` to a score matrix.
pub fn binarize(scores: &Array2<f64>, policy: &ThresholdPolicy) -> Array2<u8> {
    let thresholds = policy.to_vec(scores.ncols());
    let data = scores
        .rows()
        .flat_map(|row| {
            row.iter()
                .zip(&thresholds)
                .map(|(&s, &t)| u8::from(is_positive(s, t)))
                .collect::<Vec<_>>()
        })
        .collect();
    Array2::from_shape_vec(scores.shape(), data).unwrap_or_else(|_| Array2::empty(scores.ncols()))
}

/// Multi-label evaluation of binary predictions against ground truth.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub rows: usize,
    /// Fraction of label cells predicted correctly.
    pub hamming_score: f64,
    /// Fraction of rows whose whole labelset is predicted correctly.
    pub exact_match: f64,
    /// Mean per-row |Y ∩ Ŷ| / |Y ∪ Ŷ|; a row with both sets empty scores 1.
    pub jaccard_index: f64,
    pub true_cardinality: f64,
    pub predicted_cardinality: f64,
    pub positives_per_label: Vec<usize>,
}

pub fn evaluate(truth: &Array2<u8>, predictions: &Array2<u8>) -> Result<EvaluationSummary> {
    if truth.shape() != predictions.shape() {
        return Err(CoreError::InvalidInput(format!(
            "ground truth {:?} and predictions {:?} differ in shape",
            truth.shape(),
            predictions.shape()
        )));
    }
    let (rows, labels) = truth.shape();
    let positives_per_label = (0..labels)
        .map(|j| predictions.column(j).iter().filter(|&&v| v != 0).count())
        .collect();
    if rows == 0 {
        return Ok(EvaluationSummary {
            rows,
            hamming_score: 0.0,
            exact_match: 0.0,
            jaccard_index: 0.0,
            true_cardinality: 0.0,
            predicted_cardinality: 0.0,
            positives_per_label,
        });
    }

    let (mut correct_cells, mut exact, mut jaccard) = (0usize, 0usize, 0.0);
    for (y, p) in truth.rows().zip(predictions.rows()) {
        let (mut inter, mut union, mut same) = (0usize, 0usize, 0usize);
        for (&a, &b) in y.iter().zip(p) {
            let (a, b) = (a != 0, b != 0);
            same += usize::from(a == b);
            inter += usize::from(a && b);
            union += usize::from(a || b);
        }
        correct_cells += same;
        exact += usize::from(same == labels);
        jaccard += if union == 0 { 1.0 } else { inter as f64 / union as f64 };
    }

    let cells = (rows * labels).max(1) as f64;
    Ok(EvaluationSummary {
        rows,
        hamming_score: correct_cells as f64 / cells,
        exact_match: exact as f64 / rows as f64,
        jaccard_index: jaccard / rows as f64,
        true_cardinality: label_cardinality(truth),
        predicted_cardinality: label_cardinality(predictions),
        positives_per_label,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores() -> Array2<f64> {
        Array2::from_shape_vec((3, 2), vec![0.9, 0.1, 0.2, 0.8, 0.4, 0.4]).unwrap()
    }

    fn truth() -> Array2<u8> {
        Array2::from_shape_vec((3, 2), vec![1, 0, 0, 1, 1, 1]).unwrap()
    }

    #[test]
    fn pcutl_reproduces_truth() {
        let cal = calibrate(&scores(), &truth(), PolicyKind::PCutL).unwrap();
        assert_eq!(cal.policy, ThresholdPolicy::PerLabel(vec![0.4, 0.4]));
        assert_eq!(cal.predictions, truth());
        assert!(cal.degenerate.is_empty());
    }

    #[test]
    fn pcut1_matches_cardinality() {
        let cal = calibrate(&scores(), &truth(), PolicyKind::PCut1).unwrap();
        assert_eq!(cal.policy, ThresholdPolicy::Global(0.4));
        assert!((label_cardinality(&cal.predictions) - label_cardinality(&truth())).abs() < 1e-12);
    }

    #[test]
    fn ties_keep_the_higher_threshold() {
        // 0.7 gives rate 0.25 and 0.3 gives 0.75; both are 0.25 from 0.5.
        assert_eq!(sweep(vec![0.7, 0.3, 0.3, 0.1], 4, 0.5), 0.7);
    }

    #[test]
    fn empty_and_all_negative_are_degenerate() {
        let empty = Array2::<f64>::empty(2);
        let cal = calibrate(&empty, &Array2::empty(2), PolicyKind::PCut1).unwrap();
        assert_eq!(cal.policy, ThresholdPolicy::Global(1.0));
        assert_eq!(cal.degenerate, vec![Degeneracy::EmptyMatrix]);

        let zeros = Array2::from_shape_vec((3, 2), vec![0u8; 6]).unwrap();
        let cal = calibrate(&scores(), &zeros, PolicyKind::PCutL).unwrap();
        assert_eq!(cal.policy, ThresholdPolicy::PerLabel(vec![1.0, 1.0]));
        assert_eq!(cal.degenerate.len(), 2);

        // A certain score still yields no positives for a label never seen.
        let certain = Array2::from_shape_vec((2, 1), vec![1.0, 0.3]).unwrap();
        let never = Array2::from_shape_vec((2, 1), vec![0u8, 0]).unwrap();
        let cal = calibrate(&certain, &never, PolicyKind::PCutL).unwrap();
        assert_eq!(cal.policy, ThresholdPolicy::PerLabel(vec![1.0]));
        assert_eq!(cal.degenerate, vec![Degeneracy::LabelWithoutPositives(0)]);
        assert_eq!(cal.predictions, never);

        let cal = calibrate(&certain, &never, PolicyKind::PCut1).unwrap();
        assert_eq!(cal.policy, ThresholdPolicy::Global(1.0));
        assert_eq!(cal.predictions, never);
    }

    #[test]
    fn certain_scores_are_cut_below_the_ceiling() {
        let certain = Array2::from_shape_vec((3, 1), vec![1.0, 1.0, 0.2]).unwrap();
        let truth = Array2::from_shape_vec((3, 1), vec![1u8, 1, 0]).unwrap();
        let cal = calibrate(&certain, &truth, PolicyKind::PCutL).unwrap();
        assert!(cal.policy.threshold_for(0) < CEILING);
        assert!(cal.policy.threshold_for(0) > 0.2);
        assert_eq!(cal.predictions, truth);
    }

    #[test]
    fn policy_text_round_trip() {
        let p: ThresholdPolicy = "[0.3, 0.7]".parse().unwrap();
        assert_eq!(p, ThresholdPolicy::PerLabel(vec![0.3, 0.7]));
        assert_eq!(p.to_string(), "[0.3, 0.7]");
        assert_eq!("0.5".parse::<ThresholdPolicy>().unwrap(), ThresholdPolicy::Global(0.5));
        assert!("[0.3, x]".parse::<ThresholdPolicy>().is_err());
        assert_eq!("pcutl".parse::<PolicyKind>().unwrap(), PolicyKind::PCutL);
    }

    #[test]
    fn evaluation_metrics() {
        let pred = Array2::from_shape_vec((3, 2), vec![1, 0, 0, 0, 1, 1]).unwrap();
        let summary = evaluate(&truth(), &pred).unwrap();
        assert!((summary.hamming_score - 5.0 / 6.0).abs() < 1e-12);
        assert!((summary.exact_match - 2.0 / 3.0).abs() < 1e-12);
        assert!((summary.jaccard_index - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(summary.positives_per_label, vec![2, 1]);
    }
}
