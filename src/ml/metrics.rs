use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Model evaluation metrics for the binary failure classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Accuracy
    pub accuracy: f64,

    /// Macro-averaged precision
    pub precision: f64,

    /// Macro-averaged recall
    pub recall: f64,

    /// Macro-averaged F1 score
    pub f1_score: f64,

    /// Confusion matrix, `[[tn, fp], [fn, tp]]`
    pub confusion_matrix: [[usize; 2]; 2],

    /// Per-class metrics keyed by `class_0` / `class_1`
    pub per_class_metrics: BTreeMap<String, ClassMetrics>,

    /// Number of evaluated samples
    pub n_samples: usize,
}

/// Per-class evaluation metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

impl ModelMetrics {
    pub fn new() -> Self {
        Self {
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            confusion_matrix: [[0; 2]; 2],
            per_class_metrics: BTreeMap::new(),
            n_samples: 0,
        }
    }

    /// Compare true and predicted 0/1 labels
    pub fn calculate(y_true: &[u8], y_pred: &[u8]) -> Self {
        let n_samples = y_true.len().min(y_pred.len());
        if n_samples == 0 {
            return Self::new();
        }

        let mut confusion = [[0usize; 2]; 2];
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            confusion[usize::from(t.min(1))][usize::from(p.min(1))] += 1;
        }

        let correct = confusion[0][0] + confusion[1][1];
        let accuracy = correct as f64 / n_samples as f64;

        let mut per_class = BTreeMap::new();
        for class_idx in 0..2 {
            let other = 1 - class_idx;
            let tp = confusion[class_idx][class_idx];
            let fp = confusion[other][class_idx];
            let fn_count = confusion[class_idx][other];

            let precision = if tp + fp > 0 {
                tp as f64 / (tp + fp) as f64
            } else {
                0.0
            };

            let recall = if tp + fn_count > 0 {
                tp as f64 / (tp + fn_count) as f64
            } else {
                0.0
            };

            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            per_class.insert(
                format!("class_{}", class_idx),
                ClassMetrics {
                    precision,
                    recall,
                    f1_score: f1,
                    support: tp + fn_count,
                },
            );
        }

        let avg = |f: fn(&ClassMetrics) -> f64| per_class.values().map(f).sum::<f64>() / 2.0;

        Self {
            accuracy,
            precision: avg(|m| m.precision),
            recall: avg(|m| m.recall),
            f1_score: avg(|m| m.f1_score),
            confusion_matrix: confusion,
            per_class_metrics: per_class,
            n_samples,
        }
    }
}

impl Default for ModelMetrics {
    fn default() -> Self {
        Self::new()
    }
}
