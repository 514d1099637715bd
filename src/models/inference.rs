//! Inference engine for the pre-trained fraud classifier

use crate::config::AppConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::models::loader::{LoadedModel, ModelLoader};
use crate::types::prediction::{Label, Prediction};
use crate::types::transaction::{TransactionRecord, FEATURE_COUNT};
use ort::memory::Allocator;
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType};
use std::path::Path;
use std::sync::RwLock;
use tracing::{debug, warn};

/// Single-model inference engine using ONNX Runtime.
///
/// The session is loaded once at startup and treated as immutable from
/// then on. The lock exists only because the ort API needs `&mut` to run;
/// inference itself is a pure read of the artifact, so the same input
/// always yields the same output.
pub struct InferenceEngine {
    /// Loaded ONNX model (wrapped in RwLock for interior mutability)
    model: RwLock<LoadedModel>,
    /// Fallback decision threshold for artifacts without a label output
    decision_threshold: f64,
}

impl InferenceEngine {
    /// Create the engine from configuration.
    pub fn new(config: &AppConfig) -> ServiceResult<Self> {
        Self::with_artifact(
            &config.model.path,
            config.model.onnx_threads,
            config.model.decision_threshold,
        )
    }

    /// Create the engine from an artifact path.
    pub fn with_artifact<P: AsRef<Path>>(
        path: P,
        onnx_threads: usize,
        decision_threshold: f64,
    ) -> ServiceResult<Self> {
        let loader = ModelLoader::with_threads(onnx_threads);
        let model = loader.load_model(path)?;

        Ok(Self {
            model: RwLock::new(model),
            decision_threshold,
        })
    }

    /// Score a single record.
    pub fn predict(&self, record: &TransactionRecord) -> ServiceResult<Prediction> {
        let mut predictions = self.predict_batch(std::slice::from_ref(record))?;
        predictions
            .pop()
            .ok_or_else(|| ServiceError::Internal("empty prediction batch".to_string()))
    }

    /// Score a batch of validated records in one session call.
    ///
    /// Result i always describes row i. Probabilities are clamped to
    /// [0, 1] after extraction.
    pub fn predict_batch(&self, records: &[TransactionRecord]) -> ServiceResult<Vec<Prediction>> {
        if records.is_empty() {
            return Err(ServiceError::SchemaMismatch(
                "no transaction rows to score".to_string(),
            ));
        }

        use ort::value::Tensor;

        let n_rows = records.len();
        let mut data = Vec::with_capacity(n_rows * FEATURE_COUNT);
        for record in records {
            data.extend(record.to_features());
        }

        // Input shape [n_rows, FEATURE_COUNT]
        let shape = vec![n_rows as i64, FEATURE_COUNT as i64];
        let input_tensor = Tensor::from_array((shape, data))?;

        let mut model = self
            .model
            .write()
            .map_err(|e| ServiceError::Internal(format!("model lock poisoned: {}", e)))?;

        let input_name = model.input_name.clone();
        let prob_output = model.prob_output.clone();
        let label_output = model.label_output.clone();

        let outputs = model.session.run(ort::inputs![&input_name => input_tensor])?;

        let fraud_probs = Self::extract_fraud_probabilities(&outputs, &prob_output, n_rows)?;
        let labels = match &label_output {
            Some(name) => Self::extract_labels(&outputs, name, n_rows),
            None => None,
        };

        let predictions =
            assemble_predictions(labels.as_deref(), &fraud_probs, self.decision_threshold)?;

        debug!(rows = n_rows, "Inference complete");

        Ok(predictions)
    }

    /// Extract raw model labels, when the artifact provides them.
    fn extract_labels(
        outputs: &ort::session::SessionOutputs,
        label_output: &str,
        n_rows: usize,
    ) -> Option<Vec<i64>> {
        let output = outputs.get(label_output)?;
        match output.try_extract_tensor::<i64>() {
            Ok((_, data)) if data.len() == n_rows => Some(data.to_vec()),
            Ok((_, data)) => {
                warn!(
                    expected = n_rows,
                    got = data.len(),
                    "Label output length mismatch, thresholding probabilities instead"
                );
                None
            }
            Err(_) => None,
        }
    }

    /// Extract per-row fraud probabilities from model output.
    /// Handles both tensor outputs and seq(map) outputs, the two layouts
    /// sklearn-onnx classifier exports produce.
    fn extract_fraud_probabilities(
        outputs: &ort::session::SessionOutputs,
        prob_output: &str,
        n_rows: usize,
    ) -> ServiceResult<Vec<f64>> {
        // First, try the resolved probabilities output by name
        if let Some(output) = outputs.get(prob_output) {
            if let Ok(tensor) = output.try_extract_tensor::<f32>() {
                let (shape, data) = tensor;
                let dims: Vec<i64> = shape.iter().copied().collect();
                return fraud_probabilities_from_tensor(&dims, data, n_rows);
            }

            let dtype = output.dtype();
            if DynSequenceValueType::can_downcast(&dtype) {
                if let Ok(probs) = Self::extract_from_sequence_maps(output, n_rows) {
                    return Ok(probs);
                }
            }
        }

        // Fallback: iterate all outputs and try extraction
        for (name, output) in outputs.iter() {
            if name.contains("label") {
                continue;
            }

            if let Ok(tensor) = output.try_extract_tensor::<f32>() {
                let (shape, data) = tensor;
                let dims: Vec<i64> = shape.iter().copied().collect();
                debug!(output = %name, "Extracting probabilities from fallback output");
                return fraud_probabilities_from_tensor(&dims, data, n_rows);
            }

            let dtype = output.dtype();
            if DynSequenceValueType::can_downcast(&dtype) {
                if let Ok(probs) = Self::extract_from_sequence_maps(&output, n_rows) {
                    return Ok(probs);
                }
            }
        }

        Err(ServiceError::Inference(
            "no probability output could be extracted from the model".to_string(),
        ))
    }

    /// Extract probabilities from seq(map(int64, float)) output, one map
    /// of class id to probability per input row.
    fn extract_from_sequence_maps(
        output: &ort::value::DynValue,
        n_rows: usize,
    ) -> ServiceResult<Vec<f64>> {
        let allocator = Allocator::default();

        let sequence = output
            .downcast_ref::<DynSequenceValueType>()
            .map_err(|e| ServiceError::Inference(format!("failed to downcast sequence: {}", e)))?;

        let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;

        if maps.len() != n_rows {
            return Err(ServiceError::Inference(format!(
                "probability sequence has {} entries for {} rows",
                maps.len(),
                n_rows
            )));
        }

        let mut probs = Vec::with_capacity(n_rows);
        for map_value in &maps {
            let kv_pairs = map_value.try_extract_key_values::<i64, f32>()?;

            // Class 1 is the fraud class; fall back to the complement of
            // class 0 when the export only carries the negative class.
            let fraud = kv_pairs
                .iter()
                .find(|(class_id, _)| *class_id == 1)
                .map(|(_, p)| *p as f64)
                .or_else(|| {
                    kv_pairs
                        .iter()
                        .find(|(class_id, _)| *class_id == 0)
                        .map(|(_, p)| 1.0 - *p as f64)
                });

            match fraud {
                Some(p) => probs.push(p),
                None => {
                    return Err(ServiceError::Inference(
                        "no class probability found in map output".to_string(),
                    ))
                }
            }
        }

        Ok(probs)
    }
}

/// Pick the fraud-class probability for each row of a tensor output.
///
/// `[N, C]` tensors with C >= 2 carry per-class probabilities with the
/// fraud class at column 1; `[N, 1]` and `[N]` tensors carry a single
/// positive-class score per row.
pub fn fraud_probabilities_from_tensor(
    dims: &[i64],
    data: &[f32],
    n_rows: usize,
) -> ServiceResult<Vec<f64>> {
    let row_mismatch = |got: i64| {
        ServiceError::Inference(format!(
            "probability output has {} rows for {} inputs",
            got, n_rows
        ))
    };

    match dims {
        [rows, cols] => {
            if *rows as usize != n_rows {
                return Err(row_mismatch(*rows));
            }
            let cols = *cols as usize;
            if cols == 0 || data.len() < n_rows * cols {
                return Err(ServiceError::Inference(
                    "probability tensor is smaller than its declared shape".to_string(),
                ));
            }
            if cols >= 2 {
                Ok((0..n_rows).map(|i| data[i * cols + 1] as f64).collect())
            } else {
                Ok((0..n_rows).map(|i| data[i] as f64).collect())
            }
        }
        [rows] => {
            if *rows as usize != n_rows || data.len() < n_rows {
                return Err(row_mismatch(*rows));
            }
            Ok((0..n_rows).map(|i| data[i] as f64).collect())
        }
        other => Err(ServiceError::Inference(format!(
            "unsupported probability tensor shape {:?}",
            other
        ))),
    }
}

/// Pair labels and probabilities into predictions, preserving row order.
///
/// When the artifact supplies no labels, each row is thresholded at the
/// configured decision threshold. Probabilities are clamped to [0, 1].
pub fn assemble_predictions(
    labels: Option<&[i64]>,
    fraud_probs: &[f64],
    threshold: f64,
) -> ServiceResult<Vec<Prediction>> {
    if let Some(labels) = labels {
        if labels.len() != fraud_probs.len() {
            return Err(ServiceError::Inference(format!(
                "{} labels for {} probabilities",
                labels.len(),
                fraud_probs.len()
            )));
        }
    }

    Ok(fraud_probs
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let fraud_probability = p.clamp(0.0, 1.0);
            let label = match labels {
                Some(labels) => Label::from_raw(labels[i]),
                None => Label::from_probability(fraud_probability, threshold),
            };
            Prediction {
                label,
                fraud_probability,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_class_tensor_takes_fraud_column() {
        let dims = [3, 2];
        let data = [0.9, 0.1, 0.2, 0.8, 0.7, 0.3];

        let probs = fraud_probabilities_from_tensor(&dims, &data, 3).unwrap();
        assert_eq!(probs.len(), 3);
        assert!((probs[0] - 0.1).abs() < 1e-6);
        assert!((probs[1] - 0.8).abs() < 1e-6);
        assert!((probs[2] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_single_column_tensor() {
        let dims = [2, 1];
        let data = [0.25, 0.75];

        let probs = fraud_probabilities_from_tensor(&dims, &data, 2).unwrap();
        assert_eq!(probs.len(), 2);
        assert!((probs[0] - 0.25).abs() < 1e-6);
        assert!((probs[1] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_flat_tensor() {
        let dims = [4];
        let data = [0.0, 0.5, 1.0, 0.4];

        let probs = fraud_probabilities_from_tensor(&dims, &data, 4).unwrap();
        assert_eq!(probs.len(), 4);
    }

    #[test]
    fn test_row_count_mismatch_is_rejected() {
        let dims = [2, 2];
        let data = [0.9, 0.1, 0.2, 0.8];

        assert!(matches!(
            fraud_probabilities_from_tensor(&dims, &data, 3),
            Err(ServiceError::Inference(_))
        ));
    }

    #[test]
    fn test_assemble_preserves_order_and_length() {
        let labels = [0_i64, 1, 0];
        let probs = [0.1, 0.9, 0.2];

        let predictions = assemble_predictions(Some(&labels), &probs, 0.5).unwrap();

        assert_eq!(predictions.len(), probs.len());
        assert_eq!(predictions[0].label, Label::Legitimate);
        assert_eq!(predictions[1].label, Label::Fraud);
        assert_eq!(predictions[2].label, Label::Legitimate);
        assert_eq!(predictions[1].fraud_probability, 0.9);
    }

    #[test]
    fn test_assemble_is_deterministic() {
        let probs = [0.3, 0.7];

        let first = assemble_predictions(None, &probs, 0.5).unwrap();
        let second = assemble_predictions(None, &probs, 0.5).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_probabilities_are_clamped() {
        let probs = [-0.2, 1.4, 0.5];

        let predictions = assemble_predictions(None, &probs, 0.5).unwrap();

        for prediction in &predictions {
            assert!(prediction.fraud_probability >= 0.0);
            assert!(prediction.fraud_probability <= 1.0);
        }
        assert_eq!(predictions[0].fraud_probability, 0.0);
        assert_eq!(predictions[1].fraud_probability, 1.0);
    }

    #[test]
    fn test_thresholding_without_labels() {
        let probs = [0.49, 0.51];

        let predictions = assemble_predictions(None, &probs, 0.5).unwrap();

        assert_eq!(predictions[0].label, Label::Legitimate);
        assert_eq!(predictions[1].label, Label::Fraud);
    }

    #[test]
    fn test_label_count_mismatch_is_rejected() {
        let labels = [0_i64];
        let probs = [0.1, 0.9];

        assert!(matches!(
            assemble_predictions(Some(&labels), &probs, 0.5),
            Err(ServiceError::Inference(_))
        ));
    }

    #[test]
    fn test_single_row_batch() {
        let predictions = assemble_predictions(Some(&[1]), &[0.97], 0.5).unwrap();

        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].label, Label::Fraud);
    }
}
