//! ONNX model loader

use crate::error::{ServiceError, ServiceResult};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::info;

/// Loaded ONNX model with resolved input/output names
#[derive(Debug)]
pub struct LoadedModel {
    /// ONNX Runtime session
    pub session: Session,
    /// Input name for the model
    pub input_name: String,
    /// Output name for per-class probabilities
    pub prob_output: String,
    /// Output name for the thresholded label, when the artifact has one
    pub label_output: Option<String>,
}

/// Loader for the classifier artifact
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with default settings (1 thread)
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Self {
        Self { onnx_threads }
    }

    /// Load the classifier from file.
    ///
    /// Any failure here means the service cannot operate and is reported
    /// as a load failure for the caller to treat as fatal.
    pub fn load_model<P: AsRef<Path>>(&self, path: P) -> ServiceResult<LoadedModel> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ServiceError::ModelLoad(format!(
                "artifact not found at {}",
                path.display()
            )));
        }

        info!(path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = self
            .build_session(path)
            .map_err(|e| ServiceError::ModelLoad(format!("{}: {}", path.display(), e)))?;

        // Resolve IO names from session metadata. Classifier exports carry
        // a label output and a probabilities output; regressor-style
        // exports only have the latter.
        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let prob_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob") || o.name.contains("output"))
            .map(|o| o.name.clone())
            .unwrap_or_else(|| {
                session
                    .outputs
                    .last()
                    .map(|o| o.name.clone())
                    .unwrap_or_else(|| "probabilities".to_string())
            });

        let label_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("label"))
            .map(|o| o.name.clone());

        info!(
            input = %input_name,
            probabilities = %prob_output,
            label = ?label_output,
            "Model loaded successfully"
        );

        Ok(LoadedModel {
            session,
            input_name,
            prob_output,
            label_output,
        })
    }

    fn build_session(&self, path: &Path) -> Result<Session, ort::Error> {
        ort::init().commit()?;

        Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self { onnx_threads: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_artifact_is_load_failure() {
        let loader = ModelLoader::new();
        let err = loader.load_model("models/does_not_exist.onnx").unwrap_err();

        match err {
            ServiceError::ModelLoad(msg) => assert!(msg.contains("does_not_exist.onnx")),
            other => panic!("expected ModelLoad, got {:?}", other),
        }
    }
}
