use crate::model_service::{single_batch_scores, ModelError, ModelService};
use ndarray::{Array, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

/// ONNX Runtime classifier with a fixed pool of sessions used round-robin.
pub struct OrtModelService {
    sessions: Vec<Mutex<Session>>,
    counter: AtomicUsize,
    output_name: String,
}

fn build_session(model_path: &Path) -> Result<Session, ort::Error> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .commit_from_file(model_path)?;
    Ok(session)
}

impl OrtModelService {
    pub fn new(model_path: &Path, num_instances: usize) -> Result<Self, ModelError> {
        if !model_path.is_file() {
            return Err(ModelError::Load(format!(
                "model file not found: {}",
                model_path.display()
            )));
        }

        let sessions = (0..num_instances.max(1))
            .map(|_| build_session(model_path).map(Mutex::new))
            .collect::<Result<Vec<_>, ort::Error>>()
            .map_err(|e| ModelError::Load(format!("{}: {}", model_path.display(), e)))?;

        let output_name = sessions
            .first()
            .and_then(|session| session.lock().ok())
            .and_then(|session| session.outputs.first().map(|output| output.name.clone()))
            .ok_or_else(|| {
                ModelError::Load(format!("{} declares no outputs", model_path.display()))
            })?;

        tracing::info!(
            "Created {} ONNX sessions for {}",
            sessions.len(),
            model_path.display()
        );

        Ok(Self {
            sessions,
            counter: AtomicUsize::new(0),
            output_name,
        })
    }
}

impl ModelService for OrtModelService {
    fn class_scores(&self, input: &Array<f32, Ix4>) -> Result<Vec<f32>, ModelError> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| ModelError::Runtime(format!("session mutex poisoned: {}", e)))?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().into_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)
            .map_err(|e| ModelError::Runtime(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| ModelError::Runtime(e.to_string()))?;

        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::Runtime(format!("failed to extract tensor: {}", e)))?;

        let output = ndarray::ArrayD::from_shape_vec(shape.to_ixdyn(), data.to_vec())
            .map_err(|e| ModelError::Runtime(format!("invalid tensor shape: {}", e)))?;

        single_batch_scores(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();

        let result = OrtModelService::new(&dir.path().join("model.onnx"), 1);

        assert!(matches!(result, Err(ModelError::Load(message)) if message.contains("not found")));
    }
}
