use crate::{
    config::ModelsConfig,
    domain::Domain,
    labels::{load_labels, LabelsError, CLASSES_FILE},
    model_service::{arg_max, ModelError, ModelService},
    ort_service::OrtModelService,
    preprocess::{preprocess, PreprocessError},
};
use serde::Serialize;
use std::{collections::HashMap, path::PathBuf};
use thiserror::Error;

pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("failed to load {domain} labels from {}: {source}", .path.display())]
    Labels {
        domain: Domain,
        path: PathBuf,
        source: LabelsError,
    },
    #[error("failed to load {domain} model: {source}")]
    Model { domain: Domain, source: ModelError },
}

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("no model loaded for {0}")]
    MissingModel(Domain),
}

pub struct ModelEntry<M: ModelService> {
    pub labels: Vec<String>,
    pub model: M,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    #[serde(rename = "type")]
    pub domain: Domain,
    pub class_idx: usize,
    pub species_name: String,
    pub confidence: f32,
}

impl<M: ModelService> ModelEntry<M> {
    pub fn label_for(&self, class_idx: usize) -> &str {
        self.labels
            .get(class_idx)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_LABEL)
    }
}

/// Domain to (labels, model) mapping, built once and read-only afterwards.
pub struct ModelRegistry<M: ModelService> {
    entries: HashMap<Domain, ModelEntry<M>>,
}

impl ModelRegistry<OrtModelService> {
    pub fn load(config: &ModelsConfig) -> Result<Self, RegistryError> {
        let mut entries = HashMap::new();

        for domain in Domain::ALL {
            let dir = config.dir_for(domain);
            let labels_path = dir.join(CLASSES_FILE);
            let labels = load_labels(&labels_path).map_err(|source| RegistryError::Labels {
                domain,
                path: labels_path.clone(),
                source,
            })?;

            let model = OrtModelService::new(&config.model_path(domain), config.num_instances)
                .map_err(|source| RegistryError::Model { domain, source })?;

            tracing::info!(
                "Loaded {} model from {} with {} classes",
                domain,
                dir.display(),
                labels.len()
            );
            entries.insert(domain, ModelEntry { labels, model });
        }

        Ok(Self { entries })
    }
}

impl<M: ModelService> ModelRegistry<M> {
    pub fn new(entries: impl IntoIterator<Item = (Domain, ModelEntry<M>)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, domain: Domain) -> Option<&ModelEntry<M>> {
        self.entries.get(&domain)
    }

    /// Decodes, preprocesses and classifies an uploaded image. Blocks.
    pub fn classify(&self, domain: Domain, image_data: &[u8]) -> Result<Prediction, ClassifyError> {
        let entry = self
            .get(domain)
            .ok_or(ClassifyError::MissingModel(domain))?;

        let input = preprocess(image_data)?;
        let scores = entry.model.class_scores(&input)?;
        let (class_idx, confidence) =
            arg_max(&scores).ok_or_else(|| ModelError::OutputShape(vec![0]))?;

        Ok(Prediction {
            domain,
            class_idx,
            species_name: entry.label_for(class_idx).to_string(),
            confidence,
        })
    }
}
