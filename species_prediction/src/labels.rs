use std::{collections::HashMap, fs, path::Path};
use thiserror::Error;

pub const CLASSES_FILE: &str = "classes.json";

#[derive(Error, Debug)]
pub enum LabelsError {
    #[error("failed to read labels file: {0}")]
    Io(#[from] std::io::Error),
    #[error("labels file is not a label-to-index object: {0}")]
    Json(#[from] serde_json::Error),
    #[error("labels file contains no classes")]
    Empty,
    #[error("class `{label}` has index {index}, outside 0..{len}")]
    IndexOutOfRange {
        label: String,
        index: usize,
        len: usize,
    },
    #[error("index {index} is assigned to both `{first}` and `{second}`")]
    DuplicateIndex {
        index: usize,
        first: String,
        second: String,
    },
}

/// Reads a `classes.json` mapping of label name to class index and returns
/// the labels ordered by index.
pub fn load_labels(filepath: &Path) -> Result<Vec<String>, LabelsError> {
    let raw = fs::read_to_string(filepath)?;
    parse_labels(&raw)
}

pub fn parse_labels(raw: &str) -> Result<Vec<String>, LabelsError> {
    let class_indices: HashMap<String, usize> = serde_json::from_str(raw)?;
    if class_indices.is_empty() {
        return Err(LabelsError::Empty);
    }

    let len = class_indices.len();
    let mut slots: Vec<Option<String>> = vec![None; len];

    for (label, index) in class_indices {
        let slot = slots
            .get_mut(index)
            .ok_or_else(|| LabelsError::IndexOutOfRange {
                label: label.clone(),
                index,
                len,
            })?;

        if let Some(first) = slot.take() {
            return Err(LabelsError::DuplicateIndex {
                index,
                first,
                second: label,
            });
        }
        *slot = Some(label);
    }

    // len distinct indices below len fill every slot
    Ok(slots.into_iter().flatten().collect())
}
