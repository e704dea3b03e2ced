//! K-nearest-neighbour classifier over embedding vectors
//!
//! Examples are grouped by label. Prediction takes the `k` examples with the
//! highest cosine similarity to the query and counts votes per label.
//! Confidences are `votes / k`, so they sum to 1 and a unanimous vote gives
//! exactly 1.0.
//!
//! The dataset file is a JSON array of `[label, flatSamples, shape]` triples,
//! where `shape` is `[examples, dim]` and `flatSamples` holds
//! `examples * dim` values in row-major order.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Dataset and prediction errors
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("dataset parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("label `{label}`: shape {shape:?} does not match {len} samples")]
    ShapeMismatch {
        label: String,
        shape: Vec<usize>,
        len: usize,
    },
    #[error("embedding has {actual} values, classifier expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("classifier has no examples")]
    Empty,
}

/// One `[label, flatSamples, shape]` triple of the dataset file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetEntry(pub String, pub Vec<f32>, pub Vec<usize>);

/// Serialized classifier examples
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassifierDataset {
    pub entries: Vec<DatasetEntry>,
}

impl ClassifierDataset {
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, DatasetError> {
        let dataset: ClassifierDataset = serde_json::from_str(text)?;
        for DatasetEntry(label, samples, shape) in &dataset.entries {
            let expected: usize = shape.iter().product();
            if shape.is_empty() || shape.len() > 2 || expected != samples.len() {
                return Err(DatasetError::ShapeMismatch {
                    label: label.clone(),
                    shape: shape.clone(),
                    len: samples.len(),
                });
            }
        }
        Ok(dataset)
    }

    pub fn save(&self, path: &Path) -> Result<(), DatasetError> {
        let text = serde_json::to_string(self)?;
        fs::write(path, text)?;
        Ok(())
    }
}

/// A classifier verdict
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    /// Label with the most votes
    pub label: String,
    /// Share of the `k` votes per known label; sums to 1
    pub confidences: BTreeMap<String, f32>,
}

impl Prediction {
    /// Confidence of the winning label
    pub fn confidence(&self) -> f32 {
        self.confidences.get(&self.label).copied().unwrap_or(0.0)
    }
}

#[derive(Clone, Debug)]
struct LabelExamples {
    label: String,
    /// Row-major, `dim` values per example
    samples: Vec<f32>,
}

/// Nearest-neighbour classifier
#[derive(Clone, Debug)]
pub struct KnnClassifier {
    k: usize,
    dim: Option<usize>,
    /// In dataset order; ties go to the earlier label
    classes: Vec<LabelExamples>,
}

impl KnnClassifier {
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            dim: None,
            classes: Vec::new(),
        }
    }

    pub fn from_dataset(dataset: &ClassifierDataset, k: usize) -> Result<Self, DatasetError> {
        let mut classifier = Self::new(k);
        for DatasetEntry(label, samples, shape) in &dataset.entries {
            let dim = *shape.last().unwrap_or(&0);
            if dim == 0 {
                return Err(DatasetError::ShapeMismatch {
                    label: label.clone(),
                    shape: shape.clone(),
                    len: samples.len(),
                });
            }
            for example in samples.chunks(dim) {
                classifier.add_example(label, example)?;
            }
        }
        Ok(classifier)
    }

    pub fn to_dataset(&self) -> ClassifierDataset {
        let dim = self.dim.unwrap_or(0);
        ClassifierDataset {
            entries: self
                .classes
                .iter()
                .map(|class| {
                    let rows = if dim == 0 { 0 } else { class.samples.len() / dim };
                    DatasetEntry(class.label.clone(), class.samples.clone(), vec![rows, dim])
                })
                .collect(),
        }
    }

    pub fn add_example(&mut self, label: &str, embedding: &[f32]) -> Result<(), DatasetError> {
        match self.dim {
            Some(dim) if dim != embedding.len() => {
                return Err(DatasetError::DimensionMismatch {
                    expected: dim,
                    actual: embedding.len(),
                })
            }
            Some(_) => {}
            None => self.dim = Some(embedding.len()),
        }

        match self.classes.iter_mut().find(|class| class.label == label) {
            Some(class) => class.samples.extend_from_slice(embedding),
            None => self.classes.push(LabelExamples {
                label: label.to_string(),
                samples: embedding.to_vec(),
            }),
        }
        Ok(())
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn num_examples(&self) -> usize {
        match self.dim {
            Some(dim) if dim > 0 => self.classes.iter().map(|c| c.samples.len() / dim).sum(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.num_examples() == 0
    }

    pub fn predict(&self, embedding: &[f32]) -> Result<Prediction, DatasetError> {
        let dim = match self.dim {
            Some(dim) if !self.is_empty() => dim,
            _ => return Err(DatasetError::Empty),
        };
        if embedding.len() != dim {
            return Err(DatasetError::DimensionMismatch {
                expected: dim,
                actual: embedding.len(),
            });
        }

        // (similarity, class index)
        let mut neighbours: Vec<(f32, usize)> = self
            .classes
            .iter()
            .enumerate()
            .flat_map(|(class_idx, class)| {
                class
                    .samples
                    .chunks(dim)
                    .map(move |example| (cosine_similarity(embedding, example), class_idx))
            })
            .collect();
        neighbours.sort_by(|a, b| b.0.total_cmp(&a.0));

        let k = self.k.min(neighbours.len());
        let mut votes = vec![0usize; self.classes.len()];
        for &(_, class_idx) in &neighbours[..k] {
            votes[class_idx] += 1;
        }

        let mut winner = 0;
        for (idx, &count) in votes.iter().enumerate() {
            if count > votes[winner] {
                winner = idx;
            }
        }

        let confidences = self
            .classes
            .iter()
            .zip(&votes)
            .map(|(class, &count)| (class.label.clone(), count as f32 / k as f32))
            .collect();

        Ok(Prediction {
            label: self.classes[winner].label.clone(),
            confidences,
        })
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trained() -> KnnClassifier {
        let mut knn = KnnClassifier::new(3);
        knn.add_example("peace", &[1.0, 0.0, 0.0]).unwrap();
        knn.add_example("peace", &[0.9, 0.1, 0.0]).unwrap();
        knn.add_example("peace", &[0.95, 0.0, 0.05]).unwrap();
        knn.add_example("heart", &[0.0, 1.0, 0.0]).unwrap();
        knn.add_example("heart", &[0.1, 0.9, 0.0]).unwrap();
        knn.add_example("none", &[0.0, 0.0, 1.0]).unwrap();
        knn
    }

    #[test]
    fn test_unanimous_vote_has_full_confidence() {
        let prediction = trained().predict(&[1.0, 0.05, 0.0]).unwrap();
        assert_eq!(prediction.label, "peace");
        assert_eq!(prediction.confidence(), 1.0);
        assert_eq!(prediction.confidences["heart"], 0.0);
        assert_eq!(prediction.confidences.len(), 3);
    }

    #[test]
    fn test_split_vote_confidences_sum_to_one() {
        // nearest: two hearts, then a peace example
        let prediction = trained().predict(&[0.5, 0.6, 0.0]).unwrap();
        assert_eq!(prediction.label, "heart");
        assert!((prediction.confidence() - 2.0 / 3.0).abs() < 1e-6);
        let total: f32 = prediction.confidences.values().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_k_is_capped_by_example_count() {
        let mut knn = KnnClassifier::new(5);
        knn.add_example("a", &[1.0, 0.0]).unwrap();
        knn.add_example("b", &[0.0, 1.0]).unwrap();
        let prediction = knn.predict(&[1.0, 0.1]).unwrap();
        assert_eq!(prediction.label, "a");
        assert_eq!(prediction.confidences["a"], 0.5);
    }

    #[test]
    fn test_empty_and_mismatched_inputs() {
        assert!(matches!(
            KnnClassifier::new(3).predict(&[1.0]),
            Err(DatasetError::Empty)
        ));
        let mut knn = trained();
        assert!(matches!(
            knn.predict(&[1.0, 0.0]),
            Err(DatasetError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert!(knn.add_example("peace", &[1.0]).is_err());
    }

    #[test]
    fn test_dataset_text_format() {
        let text = r#"[["0",[1,0,0.9,0.1],[2,2]],["1",[0,1],[1,2]]]"#;
        let dataset = ClassifierDataset::from_json(text).unwrap();
        let knn = KnnClassifier::from_dataset(&dataset, 3).unwrap();
        assert_eq!(knn.num_classes(), 2);
        assert_eq!(knn.num_examples(), 3);

        let exported = knn.to_dataset();
        assert_eq!(exported.entries[0].2, vec![2, 2]);
        assert_eq!(exported, dataset);
    }

    #[test]
    fn test_dataset_shape_must_match_samples() {
        let text = r#"[["0",[1,0,0.9],[2,2]]]"#;
        assert!(matches!(
            ClassifierDataset::from_json(text),
            Err(DatasetError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            ClassifierDataset::from_json("not json"),
            Err(DatasetError::Parse(_))
        ));
    }

    #[test]
    fn test_dataset_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knn-classifier-model.txt");

        trained().to_dataset().save(&path).unwrap();
        let loaded = ClassifierDataset::load(&path).unwrap();
        let knn = KnnClassifier::from_dataset(&loaded, 1).unwrap();
        assert_eq!(knn.num_examples(), 6);
        assert_eq!(knn.predict(&[0.0, 0.0, 1.0]).unwrap().label, "none");

        assert!(matches!(
            ClassifierDataset::load(&dir.path().join("missing.txt")),
            Err(DatasetError::Io(_))
        ));
    }
}
