use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current on-disk model format.
pub const MODEL_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid model: {0}")]
    Invalid(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Node of a regression tree stored in a flat vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    /// Rows with `features[feature_index] < threshold` go left.
    Split {
        feature_index: u16,
        threshold: f32,
        left: u32,
        right: u32,
    },
    Leaf {
        value: f32,
    },
}

/// Binary regression tree; the root is `nodes[0]` and children always follow
/// their parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    pub fn leaf(value: f32) -> Self {
        Self {
            nodes: vec![TreeNode::Leaf { value }],
        }
    }

    /// Predict the leaf value for a feature vector.
    pub fn predict(&self, features: &[f32]) -> f32 {
        let mut idx = 0usize;
        for _ in 0..self.nodes.len() {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { value }) => return *value,
                Some(TreeNode::Split {
                    feature_index,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = features
                        .get(*feature_index as usize)
                        .copied()
                        .unwrap_or(0.0);
                    let next = if value < *threshold { *left } else { *right };
                    idx = next as usize;
                }
                None => break,
            }
        }
        0.0
    }

    /// Number of split levels on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(TreeNode::Split { left, right, .. }) => {
                    1 + walk(nodes, *left as usize).max(walk(nodes, *right as usize))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    fn validate(&self, feature_len: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature_index,
                left,
                right,
                ..
            } = node
            {
                if *feature_index as usize >= feature_len {
                    return Err(format!("node {idx} splits on unknown feature {feature_index}"));
                }
                for child in [*left as usize, *right as usize] {
                    if child <= idx || child >= self.nodes.len() {
                        return Err(format!("node {idx} has invalid child {child}"));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Gradient-boosted tree ensemble for multi-class classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbdtModel {
    pub model_version: i64,
    /// Number of `f32` values per feature vector.
    pub feature_len: usize,
    #[serde(default)]
    pub feature_names: Vec<String>,
    /// Ordered list of class identifiers.
    pub classes: Vec<String>,
    pub learning_rate: f32,
    /// Initial raw logits before boosting rounds.
    pub init_raw: Vec<f32>,
    /// Shape: `[n_rounds][n_classes]`.
    pub trees: Vec<Vec<RegressionTree>>,
}

impl GbdtModel {
    /// Validate structural invariants of the model.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.model_version != MODEL_VERSION {
            return Err(ModelError::Invalid(format!(
                "unsupported model version {}",
                self.model_version
            )));
        }
        if self.classes.len() < 2 {
            return Err(ModelError::Invalid(
                "model must contain at least 2 classes".to_string(),
            ));
        }
        if self.init_raw.len() != self.classes.len() {
            return Err(ModelError::Invalid(
                "init_raw length must match classes length".to_string(),
            ));
        }
        for (round_idx, round) in self.trees.iter().enumerate() {
            if round.len() != self.classes.len() {
                return Err(ModelError::Invalid(format!(
                    "round {round_idx} has {} trees but expected {}",
                    round.len(),
                    self.classes.len()
                )));
            }
            for tree in round {
                tree.validate(self.feature_len)
                    .map_err(|err| ModelError::Invalid(format!("round {round_idx}: {err}")))?;
            }
        }
        Ok(())
    }

    /// Load a model from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self, ModelError> {
        let bytes = std::fs::read(path)?;
        let model: Self = serde_json::from_slice(&bytes)?;
        model.validate()?;
        Ok(model)
    }

    /// Write the model as pretty-printed JSON.
    pub fn save_json(&self, path: &Path) -> Result<(), ModelError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Predict raw logits for a feature vector.
    pub fn predict_raw(&self, features: &[f32]) -> Vec<f32> {
        let mut raw = self.init_raw.clone();
        for round in &self.trees {
            for (class_idx, tree) in round.iter().enumerate() {
                raw[class_idx] += self.learning_rate * tree.predict(features);
            }
        }
        raw
    }

    /// Predict class probabilities for a feature vector.
    pub fn predict_proba(&self, features: &[f32]) -> Vec<f32> {
        softmax(&self.predict_raw(features))
    }

    /// Predict the best class index for a feature vector.
    pub fn predict_class_index(&self, features: &[f32]) -> usize {
        argmax(&self.predict_raw(features))
    }
}

/// Compute a numerically-stable softmax for a set of logits.
pub fn softmax(raw: &[f32]) -> Vec<f32> {
    if raw.is_empty() {
        return Vec::new();
    }
    let max = raw
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, |a, b| a.max(b));
    let mut exps = Vec::with_capacity(raw.len());
    let mut sum = 0.0f32;
    for &v in raw {
        let e = (v - max).exp();
        exps.push(e);
        sum += e;
    }
    if sum == 0.0 || !sum.is_finite() {
        return vec![1.0 / raw.len() as f32; raw.len()];
    }
    for v in &mut exps {
        *v /= sum;
    }
    exps
}

fn argmax(values: &[f32]) -> usize {
    let mut best_idx = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    for (idx, &v) in values.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best_idx = idx;
        }
    }
    best_idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn split_tree() -> RegressionTree {
        RegressionTree {
            nodes: vec![
                TreeNode::Split {
                    feature_index: 0,
                    threshold: 0.5,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { value: -1.0 },
                TreeNode::Leaf { value: 2.0 },
            ],
        }
    }

    fn two_class_model() -> GbdtModel {
        GbdtModel {
            model_version: MODEL_VERSION,
            feature_len: 1,
            feature_names: vec!["x".into()],
            classes: vec!["a".into(), "b".into()],
            learning_rate: 1.0,
            init_raw: vec![0.0, 0.0],
            trees: vec![vec![
                split_tree(),
                RegressionTree {
                    nodes: vec![
                        TreeNode::Split {
                            feature_index: 0,
                            threshold: 0.5,
                            left: 1,
                            right: 2,
                        },
                        TreeNode::Leaf { value: 1.0 },
                        TreeNode::Leaf { value: -2.0 },
                    ],
                },
            ]],
        }
    }

    #[test]
    fn tree_predict_branches() {
        let tree = split_tree();
        assert_eq!(tree.predict(&[0.0]), -1.0);
        assert_eq!(tree.predict(&[0.49]), -1.0);
        assert_eq!(tree.predict(&[0.5]), 2.0);
        assert_eq!(tree.depth(), 1);
        assert_eq!(RegressionTree::leaf(3.0).depth(), 0);
    }

    #[test]
    fn model_predicts_argmax_and_normalized_proba() {
        let model = two_class_model();
        assert_eq!(model.predict_class_index(&[0.0]), 1);
        assert_eq!(model.predict_class_index(&[1.0]), 0);
        let proba = model.predict_proba(&[1.0]);
        assert_eq!(proba.len(), 2);
        assert!((proba.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(proba[0] > proba[1]);
    }

    #[test]
    fn validate_rejects_backward_child_links() {
        let mut model = two_class_model();
        model.trees[0][0].nodes[0] = TreeNode::Split {
            feature_index: 0,
            threshold: 0.5,
            left: 0,
            right: 2,
        };
        assert!(matches!(model.validate(), Err(ModelError::Invalid(_))));
    }

    #[test]
    fn saved_model_loads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");
        let model = two_class_model();
        model.save_json(&path).unwrap();
        assert_eq!(GbdtModel::load_json(&path).unwrap(), model);
    }

    #[test]
    fn softmax_handles_empty_and_extreme_logits() {
        assert!(softmax(&[]).is_empty());
        let probs = softmax(&[1000.0, 0.0]);
        assert!((probs[0] - 1.0).abs() < 1e-6);
        assert!(probs[1] >= 0.0);
    }
}
