use thiserror::Error;

use super::model::{GbdtModel, MODEL_VERSION, RegressionTree, TreeNode, softmax};

const MIN_HESSIAN: f32 = 1e-16;
const MIN_SPLIT_GAIN: f64 = 1e-12;

/// Training hyperparameters for tree boosting.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    /// Number of boosting rounds.
    pub rounds: usize,
    /// Learning rate applied per round.
    pub learning_rate: f32,
    /// Maximum number of split levels per tree.
    pub max_depth: usize,
    /// Number of bins used for split search.
    pub bins: usize,
    /// L2 regularization on leaf weights.
    pub reg_lambda: f32,
    /// Minimum hessian sum required in each child.
    pub min_child_weight: f32,
    /// Worker threads used to fit the per-class trees of a round.
    pub threads: usize,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            rounds: 100,
            learning_rate: 0.1,
            max_depth: 5,
            bins: 256,
            reg_lambda: 1.0,
            min_child_weight: 1.0,
            threads: 1,
        }
    }
}

/// In-memory dataset used for training and evaluation.
#[derive(Debug, Clone)]
pub struct TrainDataset {
    /// Number of `f32` values in each feature vector.
    pub feature_len: usize,
    pub feature_names: Vec<String>,
    /// Ordered list of class identifiers.
    pub classes: Vec<String>,
    /// Feature matrix, row-major.
    pub x: Vec<Vec<f32>>,
    /// Class indices aligned with `x`.
    pub y: Vec<usize>,
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("mismatched X/Y lengths ({x} rows, {y} labels)")]
    MismatchedLengths { x: usize, y: usize },
    #[error("empty dataset")]
    Empty,
    #[error("need at least 2 classes, got {0}")]
    TooFewClasses(usize),
    #[error("label {label} out of range for {classes} classes")]
    LabelOutOfRange { label: usize, classes: usize },
    #[error("row {row} has {len} features, expected {expected}")]
    FeatureLength {
        row: usize,
        len: usize,
        expected: usize,
    },
    #[error("tree worker panicked")]
    WorkerPanicked,
}

/// Train a multi-class GBDT model using softmax gradient boosting with
/// second-order leaf weights.
pub fn train_gbdt(dataset: &TrainDataset, options: &TrainOptions) -> Result<GbdtModel, TrainError> {
    validate_dataset(dataset)?;
    let n = dataset.x.len();
    let n_classes = dataset.classes.len();
    let bins = options.bins.clamp(2, 256);

    let (mins, maxs) = compute_feature_min_max(&dataset.x, dataset.feature_len);
    let binned = bin_features(&dataset.x, &mins, &maxs, bins);
    let edges = bin_edges(&mins, &maxs, bins);
    let ctx = GrowContext {
        x: &dataset.x,
        binned: &binned,
        edges: &edges,
        bins,
        max_depth: options.max_depth,
        reg_lambda: f64::from(options.reg_lambda.max(0.0)),
        min_child_weight: f64::from(options.min_child_weight.max(0.0)),
    };

    let priors = class_priors(&dataset.y, n_classes);
    let init_raw: Vec<f32> = priors.iter().map(|&p| p.max(1e-6).ln()).collect();
    let mut raw = vec![init_raw.clone(); n];

    let mut rounds_out = Vec::with_capacity(options.rounds);
    for _round in 0..options.rounds {
        let (grads, hess) = compute_gradients(&dataset.y, &raw, n_classes);
        let trees = fit_round(&ctx, &grads, &hess, options.threads)?;
        for (i, row) in dataset.x.iter().enumerate() {
            for (class_idx, tree) in trees.iter().enumerate() {
                raw[i][class_idx] += options.learning_rate * tree.predict(row);
            }
        }
        rounds_out.push(trees);
    }

    Ok(GbdtModel {
        model_version: MODEL_VERSION,
        feature_len: dataset.feature_len,
        feature_names: dataset.feature_names.clone(),
        classes: dataset.classes.clone(),
        learning_rate: options.learning_rate,
        init_raw,
        trees: rounds_out,
    })
}

fn validate_dataset(dataset: &TrainDataset) -> Result<(), TrainError> {
    if dataset.x.len() != dataset.y.len() {
        return Err(TrainError::MismatchedLengths {
            x: dataset.x.len(),
            y: dataset.y.len(),
        });
    }
    if dataset.x.is_empty() {
        return Err(TrainError::Empty);
    }
    let n_classes = dataset.classes.len();
    if n_classes < 2 {
        return Err(TrainError::TooFewClasses(n_classes));
    }
    if let Some(&label) = dataset.y.iter().find(|&&label| label >= n_classes) {
        return Err(TrainError::LabelOutOfRange {
            label,
            classes: n_classes,
        });
    }
    if let Some((row, features)) = dataset
        .x
        .iter()
        .enumerate()
        .find(|(_, features)| features.len() != dataset.feature_len)
    {
        return Err(TrainError::FeatureLength {
            row,
            len: features.len(),
            expected: dataset.feature_len,
        });
    }
    Ok(())
}

struct GrowContext<'a> {
    x: &'a [Vec<f32>],
    binned: &'a [Vec<u8>],
    /// `edges[feature][bin]`: rows in bins `<= bin` have values below the edge.
    edges: &'a [Vec<f32>],
    bins: usize,
    max_depth: usize,
    reg_lambda: f64,
    min_child_weight: f64,
}

fn fit_round(
    ctx: &GrowContext<'_>,
    grads: &[Vec<f32>],
    hess: &[Vec<f32>],
    threads: usize,
) -> Result<Vec<RegressionTree>, TrainError> {
    let n_classes = grads.len();
    let all_rows: Vec<usize> = (0..ctx.x.len()).collect();
    let workers = threads.clamp(1, n_classes.max(1));
    if workers == 1 {
        return Ok((0..n_classes)
            .map(|k| grow_tree(ctx, &grads[k], &hess[k], &all_rows))
            .collect());
    }

    let classes: Vec<usize> = (0..n_classes).collect();
    let chunk_len = n_classes.div_ceil(workers);
    std::thread::scope(|scope| {
        let all_rows = &all_rows;
        let handles: Vec<_> = classes
            .chunks(chunk_len)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|&k| grow_tree(ctx, &grads[k], &hess[k], all_rows))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut trees = Vec::with_capacity(n_classes);
        for handle in handles {
            trees.extend(handle.join().map_err(|_| TrainError::WorkerPanicked)?);
        }
        Ok::<_, TrainError>(trees)
    })
}

fn grow_tree(
    ctx: &GrowContext<'_>,
    grads: &[f32],
    hess: &[f32],
    rows: &[usize],
) -> RegressionTree {
    let mut builder = TreeBuilder {
        ctx,
        grads,
        hess,
        nodes: Vec::new(),
    };
    builder.build(rows, 0);
    RegressionTree {
        nodes: builder.nodes,
    }
}

struct TreeBuilder<'a, 'c> {
    ctx: &'a GrowContext<'c>,
    grads: &'a [f32],
    hess: &'a [f32],
    nodes: Vec<TreeNode>,
}

impl TreeBuilder<'_, '_> {
    fn build(&mut self, rows: &[usize], depth: usize) -> u32 {
        let idx = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { value: 0.0 });

        let (grad_sum, hess_sum) = self.sums(rows);
        let leaf = TreeNode::Leaf {
            value: leaf_weight(grad_sum, hess_sum, self.ctx.reg_lambda),
        };
        if depth >= self.ctx.max_depth || rows.len() < 2 {
            self.nodes[idx] = leaf;
            return idx as u32;
        }
        let Some(split) = self.best_split(rows, grad_sum, hess_sum) else {
            self.nodes[idx] = leaf;
            return idx as u32;
        };

        let threshold = self.ctx.edges[split.feature_index][split.split_bin];
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .copied()
            .partition(|&row| self.ctx.x[row][split.feature_index] < threshold);
        if left_rows.is_empty() || right_rows.is_empty() {
            self.nodes[idx] = leaf;
            return idx as u32;
        }

        let left = self.build(&left_rows, depth + 1);
        let right = self.build(&right_rows, depth + 1);
        self.nodes[idx] = TreeNode::Split {
            feature_index: split.feature_index as u16,
            threshold,
            left,
            right,
        };
        idx as u32
    }

    fn sums(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter().fold((0.0, 0.0), |(g, h), &row| {
            (g + f64::from(self.grads[row]), h + f64::from(self.hess[row]))
        })
    }

    fn best_split(&self, rows: &[usize], grad_sum: f64, hess_sum: f64) -> Option<BestSplit> {
        let n_features = self.ctx.edges.len();
        let mut best: Option<BestSplit> = None;
        for feature_index in 0..n_features {
            let Some(split) = self.best_split_for_feature(rows, feature_index, grad_sum, hess_sum)
            else {
                continue;
            };
            if best.as_ref().is_none_or(|current| split.gain > current.gain) {
                best = Some(split);
            }
        }
        best
    }

    fn best_split_for_feature(
        &self,
        rows: &[usize],
        feature_index: usize,
        grad_sum: f64,
        hess_sum: f64,
    ) -> Option<BestSplit> {
        let bins = self.ctx.bins;
        let mut counts = vec![0u32; bins];
        let mut grads = vec![0f64; bins];
        let mut hess = vec![0f64; bins];
        for &row in rows {
            let b = self.ctx.binned[row][feature_index] as usize;
            counts[b] += 1;
            grads[b] += f64::from(self.grads[row]);
            hess[b] += f64::from(self.hess[row]);
        }

        let lambda = self.ctx.reg_lambda;
        let parent_score = grad_sum * grad_sum / (hess_sum + lambda);
        let total_count = rows.len() as u32;
        let mut best: Option<BestSplit> = None;
        let mut left_count = 0u32;
        let mut left_grad = 0f64;
        let mut left_hess = 0f64;
        for split_bin in 0..(bins - 1) {
            left_count += counts[split_bin];
            left_grad += grads[split_bin];
            left_hess += hess[split_bin];
            let right_count = total_count - left_count;
            if left_count == 0 || right_count == 0 || counts[split_bin] == 0 {
                continue;
            }
            let right_grad = grad_sum - left_grad;
            let right_hess = hess_sum - left_hess;
            if left_hess < self.ctx.min_child_weight || right_hess < self.ctx.min_child_weight {
                continue;
            }
            let gain = 0.5
                * (left_grad * left_grad / (left_hess + lambda)
                    + right_grad * right_grad / (right_hess + lambda)
                    - parent_score);
            if gain > MIN_SPLIT_GAIN && best.as_ref().is_none_or(|current| gain > current.gain) {
                best = Some(BestSplit {
                    gain,
                    feature_index,
                    split_bin,
                });
            }
        }
        best
    }
}

#[derive(Debug, Clone)]
struct BestSplit {
    gain: f64,
    feature_index: usize,
    split_bin: usize,
}

fn leaf_weight(grad_sum: f64, hess_sum: f64, reg_lambda: f64) -> f32 {
    let denom = hess_sum + reg_lambda;
    if denom <= 0.0 {
        return 0.0;
    }
    (-grad_sum / denom) as f32
}

fn class_priors(y: &[usize], n_classes: usize) -> Vec<f32> {
    let mut counts = vec![0usize; n_classes];
    for &label in y {
        if label < n_classes {
            counts[label] += 1;
        }
    }
    let total = y.len().max(1) as f32;
    counts.into_iter().map(|c| c as f32 / total).collect()
}

/// Softmax cross-entropy gradients and hessians, laid out `[class][row]`.
fn compute_gradients(
    y: &[usize],
    raw: &[Vec<f32>],
    n_classes: usize,
) -> (Vec<Vec<f32>>, Vec<Vec<f32>>) {
    let n = y.len();
    let mut grads = vec![vec![0.0f32; n]; n_classes];
    let mut hess = vec![vec![0.0f32; n]; n_classes];
    for (i, (&label, logits)) in y.iter().zip(raw).enumerate() {
        let probs = softmax(logits);
        for k in 0..n_classes {
            let p = probs[k];
            let target = if label == k { 1.0 } else { 0.0 };
            grads[k][i] = p - target;
            hess[k][i] = (2.0 * p * (1.0 - p)).max(MIN_HESSIAN);
        }
    }
    (grads, hess)
}

fn compute_feature_min_max(x: &[Vec<f32>], feature_len: usize) -> (Vec<f32>, Vec<f32>) {
    let mut mins = vec![f32::INFINITY; feature_len];
    let mut maxs = vec![f32::NEG_INFINITY; feature_len];
    for row in x {
        for (j, &v) in row.iter().take(feature_len).enumerate() {
            if v.is_finite() {
                mins[j] = mins[j].min(v);
                maxs[j] = maxs[j].max(v);
            }
        }
    }
    for j in 0..feature_len {
        if !mins[j].is_finite() || !maxs[j].is_finite() {
            mins[j] = 0.0;
            maxs[j] = 0.0;
        }
        if mins[j] == maxs[j] {
            maxs[j] = mins[j] + 1.0;
        }
    }
    (mins, maxs)
}

fn bin_features(x: &[Vec<f32>], mins: &[f32], maxs: &[f32], bins: usize) -> Vec<Vec<u8>> {
    let scale = (bins - 1) as f32;
    x.iter()
        .map(|row| {
            mins.iter()
                .zip(maxs)
                .enumerate()
                .map(|(j, (&min, &max))| {
                    let v = row.get(j).copied().unwrap_or(0.0);
                    let t = if max > min {
                        ((v - min) / (max - min)).clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                    (t * scale).round() as u8
                })
                .collect()
        })
        .collect()
}

/// Upper edge of each bin in feature units: the midpoint between bin centers.
fn bin_edges(mins: &[f32], maxs: &[f32], bins: usize) -> Vec<Vec<f32>> {
    let scale = (bins - 1) as f32;
    mins.iter()
        .zip(maxs)
        .map(|(&min, &max)| {
            (0..bins - 1)
                .map(|b| min + ((b as f32 + 0.5) / scale) * (max - min))
                .collect()
        })
        .collect()
}
