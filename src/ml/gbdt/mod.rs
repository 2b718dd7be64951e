//! Deterministic gradient-boosted tree classifier.
//!
//! Multi-class softmax boosting with depth-limited regression trees:
//! - Histogram split search with second-order gain.
//! - Per-class trees of a round fit in parallel.
//! - Reproducible JSON model export/load.

mod model;
mod train;

pub use model::{GbdtModel, MODEL_VERSION, ModelError, RegressionTree, TreeNode, softmax};
pub use train::{TrainDataset, TrainError, TrainOptions, train_gbdt};
