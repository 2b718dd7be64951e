//! Fits the availability classifier on a preprocessed dataset.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ModelSettings;
use crate::dataset::{Dataset, FEATURE_LEN, FEATURE_NAMES, TimeCategory};
use crate::ml::gbdt::{GbdtModel, TrainDataset, TrainError, TrainOptions, train_gbdt};

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("no data available for training")]
    DataUnavailable,
    #[error("training split is empty ({rows} rows, holdout {holdout})")]
    EmptyTrainSplit { rows: usize, holdout: usize },
    #[error("model fitting failed: {0}")]
    Fit(#[from] TrainError),
}

/// A fitted classifier plus the dataset rows it never saw.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub model: GbdtModel,
    /// Dataset indices of the holdout split.
    pub holdout: Vec<usize>,
}

impl TrainedModel {
    /// Probability that `features` belong to `category`.
    pub fn probability(&self, features: &[f32], category: TimeCategory) -> f32 {
        self.model
            .predict_proba(features)
            .get(category.index())
            .copied()
            .unwrap_or(0.0)
    }
}

/// Holdout row count for `rows` rows: `ceil(fraction * rows)`.
pub fn holdout_len(rows: usize, fraction: f64) -> usize {
    ((rows as f64) * fraction).ceil() as usize
}

/// Shuffle row indices with a seeded RNG and split them into `(train, holdout)`.
pub fn split_indices(rows: usize, fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let holdout = holdout_len(rows, fraction).min(rows);
    let train = indices.split_off(holdout);
    (train, indices)
}

/// Train the 4-class time-category model.
pub fn train_model(
    dataset: &Dataset,
    settings: &ModelSettings,
) -> Result<TrainedModel, TrainingError> {
    if dataset.is_empty() {
        return Err(TrainingError::DataUnavailable);
    }
    let records = dataset.records();
    let (train, holdout) =
        split_indices(records.len(), settings.holdout_fraction, settings.split_seed);
    if train.is_empty() {
        return Err(TrainingError::EmptyTrainSplit {
            rows: records.len(),
            holdout: holdout.len(),
        });
    }

    let mut x: Vec<Vec<f32>> = train
        .iter()
        .map(|&idx| records[idx].features().to_vec())
        .collect();
    let mut y: Vec<usize> = train
        .iter()
        .map(|&idx| records[idx].time_category.index())
        .collect();
    balance_missing_classes(&mut x, &mut y);

    let options = TrainOptions {
        rounds: settings.rounds,
        learning_rate: settings.learning_rate,
        max_depth: settings.max_depth,
        bins: settings.bins,
        reg_lambda: settings.reg_lambda,
        min_child_weight: settings.min_child_weight,
        threads: settings.resolved_threads(),
    };
    let train_dataset = TrainDataset {
        feature_len: FEATURE_LEN,
        feature_names: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
        classes: TimeCategory::ALL
            .iter()
            .map(|category| category.as_str().to_string())
            .collect(),
        x,
        y,
    };
    let model = train_gbdt(&train_dataset, &options)?;
    info!(
        train_rows = train_dataset.x.len(),
        holdout_rows = holdout.len(),
        rounds = options.rounds,
        threads = options.threads,
        "Model trained successfully"
    );
    Ok(TrainedModel { model, holdout })
}

/// Append one copy of the first training row for every category with no
/// training examples.
fn balance_missing_classes(x: &mut Vec<Vec<f32>>, y: &mut Vec<usize>) {
    let Some(template) = x.first().cloned() else {
        return;
    };
    let mut present = [false; TimeCategory::ALL.len()];
    for &label in y.iter() {
        if let Some(slot) = present.get_mut(label) {
            *slot = true;
        }
    }
    for category in TimeCategory::ALL {
        if present[category.index()] {
            continue;
        }
        warn!(
            category = category.as_str(),
            "Adding synthetic sample for missing category"
        );
        x.push(template.clone());
        y.push(category.index());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Record;

    fn record(provider_id: u32, login_hour: u8, attempts: i64) -> Record {
        Record {
            provider_id,
            login_hour,
            logout_hour: (login_hour + 2) % 24,
            session_minutes: 120.0,
            peak_hours: crate::dataset::is_peak_hour(login_hour),
            survey_attempts: attempts,
            time_category: TimeCategory::from_hour(login_hour),
        }
    }

    fn quick_settings() -> ModelSettings {
        ModelSettings {
            rounds: 10,
            threads: 1,
            ..ModelSettings::default()
        }
    }

    #[test]
    fn split_is_seeded_and_sized_by_ceiling() {
        assert_eq!(holdout_len(10, 0.2), 2);
        assert_eq!(holdout_len(11, 0.2), 3);
        assert_eq!(holdout_len(1, 0.2), 1);

        let (train_a, holdout_a) = split_indices(25, 0.2, 42);
        let (train_b, holdout_b) = split_indices(25, 0.2, 42);
        assert_eq!(train_a, train_b);
        assert_eq!(holdout_a, holdout_b);
        assert_eq!(holdout_a.len(), 5);
        let mut all: Vec<usize> = train_a.into_iter().chain(holdout_a).collect();
        all.sort_unstable();
        assert_eq!(all, (0..25).collect::<Vec<_>>());
    }

    #[test]
    fn missing_categories_get_synthetic_rows() {
        let mut x = vec![vec![1.0; FEATURE_LEN], vec![2.0; FEATURE_LEN]];
        let mut y = vec![1, 1];
        balance_missing_classes(&mut x, &mut y);
        assert_eq!(y, vec![1, 1, 0, 2, 3]);
        assert!(x[2..].iter().all(|row| row == &x[0]));
    }

    #[test]
    fn single_category_dataset_still_yields_four_class_model() {
        let records: Vec<Record> = (0..12)
            .map(|i| record(i, 8 + (i % 3) as u8, i as i64))
            .collect();
        let dataset = Dataset::new(records, 12);
        let trained = train_model(&dataset, &quick_settings()).unwrap();
        assert_eq!(trained.model.n_classes(), 4);
        assert_eq!(trained.holdout.len(), 3);
        for record in dataset.records() {
            let proba = trained.model.predict_proba(&record.features());
            assert_eq!(proba.len(), 4);
            assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
            assert!((proba.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn empty_dataset_is_unavailable() {
        let err = train_model(&Dataset::default(), &quick_settings()).unwrap_err();
        assert!(matches!(err, TrainingError::DataUnavailable));
    }

    #[test]
    fn full_holdout_leaves_no_training_rows() {
        let dataset = Dataset::new(vec![record(0, 3, 1)], 1);
        let settings = ModelSettings {
            holdout_fraction: 0.2,
            ..quick_settings()
        };
        let err = train_model(&dataset, &settings).unwrap_err();
        assert!(matches!(
            err,
            TrainingError::EmptyTrainSplit {
                rows: 1,
                holdout: 1
            }
        ));
    }
}
