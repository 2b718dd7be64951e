//! Owns the process-wide dataset and model caches.

use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use crate::config::{DatasetSettings, ModelSettings};
use crate::dataset::{Dataset, TimeCategory, load_dataset};
use crate::ranking::{RankOutcome, parse_query_time, rank_doctors};
use crate::training::{TrainedModel, train_model};

/// Lazily populated slot holding a shared value.
///
/// Successful builds are stored; failures leave the slot empty so the next
/// caller builds again.
pub struct BuildCache<T> {
    slot: Mutex<Option<Arc<T>>>,
}

impl<T> Default for BuildCache<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<T> BuildCache<T> {
    /// Return the cached value or run `build` while holding the slot lock.
    pub fn get_or_build<E>(&self, build: impl FnOnce() -> Result<T, E>) -> Result<Arc<T>, E> {
        let mut slot = self.slot.lock().unwrap_or_else(|err| err.into_inner());
        if let Some(value) = slot.as_ref() {
            return Ok(Arc::clone(value));
        }
        let value = Arc::new(build()?);
        *slot = Some(Arc::clone(&value));
        Ok(value)
    }
}

/// Loads, trains and ranks on demand; shared across request workers.
pub struct Engine {
    dataset_settings: DatasetSettings,
    model_settings: ModelSettings,
    dataset: BuildCache<Dataset>,
    model: BuildCache<TrainedModel>,
}

impl Engine {
    pub fn new(dataset_settings: DatasetSettings, model_settings: ModelSettings) -> Self {
        Self {
            dataset_settings,
            model_settings,
            dataset: BuildCache::default(),
            model: BuildCache::default(),
        }
    }

    /// Cached dataset, loading it on first use. `None` means no data is available.
    pub fn load_data(&self) -> Option<Arc<Dataset>> {
        self.dataset
            .get_or_build(|| load_dataset(&self.dataset_settings))
            .map_err(|err| {
                error!(
                    "Error loading data from {}: {err}",
                    self.dataset_settings.path.display()
                );
            })
            .ok()
    }

    /// Cached model, training it on first use.
    pub fn train_model(&self) -> Option<Arc<TrainedModel>> {
        let dataset = self.load_data()?;
        self.model
            .get_or_build(|| train_model(&dataset, &self.model_settings))
            .map_err(|err| error!("Error training model: {err}"))
            .ok()
    }

    /// Warm both caches. Returns whether the model is ready.
    pub fn initialize(&self) -> bool {
        let ready = self.train_model().is_some();
        if ready {
            info!("Dataset and model ready");
        } else {
            warn!("Initialization failed; requests will retry loading");
        }
        ready
    }

    /// Rank the records active at `time` (`HH:MM`). A negative `limit` keeps
    /// all but the last `|limit|` ranked rows.
    pub fn predict_best_doctors(&self, time: &str, limit: i64) -> RankOutcome {
        let Some(dataset) = self.load_data() else {
            return RankOutcome::Unavailable;
        };
        let Some(model) = self.train_model() else {
            return RankOutcome::Unavailable;
        };
        let query_time = match parse_query_time(time) {
            Ok(query_time) => query_time,
            Err(err) => {
                error!("Invalid time {time:?}: {err}");
                return RankOutcome::InvalidTime;
            }
        };
        let category = TimeCategory::from_hour(query_time.hour());
        let doctors = rank_doctors(&dataset, &model, category, limit);
        if doctors.is_empty() && dataset.in_category(category).next().is_none() {
            return RankOutcome::Empty;
        }
        RankOutcome::Found(doctors)
    }
}
