use std::path::PathBuf;

pub(super) const MAX_WORKER_POOL_SIZE: usize = 256;
pub(super) const MIN_REQUEST_TIMEOUT_MS: u64 = 10;

pub(super) fn default_dataset_path() -> PathBuf {
    PathBuf::from("dummy_npi_data.xlsx")
}

pub(super) fn default_rounds() -> usize {
    100
}

pub(super) fn default_max_depth() -> usize {
    5
}

pub(super) fn default_learning_rate() -> f32 {
    0.1
}

pub(super) fn default_bins() -> usize {
    256
}

pub(super) fn default_reg_lambda() -> f32 {
    1.0
}

pub(super) fn default_min_child_weight() -> f32 {
    1.0
}

pub(super) fn default_holdout_fraction() -> f64 {
    0.2
}

pub(super) fn default_split_seed() -> u64 {
    42
}

pub(super) fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

pub(super) fn default_worker_pool_size() -> usize {
    8
}

pub(super) fn default_request_timeout_ms() -> u64 {
    10_000
}

pub(super) fn default_limit() -> usize {
    10
}

pub(super) fn default_cors_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

pub(super) fn default_true() -> bool {
    true
}

pub(super) fn default_max_log_files() -> usize {
    10
}

pub(super) fn clamp_worker_pool_size(value: usize) -> usize {
    value.clamp(1, MAX_WORKER_POOL_SIZE)
}

pub(super) fn clamp_holdout_fraction(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 0.9)
    } else {
        default_holdout_fraction()
    }
}
