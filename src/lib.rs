//! Library exports for the service binary, developer tools, tests and benchmarks.
/// Application directory resolution.
pub mod app_dirs;
/// `config.toml` loading.
pub mod config;
/// Dataset reading and preprocessing.
pub mod dataset;
/// Dataset/model caches and the prediction entry point.
pub mod engine;
/// HTTP router, handlers and worker pool.
pub mod http;
/// Logging setup.
pub mod logging;
/// Gradient-boosted trees and evaluation metrics.
pub mod ml;
/// Time parsing and candidate ranking.
pub mod ranking;
/// Train/holdout split and model fitting.
pub mod training;
